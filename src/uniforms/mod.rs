pub mod registry;
pub mod value;

pub use registry::{UniformDescriptor, UniformRegistry};
pub use value::{UniformFormat, UniformValue};
