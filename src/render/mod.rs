pub mod frame;
pub mod gpu;
pub mod pipeline;
pub mod program;
pub mod reflect;
#[cfg(test)]
pub mod testing;
pub mod viewer;
