pub mod analysis;
pub mod capture;
