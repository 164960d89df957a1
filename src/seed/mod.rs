pub mod data;
pub mod plan;

pub use data::*;
pub use plan::*;
