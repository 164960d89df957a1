pub mod action;
pub mod mapping;
pub mod path;
pub mod value;

pub use action::*;
pub use mapping::*;
pub use path::*;
pub use value::*;
