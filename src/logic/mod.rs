pub mod accessor;
pub mod aggregate_change;
pub mod converter;
pub mod interpreter;
pub mod traversal;

pub use accessor::*;
pub use aggregate_change::*;
pub use converter::*;
pub use interpreter::*;
pub use traversal::*;
