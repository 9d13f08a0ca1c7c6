//! Mathematical utilities: bound transforms and damped linear solves.

pub mod bounds;
pub mod linalg;

pub use bounds::*;
pub use linalg::*;
