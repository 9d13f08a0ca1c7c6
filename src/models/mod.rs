//! Power-duration model.
//!
//! The model is implemented as small, pure functions so the fitter and the
//! reporting code can share them.

pub mod model;

pub use model::*;
