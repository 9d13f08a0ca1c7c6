//! Curve fitting.
//!
//! Responsibilities:
//!
//! - bounded Levenberg–Marquardt minimization (`lm`)
//! - fitting the power-duration model to one sample set (`fitter`)
//! - fitting many sample sets in parallel (`batch`)

pub mod batch;
pub mod fitter;
pub mod lm;

pub use batch::*;
pub use fitter::*;
