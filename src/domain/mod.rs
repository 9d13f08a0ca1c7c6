//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - inputs (`SampleSet`)
//! - parameters and their bounds (`ParamName`, `PdcParams`, `ParamSpec`, `ParamTable`)
//! - solver configuration (`FitConfig`)
//! - fit outputs (`FitResult`, `ParamReport`, `FitQuality`)

pub(crate) mod json_float;
pub mod result;
pub mod types;

pub use result::*;
pub use types::*;
