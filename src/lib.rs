//! `pdc-fit` library crate.
//!
//! Models an athlete's power-duration curve and fits it to mean-maximal
//! power samples with a bounded Levenberg–Marquardt solver.
//!
//! - `models`: the power-duration model function and its derivatives
//! - `fit`: the curve fitter (single dataset and parallel batches)
//! - `domain`: samples, parameters, configuration and fit results
//! - `report`: text reports and fitted grids
//! - `io`: curve JSON files
//!
//! ```no_run
//! use pdc_fit::{CurveFitter, ParamName};
//!
//! let secs = [1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0];
//! let watts = [700.0, 650.0, 600.0, 500.0, 400.0, 350.0, 300.0, 280.0, 260.0, 250.0, 240.0];
//!
//! let result = CurveFitter::new(secs, watts).fit()?;
//! if result.success {
//!     println!("ftp = {:.0} W", result.best_values[ParamName::Ftp]);
//! }
//! # Ok::<(), pdc_fit::FitError>(())
//! ```

pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;

pub use domain::{FitConfig, FitResult, ParamName, ParamSpec, PdcParams, SampleSet};
pub use error::FitError;
pub use fit::{CurveFitter, fit_batch};
pub use models::{power_curve, predict, predict_all};
