//! Reporting utilities: fitted grids and formatted fit reports.

pub mod format;

pub use format::*;

use crate::domain::FitResult;
use crate::error::FitError;

/// Durations and predicted powers on a log-spaced grid.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CurveGrid {
    pub duration_secs: Vec<f64>,
    pub power_watts: Vec<f64>,
}

/// Evaluate the fitted curve on `n` log-spaced durations in `[x_min, x_max]`.
///
/// Durations span several orders of magnitude (1 s to hours), so the grid is
/// spaced in `ln(x)`.
pub fn fitted_grid(result: &FitResult, x_min: f64, x_max: f64, n: usize) -> Result<CurveGrid, FitError> {
    let duration_secs = crate::data::log_durations(x_min, x_max, n)?;
    let power_watts = result.eval(&duration_secs);
    Ok(CurveGrid {
        duration_secs,
        power_watts,
    })
}
