//! Error types for fitting and export.

use thiserror::Error;

use crate::domain::ParamName;

/// Errors returned by the fitter, the synthetic generator and the exporters.
///
/// Non-convergence is not an error: it is reported through
/// `FitResult::success`.
#[derive(Debug, Error)]
pub enum FitError {
    /// No samples were supplied.
    #[error("No samples to fit.")]
    EmptyInput,

    /// Durations and powers have different lengths.
    #[error("Length mismatch: {durations} durations vs {powers} powers.")]
    LengthMismatch { durations: usize, powers: usize },

    /// A duration or power is NaN or infinite.
    #[error("Non-finite sample at index {index}.")]
    NonFiniteInput { index: usize },

    /// Durations must be strictly positive (the model divides by and takes the log of them).
    #[error("Duration at index {index} must be > 0 (got {value}).")]
    NonPositiveDuration { index: usize, value: f64 },

    /// Fewer samples than varying parameters.
    #[error("Underdetermined fit: {samples} samples for {params} varying parameters.")]
    Underdetermined { samples: usize, params: usize },

    /// A parameter spec has inverted bounds or a non-finite initial value.
    #[error("Invalid bounds for '{name}': min={min}, max={max}.")]
    InvalidBounds { name: ParamName, min: f64, max: f64 },

    /// Tolerances, iteration limits or noise settings are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The optimizer could not evaluate the objective.
    #[error("Solver failure: {0}")]
    Solver(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
