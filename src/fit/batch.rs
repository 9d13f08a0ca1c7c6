//! Parallel fitting of many independent sample sets.
//!
//! Each sample set gets its own `CurveFitter`; fits share nothing mutable, so
//! they run on the rayon pool and come back in input order.

use rayon::prelude::*;

use crate::domain::{FitConfig, FitResult, SampleSet};
use crate::error::FitError;
use crate::fit::fitter::CurveFitter;

/// Fit every sample set with the same configuration.
///
/// One bad dataset does not abort the batch: its slot holds the error.
pub fn fit_batch(datasets: &[SampleSet], config: &FitConfig) -> Vec<Result<FitResult, FitError>> {
    datasets
        .par_iter()
        .map(|samples| CurveFitter::from_samples(samples.clone(), config.clone()).fit())
        .collect()
}
