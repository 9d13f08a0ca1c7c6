//! Synthetic mean-maximal power samples from known parameters.
//!
//! Powers are the model value plus Gaussian noise from a seeded `StdRng`, so a
//! given seed always produces the same samples. Used to check that a fit
//! recovers the parameters it was generated from.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{PdcParams, SampleSet};
use crate::error::FitError;
use crate::models::predict;

/// Additive noise settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSpec {
    /// Standard deviation in watts (0 for noiseless samples).
    pub sigma: f64,
    pub seed: u64,
}

/// The usual MMP ladder, 1 s to 1 h.
pub fn standard_durations() -> Vec<f64> {
    vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0]
}

/// `steps` log-spaced durations between `min` and `max` (inclusive).
pub fn log_durations(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, FitError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > min) {
        return Err(FitError::InvalidConfig(format!(
            "Invalid duration range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(FitError::InvalidConfig("Duration steps must be >= 2.".to_string()));
    }

    let ln_min = min.ln();
    let step = (max.ln() - ln_min) / (steps as f64 - 1.0);
    let mut out: Vec<f64> = (0..steps).map(|i| (ln_min + step * i as f64).exp()).collect();
    // Pin the endpoints exactly.
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

/// Model powers at `durations` for `params`, plus noise.
pub fn generate_samples(params: &PdcParams, durations: &[f64], noise: &NoiseSpec) -> Result<SampleSet, FitError> {
    if durations.is_empty() {
        return Err(FitError::EmptyInput);
    }
    if let Some((index, &value)) = durations.iter().enumerate().find(|&(_, &d)| !(d.is_finite() && d > 0.0)) {
        return Err(FitError::NonPositiveDuration { index, value });
    }
    if !(noise.sigma.is_finite() && noise.sigma >= 0.0) {
        return Err(FitError::InvalidConfig(format!(
            "Noise sigma must be finite and >= 0 (got {}).",
            noise.sigma
        )));
    }
    let normal = Normal::new(0.0, noise.sigma)
        .map_err(|e| FitError::InvalidConfig(format!("Noise distribution error: {e}")))?;

    let mut rng = StdRng::seed_from_u64(noise.seed);
    let powers = durations
        .iter()
        .map(|&x| predict(x, params) + normal.sample(&mut rng))
        .collect::<Vec<f64>>();

    Ok(SampleSet::new(durations, powers))
}
