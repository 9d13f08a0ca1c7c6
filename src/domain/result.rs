//! Fit outputs.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::{ParamName, PdcParams};
use crate::models::predict_all;

/// Per-parameter summary of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamReport {
    pub name: ParamName,
    pub value: f64,
    /// One-sigma standard error; `None` for fixed parameters or when the
    /// covariance could not be estimated.
    pub stderr: Option<f64>,
    pub initial: f64,
    #[serde(with = "crate::domain::json_float")]
    pub min: f64,
    #[serde(with = "crate::domain::json_float")]
    pub max: f64,
    pub vary: bool,
}

impl ParamReport {
    /// Whether the converged value sits on (or within `rel` of) a bound.
    pub fn at_bound(&self, rel: f64) -> bool {
        let span = (self.max - self.min).abs();
        if !span.is_finite() || span == 0.0 {
            return false;
        }
        let tol = rel * span;
        (self.value - self.min).abs() <= tol || (self.max - self.value).abs() <= tol
    }
}

/// Goodness-of-fit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub ndata: usize,
    pub nvarys: usize,
    pub chisqr: f64,
    pub redchi: f64,
    pub aic: f64,
    pub bic: f64,
    /// NaN when the observed powers are constant.
    #[serde(with = "crate::domain::json_float")]
    pub r_squared: f64,
    pub success: bool,
    pub nfev: usize,
}

/// Immutable snapshot of one `CurveFitter::fit` call.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Converged values for all six parameters (fixed ones included).
    pub best_values: PdcParams,
    /// Starting point after clamping into bounds.
    pub init_values: PdcParams,
    /// Reports in `ParamName::ALL` order.
    pub params: Vec<ParamReport>,
    /// Varying parameters, in covariance row/column order.
    pub var_names: Vec<ParamName>,

    pub success: bool,
    pub message: String,
    pub nfev: usize,
    pub niter: usize,

    pub ndata: usize,
    pub nvarys: usize,
    pub nfree: usize,

    /// `model - data` at each sample.
    pub residual: Vec<f64>,
    /// Model evaluated at the sample durations with `best_values`.
    pub best_fit: Vec<f64>,
    /// Model evaluated at the sample durations with `init_values`.
    pub init_fit: Vec<f64>,

    pub chisqr: f64,
    pub redchi: f64,
    pub aic: f64,
    pub bic: f64,
    pub r_squared: f64,

    /// Covariance of the varying parameters, scaled by `redchi`.
    pub covar: Option<DMatrix<f64>>,
    pub errorbars: bool,
}

impl FitResult {
    /// Name -> converged value mapping.
    pub fn best_values_map(&self) -> BTreeMap<String, f64> {
        self.best_values.to_map()
    }

    pub fn param(&self, name: ParamName) -> &ParamReport {
        &self.params[name.index()]
    }

    pub fn stderr(&self, name: ParamName) -> Option<f64> {
        self.param(name).stderr
    }

    /// Symmetric `value ± sigmas * stderr` interval.
    pub fn confidence_interval(&self, name: ParamName, sigmas: f64) -> Option<(f64, f64)> {
        let p = self.param(name);
        p.stderr.map(|se| (p.value - sigmas * se, p.value + sigmas * se))
    }

    /// Correlation between two varying parameters.
    pub fn correlation(&self, a: ParamName, b: ParamName) -> Option<f64> {
        let covar = self.covar.as_ref()?;
        let i = self.var_names.iter().position(|&n| n == a)?;
        let j = self.var_names.iter().position(|&n| n == b)?;
        let denom = (covar[(i, i)] * covar[(j, j)]).sqrt();
        if denom > 0.0 && denom.is_finite() {
            Some(covar[(i, j)] / denom)
        } else {
            None
        }
    }

    /// Model at new durations with the converged parameters.
    pub fn eval(&self, durations: &[f64]) -> Vec<f64> {
        predict_all(durations, &self.best_values)
    }

    pub fn quality(&self) -> FitQuality {
        FitQuality {
            ndata: self.ndata,
            nvarys: self.nvarys,
            chisqr: self.chisqr,
            redchi: self.redchi,
            aic: self.aic,
            bic: self.bic,
            r_squared: self.r_squared,
            success: self.success,
            nfev: self.nfev,
        }
    }
}
