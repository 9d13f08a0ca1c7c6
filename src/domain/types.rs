//! Shared domain types.
//!
//! These types are kept lightweight and serializable so a configuration can be
//! stored next to the data it was used on and reloaded later.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Ordered (duration, power) samples, typically a mean-maximal power curve.
///
/// Durations are seconds and powers are watts. Order is irrelevant to the fit
/// and duplicates are kept as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleSet {
    pub durations: Vec<f64>,
    pub powers: Vec<f64>,
}

impl SampleSet {
    /// Build from any containers convertible into `Vec<f64>` (arrays, slices, vectors).
    ///
    /// Lengths are not checked here; `CurveFitter::fit` reports a mismatch.
    pub fn new(durations: impl Into<Vec<f64>>, powers: impl Into<Vec<f64>>) -> Self {
        Self {
            durations: durations.into(),
            powers: powers.into(),
        }
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let (durations, powers) = pairs.into_iter().unzip();
        Self { durations, powers }
    }

    /// Number of complete pairs.
    pub fn len(&self) -> usize {
        self.durations.len().min(self.powers.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.durations.iter().copied().zip(self.powers.iter().copied())
    }

    /// Check the fitter's input contract: non-empty, equal lengths, finite
    /// values and strictly positive durations.
    pub fn validate(&self) -> Result<(), FitError> {
        if self.durations.is_empty() && self.powers.is_empty() {
            return Err(FitError::EmptyInput);
        }
        if self.durations.len() != self.powers.len() {
            return Err(FitError::LengthMismatch {
                durations: self.durations.len(),
                powers: self.powers.len(),
            });
        }
        for (index, (x, y)) in self.pairs().enumerate() {
            if !(x.is_finite() && y.is_finite()) {
                return Err(FitError::NonFiniteInput { index });
            }
            if x <= 0.0 {
                return Err(FitError::NonPositiveDuration { index, value: x });
            }
        }
        Ok(())
    }
}

/// The six model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamName {
    /// Functional reserve capacity (J).
    Frc,
    /// Functional threshold power (W).
    Ftp,
    /// Time to exhaustion (s).
    Tte,
    /// Short-duration time constant (s).
    Tau,
    /// Long-duration time constant (s).
    Tau2,
    /// Decay coefficient past TTE (W per log-unit of duration).
    A,
}

impl ParamName {
    /// Canonical order, also the column order of Jacobians and arrays.
    pub const ALL: [ParamName; 6] = [
        ParamName::Frc,
        ParamName::Ftp,
        ParamName::Tte,
        ParamName::Tau,
        ParamName::Tau2,
        ParamName::A,
    ];

    pub const COUNT: usize = 6;

    pub fn as_str(self) -> &'static str {
        match self {
            ParamName::Frc => "frc",
            ParamName::Ftp => "ftp",
            ParamName::Tte => "tte",
            ParamName::Tau => "tau",
            ParamName::Tau2 => "tau2",
            ParamName::A => "a",
        }
    }

    /// Position in `ParamName::ALL`.
    pub fn index(self) -> usize {
        match self {
            ParamName::Frc => 0,
            ParamName::Ftp => 1,
            ParamName::Tte => 2,
            ParamName::Tau => 3,
            ParamName::Tau2 => 4,
            ParamName::A => 5,
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamName {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FitError::InvalidConfig(format!("Unknown parameter name '{s}'.")))
    }
}

/// Concrete values for all six parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdcParams {
    pub frc: f64,
    pub ftp: f64,
    pub tte: f64,
    pub tau: f64,
    pub tau2: f64,
    pub a: f64,
}

impl PdcParams {
    pub fn new(frc: f64, ftp: f64, tte: f64, tau: f64, tau2: f64, a: f64) -> Self {
        Self {
            frc,
            ftp,
            tte,
            tau,
            tau2,
            a,
        }
    }

    /// Values in `ParamName::ALL` order.
    pub fn from_array(values: [f64; ParamName::COUNT]) -> Self {
        let [frc, ftp, tte, tau, tau2, a] = values;
        Self::new(frc, ftp, tte, tau, tau2, a)
    }

    pub fn to_array(&self) -> [f64; ParamName::COUNT] {
        [self.frc, self.ftp, self.tte, self.tau, self.tau2, self.a]
    }

    /// Name -> value mapping keyed by canonical names.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        ParamName::ALL
            .into_iter()
            .map(|name| (name.as_str().to_string(), self[name]))
            .collect()
    }
}

impl Index<ParamName> for PdcParams {
    type Output = f64;

    fn index(&self, name: ParamName) -> &f64 {
        match name {
            ParamName::Frc => &self.frc,
            ParamName::Ftp => &self.ftp,
            ParamName::Tte => &self.tte,
            ParamName::Tau => &self.tau,
            ParamName::Tau2 => &self.tau2,
            ParamName::A => &self.a,
        }
    }
}

impl IndexMut<ParamName> for PdcParams {
    fn index_mut(&mut self, name: ParamName) -> &mut f64 {
        match name {
            ParamName::Frc => &mut self.frc,
            ParamName::Ftp => &mut self.ftp,
            ParamName::Tte => &mut self.tte,
            ParamName::Tau => &mut self.tau,
            ParamName::Tau2 => &mut self.tau2,
            ParamName::A => &mut self.a,
        }
    }
}

/// Initial guess and closed bounds for one parameter.
///
/// Bounds may be infinite on either side. `vary = false` holds the parameter
/// at `initial` for the whole fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub initial: f64,
    #[serde(default = "neg_infinity", with = "crate::domain::json_float")]
    pub min: f64,
    #[serde(default = "infinity", with = "crate::domain::json_float")]
    pub max: f64,
    #[serde(default = "default_vary")]
    pub vary: bool,
}

fn neg_infinity() -> f64 {
    f64::NEG_INFINITY
}

fn infinity() -> f64 {
    f64::INFINITY
}

fn default_vary() -> bool {
    true
}

impl ParamSpec {
    pub fn new(initial: f64, min: f64, max: f64) -> Self {
        Self {
            initial,
            min,
            max,
            vary: true,
        }
    }

    /// A parameter held constant at `value`.
    pub fn fixed(value: f64) -> Self {
        Self {
            initial: value,
            min: value,
            max: value,
            vary: false,
        }
    }

    /// `initial` clamped into `[min, max]`.
    pub fn clamped_initial(&self) -> f64 {
        self.initial.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Whether the optimizer moves this parameter at all.
    ///
    /// A spec whose bounds collapse to a single point is treated as fixed.
    pub fn is_free(&self) -> bool {
        self.vary && self.min < self.max
    }
}

/// One `ParamSpec` per model parameter.
///
/// Serialized with canonical names as keys, e.g.
/// `{"ftp": {"initial": 250.0, "min": 100.0, "max": 400.0}}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamTable {
    pub frc: ParamSpec,
    pub ftp: ParamSpec,
    pub tte: ParamSpec,
    pub tau: ParamSpec,
    pub tau2: ParamSpec,
    pub a: ParamSpec,
}

impl Default for ParamTable {
    /// The documented bounds and starting point.
    ///
    /// `tau2` used to start at 5000 s, far outside its own 10–25 s bound; the
    /// starting point is clamped to the upper bound instead.
    fn default() -> Self {
        Self {
            frc: ParamSpec::new(5000.0, 1.0, 15000.0),
            ftp: ParamSpec::new(150.0, 100.0, 400.0),
            tte: ParamSpec::new(2000.0, 1800.0, 3600.0),
            tau: ParamSpec::new(12.0, 10.0, 25.0),
            tau2: ParamSpec::new(25.0, 10.0, 25.0),
            a: ParamSpec::new(10.0, 1.0, 200.0),
        }
    }
}

impl Index<ParamName> for ParamTable {
    type Output = ParamSpec;

    fn index(&self, name: ParamName) -> &ParamSpec {
        match name {
            ParamName::Frc => &self.frc,
            ParamName::Ftp => &self.ftp,
            ParamName::Tte => &self.tte,
            ParamName::Tau => &self.tau,
            ParamName::Tau2 => &self.tau2,
            ParamName::A => &self.a,
        }
    }
}

impl IndexMut<ParamName> for ParamTable {
    fn index_mut(&mut self, name: ParamName) -> &mut ParamSpec {
        match name {
            ParamName::Frc => &mut self.frc,
            ParamName::Ftp => &mut self.ftp,
            ParamName::Tte => &mut self.tte,
            ParamName::Tau => &mut self.tau,
            ParamName::Tau2 => &mut self.tau2,
            ParamName::A => &mut self.a,
        }
    }
}

impl ParamTable {
    /// Initial values (clamped into bounds) for every parameter.
    pub fn initial_values(&self) -> PdcParams {
        let mut out = PdcParams::from_array([0.0; ParamName::COUNT]);
        for name in ParamName::ALL {
            out[name] = self[name].clamped_initial();
        }
        out
    }

    /// Number of parameters the optimizer will move.
    pub fn free_count(&self) -> usize {
        ParamName::ALL.into_iter().filter(|&n| self[n].is_free()).count()
    }
}

/// Fit configuration: parameter table plus solver settings.
///
/// Every field has a default, so a partial JSON document is enough to
/// override one setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub params: ParamTable,
    /// Relative reduction in the sum of squares that counts as converged.
    pub ftol: f64,
    /// Relative step size that counts as converged.
    pub xtol: f64,
    /// Orthogonality between residuals and Jacobian columns that counts as converged.
    pub gtol: f64,
    /// Evaluation budget; `None` means `2000 * (nvarys + 1)`.
    pub max_nfev: Option<usize>,
    /// Initial Marquardt damping `λ`. Column `k` of `JᵀJ` is damped by
    /// `λ·d_k²`, where `d_k` is the largest norm that Jacobian column has had.
    pub initial_lambda: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            params: ParamTable::default(),
            ftol: 1.5e-8,
            xtol: 1.5e-8,
            gtol: 0.0,
            max_nfev: None,
            initial_lambda: 1e-3,
        }
    }
}

impl FitConfig {
    pub fn with_param(mut self, name: ParamName, spec: ParamSpec) -> Self {
        self.params[name] = spec;
        self
    }

    /// Hold `name` at `value` during the fit.
    pub fn fix(self, name: ParamName, value: f64) -> Self {
        self.with_param(name, ParamSpec::fixed(value))
    }

    pub fn with_max_nfev(mut self, max_nfev: usize) -> Self {
        self.max_nfev = Some(max_nfev);
        self
    }

    /// Evaluation budget resolved for `nvarys` free parameters.
    pub fn resolved_max_nfev(&self, nvarys: usize) -> usize {
        self.max_nfev.unwrap_or(2000 * (nvarys + 1))
    }

    pub fn from_json_str(json: &str) -> Result<Self, FitError> {
        let config: FitConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, FitError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), FitError> {
        for name in ParamName::ALL {
            let spec = &self.params[name];
            if spec.min.is_nan() || spec.max.is_nan() || spec.min > spec.max || !spec.initial.is_finite() {
                return Err(FitError::InvalidBounds {
                    name,
                    min: spec.min,
                    max: spec.max,
                });
            }
        }
        for (label, tol) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(FitError::InvalidConfig(format!("{label} must be finite and >= 0 (got {tol}).")));
            }
        }
        if self.max_nfev == Some(0) {
            return Err(FitError::InvalidConfig("max_nfev must be > 0.".to_string()));
        }
        if !(self.initial_lambda.is_finite() && self.initial_lambda > 0.0) {
            return Err(FitError::InvalidConfig(format!(
                "initial_lambda must be finite and > 0 (got {}).",
                self.initial_lambda
            )));
        }
        Ok(())
    }
}
