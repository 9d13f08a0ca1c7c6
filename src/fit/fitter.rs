//! Curve fitter for a single sample set.
//!
//! Given durations `x_i` and observed powers `y_i`, we:
//! - validate the samples and the configuration
//! - build a fresh parameter set (initial guesses clamped into their bounds)
//! - minimize `Σ (p(x_i) − y_i)²` with bounded Levenberg–Marquardt
//! - package the converged values, residuals, statistics and covariance
//!
//! The fitter never mutates itself, so one instance can be fitted from many
//! threads at once and every call returns an independent `FitResult`.

use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::domain::{FitConfig, FitResult, ParamName, ParamReport, PdcParams, SampleSet};
use crate::error::FitError;
use crate::fit::lm::{LmSettings, ResidualProblem, minimize};
use crate::math::{BoundTransform, invert_spd};
use crate::models::{jacobian_row, predict, predict_all};

/// Fits the power-duration model to one set of samples.
#[derive(Debug, Clone)]
pub struct CurveFitter {
    samples: SampleSet,
    config: FitConfig,
}

impl CurveFitter {
    /// Fitter with the default parameter table and solver settings.
    pub fn new(durations: impl Into<Vec<f64>>, powers: impl Into<Vec<f64>>) -> Self {
        Self::from_samples(SampleSet::new(durations, powers), FitConfig::default())
    }

    pub fn with_config(durations: impl Into<Vec<f64>>, powers: impl Into<Vec<f64>>, config: FitConfig) -> Self {
        Self::from_samples(SampleSet::new(durations, powers), config)
    }

    pub fn from_samples(samples: SampleSet, config: FitConfig) -> Self {
        Self { samples, config }
    }

    pub fn durations(&self) -> &[f64] {
        &self.samples.durations
    }

    pub fn powers(&self) -> &[f64] {
        &self.samples.powers
    }

    /// Run one fit.
    ///
    /// Errors on invalid input (empty, mismatched lengths, non-finite values,
    /// durations <= 0), on an invalid configuration and when there are fewer
    /// samples than varying parameters. Running out of evaluations is not an
    /// error: the result comes back with `success == false`.
    pub fn fit(&self) -> Result<FitResult, FitError> {
        self.config.validate()?;
        self.samples.validate()?;

        let table = &self.config.params;
        let init_values = table.initial_values();
        for name in ParamName::ALL {
            let spec = &table[name];
            if !spec.contains(spec.initial) {
                warn!(
                    param = %name,
                    initial = spec.initial,
                    clamped = init_values[name],
                    "initial value outside bounds, clamped"
                );
            }
        }

        let nvarys = table.free_count();
        let var_names: Vec<ParamName> = ParamName::ALL.into_iter().filter(|&n| table[n].is_free()).collect();
        let ndata = self.samples.len();
        if ndata < nvarys {
            return Err(FitError::Underdetermined {
                samples: ndata,
                params: nvarys,
            });
        }

        let problem = PdcProblem {
            x: &self.samples.durations,
            y: &self.samples.powers,
            base: init_values,
            vars: var_names
                .iter()
                .map(|&n| (n, BoundTransform::new(table[n].min, table[n].max)))
                .collect(),
        };
        let u0: Vec<f64> = problem
            .vars
            .iter()
            .map(|&(name, t)| t.to_internal_start(init_values[name]))
            .collect();

        let max_nfev = self.config.resolved_max_nfev(nvarys);
        let settings = LmSettings {
            ftol: self.config.ftol,
            xtol: self.config.xtol,
            gtol: self.config.gtol,
            max_nfev,
            initial_lambda: self.config.initial_lambda,
        };

        debug!(ndata, nvarys, max_nfev, "fitting power-duration curve");
        let outcome = minimize(&problem, &u0, &settings)?;
        let best_values = problem.external(&outcome.u);

        let x = self.durations();
        let y = self.powers();
        let best_fit = predict_all(x, &best_values);
        let init_fit = predict_all(x, &init_values);
        let residual: Vec<f64> = best_fit.iter().zip(y).map(|(f, o)| f - o).collect();
        let chisqr: f64 = residual.iter().map(|r| r * r).sum();

        let nfree = ndata - nvarys;
        let redchi = chisqr / nfree.max(1) as f64;
        let n = ndata as f64;
        let neg2_log_likelihood = n * (chisqr.max(1e-250) / n).ln();
        let aic = neg2_log_likelihood + 2.0 * nvarys as f64;
        let bic = neg2_log_likelihood + n.ln() * nvarys as f64;

        let mean_y = y.iter().sum::<f64>() / n;
        let ss_tot: f64 = y.iter().map(|v| (v - mean_y).powi(2)).sum();
        let r_squared = if ss_tot > 0.0 { 1.0 - chisqr / ss_tot } else { f64::NAN };

        let covar = if nvarys > 0 && nfree > 0 {
            covariance(x, &best_values, &var_names, redchi)
        } else {
            None
        };

        let params = ParamName::ALL
            .into_iter()
            .map(|name| {
                let spec = &table[name];
                let stderr = covar.as_ref().and_then(|c| {
                    var_names
                        .iter()
                        .position(|&v| v == name)
                        .map(|k| c[(k, k)].sqrt())
                });
                ParamReport {
                    name,
                    value: best_values[name],
                    stderr,
                    initial: init_values[name],
                    min: spec.min,
                    max: spec.max,
                    vary: spec.is_free(),
                }
            })
            .collect();

        let success = outcome.status.converged();
        let message = if nvarys == 0 {
            "No varying parameters; model evaluated at the initial values.".to_string()
        } else {
            outcome.status.message(max_nfev)
        };

        debug!(
            nfev = outcome.nfev,
            niter = outcome.niter,
            chisqr,
            success,
            status = ?outcome.status,
            "fit finished"
        );

        Ok(FitResult {
            best_values,
            init_values,
            params,
            var_names,
            success,
            message,
            nfev: outcome.nfev,
            niter: outcome.niter,
            ndata,
            nvarys,
            nfree,
            residual,
            best_fit,
            init_fit,
            chisqr,
            redchi,
            aic,
            bic,
            r_squared,
            errorbars: covar.is_some(),
            covar,
        })
    }
}

/// The model residuals in internal (unbounded) coordinates.
struct PdcProblem<'a> {
    x: &'a [f64],
    y: &'a [f64],
    /// Values of the fixed parameters (varying ones are overwritten).
    base: PdcParams,
    vars: Vec<(ParamName, BoundTransform)>,
}

impl PdcProblem<'_> {
    fn external(&self, u: &[f64]) -> PdcParams {
        let mut p = self.base;
        for (&(name, t), &uk) in self.vars.iter().zip(u) {
            p[name] = t.to_external(uk);
        }
        p
    }
}

impl ResidualProblem for PdcProblem<'_> {
    fn n_params(&self) -> usize {
        self.vars.len()
    }

    fn n_residuals(&self) -> usize {
        self.x.len()
    }

    fn residuals(&self, u: &[f64], out: &mut [f64]) {
        let p = self.external(u);
        for (i, (&x, &y)) in self.x.iter().zip(self.y).enumerate() {
            out[i] = predict(x, &p) - y;
        }
    }

    fn jacobian(&self, u: &[f64], out: &mut DMatrix<f64>) {
        let p = self.external(u);
        let chain: Vec<f64> = self.vars.iter().zip(u).map(|(&(_, t), &uk)| t.derivative(uk)).collect();
        let mut row = [0.0; ParamName::COUNT];
        for (i, &x) in self.x.iter().enumerate() {
            jacobian_row(x, &p, &mut row);
            for (k, &(name, _)) in self.vars.iter().enumerate() {
                out[(i, k)] = row[name.index()] * chain[k];
            }
        }
    }
}

/// `redchi · (JᵀJ)⁻¹` with the Jacobian taken in external coordinates.
fn covariance(x: &[f64], p: &PdcParams, var_names: &[ParamName], redchi: f64) -> Option<DMatrix<f64>> {
    let mut jac = DMatrix::<f64>::zeros(x.len(), var_names.len());
    let mut row = [0.0; ParamName::COUNT];
    for (i, &xi) in x.iter().enumerate() {
        jacobian_row(xi, p, &mut row);
        for (k, name) in var_names.iter().enumerate() {
            jac[(i, k)] = row[name.index()];
        }
    }
    let jtj = jac.transpose() * &jac;
    invert_spd(&jtj).map(|inv| inv * redchi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{NoiseSpec, generate_samples, log_durations};
    use crate::domain::ParamSpec;

    fn athlete() -> PdcParams {
        PdcParams::new(9000.0, 260.0, 2400.0, 14.0, 18.0, 35.0)
    }

    fn synthetic(seed: u64) -> SampleSet {
        let durations = log_durations(1.0, 3600.0, 40).unwrap();
        generate_samples(&athlete(), &durations, &NoiseSpec { sigma: 1.0, seed }).unwrap()
    }

    fn mmp_x() -> Vec<f64> {
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0]
    }

    fn mmp_y() -> Vec<f64> {
        vec![700.0, 650.0, 600.0, 500.0, 400.0, 350.0, 300.0, 280.0, 260.0, 250.0, 240.0]
    }

    #[test]
    fn fit_recovers_synthetic_parameters() {
        let samples = synthetic(7);
        let result = CurveFitter::from_samples(samples.clone(), FitConfig::default()).fit().unwrap();

        assert!(result.success, "{}", result.message);
        let table = FitConfig::default().params;
        for name in ParamName::ALL {
            let v = result.best_values[name];
            assert!(table[name].contains(v), "{name}={v} outside bounds");
        }
        let truth = athlete();
        assert!((result.best_values.ftp - truth.ftp).abs() < 10.0, "{:?}", result.best_values);
        assert!((result.best_values.frc - truth.frc).abs() < 0.15 * truth.frc, "{:?}", result.best_values);

        // Round trip: converged values reproduce the observations to within the noise.
        let predicted = result.eval(&samples.durations);
        let rss: f64 = predicted.iter().zip(&samples.powers).map(|(p, y)| (p - y).powi(2)).sum();
        assert!((rss - result.chisqr).abs() < 1e-9 * rss.max(1.0));
        assert!(rss / (samples.len() as f64) < 4.0, "rss={rss}");
        assert!(result.r_squared > 0.999);
    }

    #[test]
    fn fits_on_identical_data_agree() {
        let a = CurveFitter::new(mmp_x(), mmp_y()).fit().unwrap();
        let b = CurveFitter::new(mmp_x(), mmp_y()).fit().unwrap();
        for name in ParamName::ALL {
            let (va, vb) = (a.best_values[name], b.best_values[name]);
            assert!(((va - vb) / va).abs() < 0.01, "{name}: {va} vs {vb}");
        }
        assert_eq!(a.best_values, b.best_values);
        assert_eq!(a.nfev, b.nfev);
    }

    #[test]
    fn mmp_fit_stays_in_bounds_and_reports_everything() {
        let result = CurveFitter::new(mmp_x(), mmp_y()).fit().unwrap();
        assert!(result.success, "{}", result.message);

        let map = result.best_values_map();
        assert_eq!(map.len(), 6);
        for key in ["frc", "ftp", "tte", "tau", "tau2", "a"] {
            assert!(map.contains_key(key), "missing {key}");
        }
        assert!((1.0..=15000.0).contains(&map["frc"]));
        assert!((100.0..=400.0).contains(&map["ftp"]));
        assert!((1800.0..=3600.0).contains(&map["tte"]));
        assert!((10.0..=25.0).contains(&map["tau"]));
        assert!((10.0..=25.0).contains(&map["tau2"]));
        assert!((1.0..=200.0).contains(&map["a"]));

        assert_eq!(result.ndata, 11);
        assert_eq!(result.nvarys, 6);
        assert_eq!(result.nfree, 5);
        assert_eq!(result.residual.len(), 11);
        assert!(result.chisqr.is_finite() && result.redchi.is_finite());
        assert!(result.aic.is_finite() && result.bic.is_finite());
        assert!(result.chisqr < result.init_fit.iter().zip(mmp_y()).map(|(f, y)| (f - y).powi(2)).sum::<f64>());

        assert!((200.0..=350.0).contains(&map["ftp"]), "ftp={}", map["ftp"]);
        assert!((3000.0..=15000.0).contains(&map["frc"]), "frc={}", map["frc"]);

        let predicted = result.eval(&[1.0, 10.0, 60.0, 300.0, 1200.0, 3600.0]);
        assert!(predicted.iter().all(|&p| p > 0.0), "{predicted:?}");
        assert!(predicted[0] > predicted[5]);
    }

    #[test]
    fn stronger_rider_fits_higher_ftp() {
        let y = vec![800.0, 750.0, 700.0, 600.0, 500.0, 450.0, 400.0, 350.0, 320.0, 300.0, 280.0];
        let result = CurveFitter::new(mmp_x(), y).fit().unwrap();
        assert!(result.success, "{}", result.message);
        assert!((200.0..=400.0).contains(&result.best_values.ftp));
    }

    #[test]
    fn concurrent_fits_on_one_instance_are_independent() {
        let fitter = CurveFitter::new(mmp_x(), mmp_y());
        let results: Vec<FitResult> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| fitter.fit().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for r in &results[1..] {
            assert_eq!(r.best_values, results[0].best_values);
        }
    }

    #[test]
    fn tau2_starts_clamped_into_its_bounds() {
        let config = FitConfig::default().with_param(ParamName::Tau2, ParamSpec::new(5000.0, 10.0, 25.0));
        let result = CurveFitter::with_config(mmp_x(), mmp_y(), config).fit().unwrap();
        assert_eq!(result.init_values.tau2, 25.0);
        assert!((10.0..=25.0).contains(&result.best_values.tau2));
    }

    #[test]
    fn fewer_samples_than_parameters_is_an_error() {
        let err = CurveFitter::new([60.0], [300.0]).fit().unwrap_err();
        assert!(matches!(err, FitError::Underdetermined { samples: 1, params: 6 }));

        let err = CurveFitter::new([1.0, 10.0, 60.0, 300.0, 1200.0], [500.0, 400.0, 300.0, 250.0, 200.0])
            .fit()
            .unwrap_err();
        assert!(matches!(err, FitError::Underdetermined { samples: 5, params: 6 }));
    }

    #[test]
    fn structural_errors_are_reported() {
        assert!(matches!(CurveFitter::new(Vec::new(), Vec::new()).fit(), Err(FitError::EmptyInput)));
        assert!(matches!(
            CurveFitter::new([1.0, 10.0, 60.0], [500.0, 400.0]).fit(),
            Err(FitError::LengthMismatch { .. })
        ));
        assert!(matches!(
            CurveFitter::new([-10.0, 10.0, 60.0], [500.0, 400.0, 300.0]).fit(),
            Err(FitError::NonPositiveDuration { index: 0, .. })
        ));
    }

    #[test]
    fn negative_powers_still_fit() {
        let mut y = mmp_y();
        y[0] = -100.0;
        let result = CurveFitter::new(mmp_x(), y).fit().unwrap();
        assert!(result.chisqr.is_finite());
    }

    #[test]
    fn exhausted_budget_reports_failure_not_error() {
        let config = FitConfig::default().with_max_nfev(3);
        let result = CurveFitter::with_config(mmp_x(), mmp_y(), config).fit().unwrap();
        assert!(!result.success);
        assert!(result.nfev <= 3);
        assert!(result.message.contains("max_nfev=3"), "{}", result.message);
    }

    #[test]
    fn fixed_parameters_do_not_move() {
        let config = FitConfig::default().fix(ParamName::Tte, 2000.0).fix(ParamName::A, 10.0);
        let samples = synthetic(11);
        let result = CurveFitter::from_samples(samples, config).fit().unwrap();

        assert_eq!(result.best_values.tte, 2000.0);
        assert_eq!(result.best_values.a, 10.0);
        assert_eq!(result.nvarys, 4);
        assert_eq!(
            result.var_names,
            [ParamName::Frc, ParamName::Ftp, ParamName::Tau, ParamName::Tau2]
        );
        assert!(!result.param(ParamName::Tte).vary);
        assert!(result.stderr(ParamName::Tte).is_none());
        if let Some(c) = &result.covar {
            assert_eq!(c.shape(), (4, 4));
        }
    }

    #[test]
    fn well_determined_fit_has_error_bars() {
        let config = FitConfig::default().fix(ParamName::Tte, 2400.0).fix(ParamName::A, 35.0);
        let result = CurveFitter::from_samples(synthetic(3), config).fit().unwrap();
        assert!(result.errorbars, "{}", result.message);
        let se = result.stderr(ParamName::Ftp).unwrap();
        assert!(se > 0.0 && se < 10.0, "stderr(ftp)={se}");
        let (lo, hi) = result.confidence_interval(ParamName::Ftp, 2.0).unwrap();
        assert!(lo < result.best_values.ftp && result.best_values.ftp < hi);
        let rho = result.correlation(ParamName::Frc, ParamName::Tau).unwrap();
        assert!((-1.0..=1.0).contains(&rho));
    }

    #[test]
    fn all_fixed_just_evaluates() {
        let mut config = FitConfig::default();
        for name in ParamName::ALL {
            let v = config.params[name].clamped_initial();
            config = config.fix(name, v);
        }
        let result = CurveFitter::with_config([60.0], [300.0], config).fit().unwrap();
        assert_eq!(result.nvarys, 0);
        assert!(result.success);
        assert_eq!(result.best_values, result.init_values);
    }
}
