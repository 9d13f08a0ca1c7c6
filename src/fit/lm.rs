//! Levenberg–Marquardt least squares.
//!
//! Minimizes `Σ rᵢ(u)²` over an unconstrained vector `u`. Bounds are handled
//! by the caller through `math::BoundTransform`, so this loop never sees them.
//!
//! Per iteration:
//! - solve `(JᵀJ + λ·diag(d²)) δ = −Jᵀr`, where `d` is the running maximum of
//!   the Jacobian column norms (1 for columns that have always been zero)
//! - accept the step if it lowers the sum of squares, then shrink `λ` by the
//!   gain ratio; otherwise grow `λ` geometrically
//! - test `ftol` / `xtol` / `gtol` after every trial step (MINPACK semantics)
//!
//! Nothing here is randomized, so identical inputs give identical iterates.

use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::error::FitError;
use crate::math::solve_damped;

/// A least-squares problem in internal coordinates.
pub trait ResidualProblem {
    fn n_params(&self) -> usize;
    fn n_residuals(&self) -> usize;
    fn residuals(&self, u: &[f64], out: &mut [f64]);
    /// `∂rᵢ/∂u_k` into an `n_residuals × n_params` matrix.
    fn jacobian(&self, u: &[f64], out: &mut DMatrix<f64>);
}

#[derive(Debug, Clone, Copy)]
pub struct LmSettings {
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub max_nfev: usize,
    pub initial_lambda: f64,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmStatus {
    Ftol,
    Xtol,
    FtolAndXtol,
    Gtol,
    /// Residuals are exactly zero.
    ExactFit,
    MaxEvaluations,
    /// Damping overflowed without finding a lower sum of squares.
    Stalled,
}

impl LmStatus {
    pub fn converged(self) -> bool {
        !matches!(self, LmStatus::MaxEvaluations | LmStatus::Stalled)
    }

    pub fn message(self, max_nfev: usize) -> String {
        match self {
            LmStatus::Ftol => {
                "Both actual and predicted relative reductions in the sum of squares are at most ftol.".to_string()
            }
            LmStatus::Xtol => "Relative error between two consecutive iterates is at most xtol.".to_string(),
            LmStatus::FtolAndXtol => "Both ftol and xtol convergence conditions are satisfied.".to_string(),
            LmStatus::Gtol => {
                "The cosine of the angle between the residuals and any Jacobian column is at most gtol.".to_string()
            }
            LmStatus::ExactFit => "Residuals are exactly zero.".to_string(),
            LmStatus::MaxEvaluations => {
                format!("Fit aborted: number of function evaluations exceeded max_nfev={max_nfev}.")
            }
            LmStatus::Stalled => "Damping overflowed; no further reduction in the sum of squares is possible.".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub u: Vec<f64>,
    pub residuals: Vec<f64>,
    pub chisqr: f64,
    pub nfev: usize,
    pub niter: usize,
    pub status: LmStatus,
}

const LAMBDA_MAX: f64 = 1e32;

/// Run Levenberg–Marquardt from `u0`.
///
/// Errors only if the objective is not finite at the starting point.
pub fn minimize<P: ResidualProblem>(problem: &P, u0: &[f64], settings: &LmSettings) -> Result<LmOutcome, FitError> {
    let n = problem.n_params();
    let m = problem.n_residuals();

    let mut u = DVector::from_column_slice(u0);
    let mut r = vec![0.0; m];
    problem.residuals(u.as_slice(), &mut r);
    let mut nfev = 1usize;
    let mut chisqr = sum_sq(&r);
    if !chisqr.is_finite() {
        return Err(FitError::Solver("Non-finite residuals at the initial parameters.".to_string()));
    }

    let finish = |u: DVector<f64>, r: Vec<f64>, chisqr: f64, nfev: usize, niter: usize, status: LmStatus| LmOutcome {
        u: u.iter().copied().collect(),
        residuals: r,
        chisqr,
        nfev,
        niter,
        status,
    };

    if n == 0 {
        return Ok(finish(u, r, chisqr, nfev, 0, LmStatus::Ftol));
    }

    let mut jac = DMatrix::<f64>::zeros(m, n);
    problem.jacobian(u.as_slice(), &mut jac);
    let mut scale = DVector::<f64>::from_element(n, 0.0);
    update_scale(&jac, &mut scale);

    let mut lambda = settings.initial_lambda;
    let mut nu = 2.0;
    let mut niter = 0usize;

    loop {
        if chisqr == 0.0 {
            return Ok(finish(u, r, chisqr, nfev, niter, LmStatus::ExactFit));
        }

        let rv = DVector::from_column_slice(&r);
        let jt = jac.transpose();
        let jtj = &jt * &jac;
        let g = &jt * &rv;

        // Scaled gradient: cosine between the residual vector and each column.
        let rnorm = chisqr.sqrt();
        let gnorm = (0..n)
            .map(|k| {
                let cnorm = jac.column(k).norm();
                if cnorm > 0.0 { (g[k] / (cnorm * rnorm)).abs() } else { 0.0 }
            })
            .fold(0.0, f64::max);
        if gnorm <= settings.gtol {
            return Ok(finish(u, r, chisqr, nfev, niter, LmStatus::Gtol));
        }

        niter += 1;
        let rhs = -&g;
        let Some(delta) = solve_damped(&jtj, &rhs, lambda, &scale) else {
            lambda *= nu;
            nu *= 2.0;
            if lambda > LAMBDA_MAX {
                return Ok(finish(u, r, chisqr, nfev, niter, LmStatus::Stalled));
            }
            continue;
        };

        let u_new = &u + &delta;
        let mut r_new = vec![0.0; m];
        problem.residuals(u_new.as_slice(), &mut r_new);
        nfev += 1;
        let chisqr_new = sum_sq(&r_new);

        // Predicted reduction of the linearized model: -δᵀg + λ·δᵀD²δ.
        let damped: f64 = (0..n).map(|k| scale[k] * scale[k] * delta[k] * delta[k]).sum();
        let predicted = -delta.dot(&g) + lambda * damped;
        let actual = chisqr - chisqr_new;
        let ratio = if predicted > 0.0 && chisqr_new.is_finite() {
            actual / predicted
        } else {
            -1.0
        };

        let step_norm = damped.sqrt();
        let x_norm = (0..n).map(|k| (scale[k] * u[k]).powi(2)).sum::<f64>().sqrt();
        let rel_actual = if chisqr_new.is_finite() { actual / chisqr } else { -1.0 };
        let rel_predicted = predicted / chisqr;

        trace!(niter, nfev, lambda, chisqr, chisqr_new, ratio, "lm step");

        let ftol_ok = rel_actual.abs() <= settings.ftol && rel_predicted <= settings.ftol && 0.5 * ratio <= 1.0;
        let xtol_ok = step_norm <= settings.xtol * (x_norm + settings.xtol);

        if ratio > 0.0 {
            u = u_new;
            r = r_new;
            chisqr = chisqr_new;
            problem.jacobian(u.as_slice(), &mut jac);
            update_scale(&jac, &mut scale);
            let shrink = 1.0 - (2.0 * ratio - 1.0).powi(3);
            lambda *= shrink.max(1.0 / 3.0);
            nu = 2.0;
        } else {
            lambda *= nu;
            nu *= 2.0;
        }

        match (ftol_ok, xtol_ok) {
            (true, true) => return Ok(finish(u, r, chisqr, nfev, niter, LmStatus::FtolAndXtol)),
            (true, false) => return Ok(finish(u, r, chisqr, nfev, niter, LmStatus::Ftol)),
            (false, true) => return Ok(finish(u, r, chisqr, nfev, niter, LmStatus::Xtol)),
            (false, false) => {}
        }

        if nfev >= settings.max_nfev {
            return Ok(finish(u, r, chisqr, nfev, niter, LmStatus::MaxEvaluations));
        }
        if lambda > LAMBDA_MAX {
            return Ok(finish(u, r, chisqr, nfev, niter, LmStatus::Stalled));
        }
    }
}

fn sum_sq(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

/// Marquardt scaling: keep the largest column norm seen so far.
fn update_scale(jac: &DMatrix<f64>, scale: &mut DVector<f64>) {
    for k in 0..jac.ncols() {
        let c = jac.column(k).norm();
        if c.is_finite() && c > scale[k] {
            scale[k] = c;
        }
    }
    for k in 0..scale.len() {
        if scale[k] == 0.0 {
            scale[k] = 1.0;
        }
    }
}
