//! Small dense solves used by the Levenberg–Marquardt loop.
//!
//! Each iteration solves the damped normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(d²)) δ = −Jᵀr
//! ```
//!
//! for at most six unknowns. Cholesky is tried first; if the matrix is not
//! numerically positive definite we fall back to SVD with progressively looser
//! tolerances.

use nalgebra::{DMatrix, DVector};

/// Solve `(jtj + lambda · diag(scale²)) δ = rhs`.
///
/// Returns `None` if no finite solution could be found.
pub fn solve_damped(
    jtj: &DMatrix<f64>,
    rhs: &DVector<f64>,
    lambda: f64,
    scale: &DVector<f64>,
) -> Option<DVector<f64>> {
    let mut a = jtj.clone();
    for j in 0..a.nrows() {
        a[(j, j)] += lambda * scale[j] * scale[j];
    }

    if let Some(chol) = a.clone().cholesky() {
        let delta = chol.solve(rhs);
        if delta.iter().all(|v| v.is_finite()) {
            return Some(delta);
        }
    }

    let svd = a.svd(true, true);
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(delta) = svd.solve(rhs, tol) {
            if delta.iter().all(|v| v.is_finite()) {
                return Some(delta);
            }
        }
    }

    None
}

/// Inverse of a symmetric positive definite matrix (parameter covariance).
///
/// Returns `None` when the matrix is singular or the inverse has a
/// non-positive or non-finite diagonal.
pub fn invert_spd(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let inv = m.clone().cholesky()?.inverse();
    let ok = (0..inv.nrows()).all(|i| inv[(i, i)].is_finite() && inv[(i, i)] > 0.0)
        && inv.iter().all(|v| v.is_finite());
    ok.then_some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undamped_solve_recovers_linear_fit() {
        // Normal equations of y = 2 + 3x on x = [0, 1, 2].
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);
        let jtj = x.transpose() * &x;
        let rhs = x.transpose() * y;
        let scale = DVector::from_element(2, 1.0);

        let beta = solve_damped(&jtj, &rhs, 0.0, &scale).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn damping_regularizes_singular_matrix() {
        let jtj = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        let rhs = DVector::from_row_slice(&[1.0, 0.0]);
        let scale = DVector::from_element(2, 1.0);
        let delta = solve_damped(&jtj, &rhs, 1.0, &scale).unwrap();
        assert!((delta[0] - 0.5).abs() < 1e-12);
        assert_eq!(delta[1], 0.0);
    }

    #[test]
    fn singular_matrix_has_no_covariance() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(invert_spd(&m).is_none());
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 2.0]);
        let inv = invert_spd(&m).unwrap();
        assert!((inv[(0, 0)] - 0.25).abs() < 1e-12);
        assert!((inv[(1, 1)] - 0.5).abs() < 1e-12);
    }
}
