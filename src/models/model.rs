//! Power-duration model evaluation.
//!
//! ```text
//! p(x) = frc/x · (1 − e^(−x/tau)) + ftp · (1 − e^(−x/tau2)) − max(0, a · ln(x/tte))
//! ```
//!
//! - the first term is the anaerobic contribution, saturating with `tau` and
//!   vanishing like `1/x`
//! - the second term is the aerobic contribution, saturating with `tau2`
//! - the third term is a logarithmic decay that only applies past `tte`
//!
//! `1 − e^(−z)` is computed as `-expm1(-z)` to keep precision for small `z`.
//!
//! Durations are not validated here. `x = 0` and `x < 0` both evaluate to NaN.

use crate::domain::{ParamName, PdcParams};

/// Predicted sustainable power (W) after `x` seconds.
pub fn power_curve(x: f64, frc: f64, ftp: f64, tte: f64, tau: f64, tau2: f64, a: f64) -> f64 {
    let anaerobic = frc / x * saturation(x, tau);
    let aerobic = ftp * saturation(x, tau2);
    anaerobic + aerobic - decay_penalty(x, tte, a)
}

/// `power_curve` with a parameter set.
pub fn predict(x: f64, p: &PdcParams) -> f64 {
    power_curve(x, p.frc, p.ftp, p.tte, p.tau, p.tau2, p.a)
}

/// Elementwise `predict` over all durations.
pub fn predict_all(xs: &[f64], p: &PdcParams) -> Vec<f64> {
    xs.iter().map(|&x| predict(x, p)).collect()
}

/// `max(0, a · ln(x/tte))`, except that a NaN logarithm is passed through.
pub fn decay_penalty(x: f64, tte: f64, a: f64) -> f64 {
    let q = a * (x / tte).ln();
    // f64::max would turn NaN into 0 here.
    if q > 0.0 || q.is_nan() { q } else { 0.0 }
}

/// `1 − e^(−x/tau)`.
fn saturation(x: f64, tau: f64) -> f64 {
    -(-x / tau).exp_m1()
}

/// Partial derivatives of `p(x)` in `ParamName::ALL` order.
///
/// The penalty term is not differentiable at `x == tte`; there the derivative
/// of the inactive branch (zero) is used.
pub fn jacobian_row(x: f64, p: &PdcParams, out: &mut [f64; ParamName::COUNT]) {
    let e1 = (-x / p.tau).exp();
    let e2 = (-x / p.tau2).exp();
    let log_ratio = (x / p.tte).ln();
    let active = p.a * log_ratio > 0.0;

    out[ParamName::Frc.index()] = saturation(x, p.tau) / x;
    out[ParamName::Ftp.index()] = saturation(x, p.tau2);
    out[ParamName::Tte.index()] = if active { p.a / p.tte } else { 0.0 };
    out[ParamName::Tau.index()] = -p.frc * e1 / (p.tau * p.tau);
    out[ParamName::Tau2.index()] = -p.ftp * x * e2 / (p.tau2 * p.tau2);
    out[ParamName::A.index()] = if active { -log_ratio } else { 0.0 };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> PdcParams {
        PdcParams::new(5000.0, 250.0, 2000.0, 15.0, 5000.0, 10.0)
    }

    #[test]
    fn curve_is_positive_and_decays_over_anaerobic_range() {
        let p = reference();
        let xs = [1.0, 10.0, 60.0, 300.0, 1200.0];
        let ys = predict_all(&xs, &p);
        assert_eq!(ys.len(), xs.len());
        assert!(ys.iter().all(|&y| y.is_finite() && y > 0.0), "{ys:?}");
        // With tau2 = 5000 s the aerobic term is still rising at 20 min, so the
        // curve is only strictly decreasing while the anaerobic term dominates.
        for w in ys[..4].windows(2) {
            assert!(w[0] > w[1], "{ys:?}");
        }
        assert!(ys[0] > ys[4]);
    }

    #[test]
    fn scalar_call_matches_vector_call() {
        let p = reference();
        let y = power_curve(60.0, 5000.0, 250.0, 2000.0, 15.0, 5000.0, 10.0);
        assert!(y > 0.0);
        assert_eq!(y, predict_all(&[60.0], &p)[0]);
    }

    #[test]
    fn no_penalty_at_time_to_exhaustion() {
        let p = reference();
        assert_eq!(decay_penalty(2000.0, p.tte, p.a), 0.0);

        let x = 2000.0_f64;
        let without_penalty =
            p.frc / x * (1.0 - (-x / p.tau).exp()) + p.ftp * (1.0 - (-x / p.tau2).exp());
        let y = predict(x, &p);
        assert!((y - without_penalty).abs() < 1e-10, "{y} vs {without_penalty}");
    }

    #[test]
    fn penalty_only_past_time_to_exhaustion() {
        let p = reference();
        assert_eq!(decay_penalty(1999.0, p.tte, p.a), 0.0);
        let past = decay_penalty(4000.0, p.tte, p.a);
        assert!((past - 10.0 * 2.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn higher_frc_lifts_short_end_and_higher_ftp_lifts_long_end() {
        let base = reference();
        let more_frc = PdcParams { frc: 7000.0, ..base };
        let more_ftp = PdcParams { ftp: 300.0, ..base };
        assert!(predict(60.0, &more_frc) > predict(60.0, &base));
        assert!(predict(1200.0, &more_ftp) > predict(1200.0, &base));
    }

    #[test]
    fn edge_parameter_sets_stay_positive() {
        let xs = [1.0, 1800.0, 3600.0];
        let low = PdcParams::new(1000.0, 100.0, 1800.0, 10.0, 10.0, 1.0);
        let high = PdcParams::new(15000.0, 400.0, 3600.0, 25.0, 25000.0, 200.0);
        assert!(predict_all(&xs, &low).iter().all(|&y| y > 0.0));
        assert!(predict_all(&xs, &high).iter().all(|&y| y > 0.0));
    }

    #[test]
    fn non_positive_durations_are_nan() {
        let p = reference();
        assert!(predict(0.0, &p).is_nan());
        assert!(predict(-10.0, &p).is_nan());
    }

    #[test]
    fn jacobian_matches_central_differences() {
        let p = PdcParams::new(6000.0, 240.0, 1900.0, 14.0, 20.0, 30.0);
        for &x in &[2.0, 45.0, 600.0, 3000.0] {
            let mut row = [0.0; ParamName::COUNT];
            jacobian_row(x, &p, &mut row);
            for name in ParamName::ALL {
                let h = 1e-6 * p[name].abs().max(1.0);
                let mut hi = p;
                let mut lo = p;
                hi[name] += h;
                lo[name] -= h;
                let fd = (predict(x, &hi) - predict(x, &lo)) / (2.0 * h);
                let an = row[name.index()];
                assert!(
                    (fd - an).abs() <= 1e-5 * an.abs().max(1e-3),
                    "d/d{name} at x={x}: analytic {an}, numeric {fd}"
                );
            }
        }
    }
}
