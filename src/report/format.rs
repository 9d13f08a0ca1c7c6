//! Formatted fit reports.
//!
//! Formatting lives here so the fitting code stays free of presentation.

use crate::domain::{FitResult, ParamReport};

/// Parameters whose converged value is within this fraction of their box are flagged.
const AT_BOUND_REL: f64 = 1e-6;

/// Multi-line report: fit statistics, then one line per parameter.
pub fn format_fit_report(result: &FitResult) -> String {
    let mut out = String::new();

    out.push_str("[[Fit Statistics]]\n");
    out.push_str("    # fitting method   = leastsq (bounded Levenberg-Marquardt)\n");
    out.push_str(&format!("    # function evals   = {}\n", result.nfev));
    out.push_str(&format!("    # data points      = {}\n", result.ndata));
    out.push_str(&format!("    # variables        = {}\n", result.nvarys));
    out.push_str(&format!("    chi-square         = {:.6}\n", result.chisqr));
    out.push_str(&format!("    reduced chi-square = {:.6}\n", result.redchi));
    out.push_str(&format!("    Akaike info crit   = {:.6}\n", result.aic));
    out.push_str(&format!("    Bayesian info crit = {:.6}\n", result.bic));
    out.push_str(&format!("    R-squared          = {:.6}\n", result.r_squared));
    out.push_str(&format!(
        "    success            = {} ({})\n",
        result.success, result.message
    ));

    out.push_str("[[Variables]]\n");
    for p in &result.params {
        out.push_str(&format!("    {}\n", format_param_line(p)));
    }
    if result.nvarys > 0 && !result.errorbars {
        out.push_str("    ** uncertainties could not be estimated **\n");
    }

    out
}

fn format_param_line(p: &ParamReport) -> String {
    let mut line = format!("{:<5} {:>12.4}", format!("{}:", p.name), p.value);

    if !p.vary {
        line.push_str(" (fixed)");
        return line;
    }

    match p.stderr {
        Some(se) => {
            let rel = if p.value != 0.0 { 100.0 * se / p.value.abs() } else { f64::INFINITY };
            line.push_str(&format!(" +/- {se:.4} ({rel:.2}%)"));
        }
        None => line.push_str(" +/- n/a"),
    }
    line.push_str(&format!(" (init = {}) [{}, {}]", p.initial, p.min, p.max));
    if p.at_bound(AT_BOUND_REL) {
        line.push_str(" at bound");
    }
    line
}
