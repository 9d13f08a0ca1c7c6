//! Read/write curve JSON files.
//!
//! Curve JSON is the portable representation of a fitted curve:
//! - per-parameter values, errors and bounds
//! - fit quality statistics
//! - the covariance of the varying parameters (when it could be estimated)
//! - a precomputed fitted grid for quick plotting

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{FitQuality, FitResult, ParamName, ParamReport, PdcParams};
use crate::error::FitError;
use crate::report::{CurveGrid, fitted_grid};

/// Grid resolution written by `write_curve_json`.
const GRID_POINTS: usize = 101;

/// A saved curve file (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFile {
    pub tool: String,
    pub params: Vec<ParamReport>,
    pub quality: FitQuality,
    pub message: String,
    /// Row/column names of `covariance`.
    pub var_names: Vec<ParamName>,
    pub covariance: Option<Vec<Vec<f64>>>,
    pub grid: CurveGrid,
}

impl CurveFile {
    /// Snapshot a fit, with the grid spanning the sampled durations.
    pub fn from_result(result: &FitResult, x_min: f64, x_max: f64) -> Result<Self, FitError> {
        let covariance = result.covar.as_ref().map(|c| {
            (0..c.nrows())
                .map(|i| (0..c.ncols()).map(|j| c[(i, j)]).collect())
                .collect()
        });
        Ok(Self {
            tool: "pdc-fit".to_string(),
            params: result.params.clone(),
            quality: result.quality(),
            message: result.message.clone(),
            var_names: result.var_names.clone(),
            covariance,
            grid: fitted_grid(result, x_min, x_max, GRID_POINTS)?,
        })
    }

    /// Parameter values as stored in the file.
    pub fn values(&self) -> PdcParams {
        let mut out = PdcParams::from_array([0.0; ParamName::COUNT]);
        for p in &self.params {
            out[p.name] = p.value;
        }
        out
    }
}

/// Serialize a fit to `writer`.
pub fn write_curve<W: Write>(writer: W, result: &FitResult, x_min: f64, x_max: f64) -> Result<(), FitError> {
    let curve = CurveFile::from_result(result, x_min, x_max)?;
    serde_json::to_writer_pretty(writer, &curve)?;
    Ok(())
}

pub fn read_curve<R: Read>(reader: R) -> Result<CurveFile, FitError> {
    Ok(serde_json::from_reader(reader)?)
}

/// Write a curve JSON file; the grid covers the fitted durations.
pub fn write_curve_json(path: &Path, result: &FitResult, durations: &[f64]) -> Result<(), FitError> {
    let (x_min, x_max) = duration_span(durations);
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_curve(&mut writer, result, x_min, x_max)?;
    writer.flush()?;
    Ok(())
}

/// Read a curve JSON file.
pub fn read_curve_json(path: &Path) -> Result<CurveFile, FitError> {
    let file = File::open(path)?;
    read_curve(BufReader::new(file))
}

fn duration_span(durations: &[f64]) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &d in durations.iter().filter(|d| d.is_finite() && **d > 0.0) {
        lo = lo.min(d);
        hi = hi.max(d);
    }
    if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
        // Fall back to the standard 1 s – 1 h span.
        return (1.0, 3600.0);
    }
    (lo, hi)
}
