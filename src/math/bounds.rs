//! Box constraints via a change of variables.
//!
//! The optimizer works on an unconstrained internal coordinate `u` and the
//! model sees the external value `v(u)`, which can never leave `[min, max]`:
//!
//! - both bounds: `v = min + (sin(u) + 1) · (max − min) / 2`
//! - lower only:  `v = min − 1 + sqrt(u² + 1)`
//! - upper only:  `v = max + 1 − sqrt(u² + 1)`
//! - no bounds:   `v = u`
//!
//! This is the MINPACK-1 convention also used by lmfit.

const START_OFFSET: f64 = 1e-6;

/// Mapping between internal and external coordinates for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundTransform {
    Unbounded,
    Lower(f64),
    Upper(f64),
    Both { min: f64, max: f64 },
}

impl BoundTransform {
    pub fn new(min: f64, max: f64) -> Self {
        match (min.is_finite(), max.is_finite()) {
            (true, true) => BoundTransform::Both { min, max },
            (true, false) => BoundTransform::Lower(min),
            (false, true) => BoundTransform::Upper(max),
            (false, false) => BoundTransform::Unbounded,
        }
    }

    /// Internal coordinate for an external value (clamped into the box first).
    pub fn to_internal(self, v: f64) -> f64 {
        match self {
            BoundTransform::Unbounded => v,
            BoundTransform::Lower(min) => {
                let s = v.max(min) - min + 1.0;
                (s * s - 1.0).sqrt()
            }
            BoundTransform::Upper(max) => {
                let s = max - v.min(max) + 1.0;
                (s * s - 1.0).sqrt()
            }
            BoundTransform::Both { min, max } => {
                let z = 2.0 * (v - min) / (max - min) - 1.0;
                z.clamp(-1.0, 1.0).asin()
            }
        }
    }

    /// Internal starting coordinate for `v`.
    ///
    /// A start exactly on a finite bound has `dv/du = 0` and would never move,
    /// so it is pulled inside the box by `START_OFFSET` of the span (or of the
    /// bound's magnitude for one-sided boxes).
    pub fn to_internal_start(self, v: f64) -> f64 {
        let v = match self {
            BoundTransform::Unbounded => v,
            BoundTransform::Lower(min) if v <= min => min + START_OFFSET * min.abs().max(1.0),
            BoundTransform::Upper(max) if v >= max => max - START_OFFSET * max.abs().max(1.0),
            BoundTransform::Both { min, max } if v <= min => min + START_OFFSET * (max - min),
            BoundTransform::Both { min, max } if v >= max => max - START_OFFSET * (max - min),
            _ => v,
        };
        self.to_internal(v)
    }

    pub fn to_external(self, u: f64) -> f64 {
        match self {
            BoundTransform::Unbounded => u,
            BoundTransform::Lower(min) => min - 1.0 + (u * u + 1.0).sqrt(),
            BoundTransform::Upper(max) => max + 1.0 - (u * u + 1.0).sqrt(),
            BoundTransform::Both { min, max } => {
                let v = min + (u.sin() + 1.0) * (max - min) / 2.0;
                // Rounding can overshoot by an ulp at the edges.
                v.clamp(min, max)
            }
        }
    }

    /// `dv/du`, used to chain model derivatives into internal coordinates.
    pub fn derivative(self, u: f64) -> f64 {
        match self {
            BoundTransform::Unbounded => 1.0,
            BoundTransform::Lower(_) => u / (u * u + 1.0).sqrt(),
            BoundTransform::Upper(_) => -u / (u * u + 1.0).sqrt(),
            BoundTransform::Both { min, max } => u.cos() * (max - min) / 2.0,
        }
    }
}
