//! Numeric range mapping used by calibration and the demo simulator.
//!
//! `map_value` is a plain affine transform and never clamps; callers clamp
//! explicitly. A degenerate source range yields a non-finite result, which
//! `try_map_value` turns into a [`MapError`].

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MapError {
    #[error("degenerate source range: low and high are both {0}")]
    DegenerateRange(f64),

    #[error("non-finite mapping result for input {0}")]
    NonFinite(f64),
}

/// Affine transform of `x` from `[from_low, from_high]` onto `[to_low, to_high]`.
///
/// Returns NaN or ±infinity when `from_high == from_low`.
pub fn map_value(x: f64, from_low: f64, from_high: f64, to_low: f64, to_high: f64) -> f64 {
    to_low + (to_high - to_low) * (x - from_low) / (from_high - from_low)
}

/// Like [`map_value`] but rejects degenerate ranges and non-finite results.
pub fn try_map_value(
    x: f64,
    from_low: f64,
    from_high: f64,
    to_low: f64,
    to_high: f64,
) -> Result<f64, MapError> {
    if from_high == from_low {
        return Err(MapError::DegenerateRange(from_low));
    }
    let mapped = map_value(x, from_low, from_high, to_low, to_high);
    if mapped.is_finite() {
        Ok(mapped)
    } else {
        Err(MapError::NonFinite(x))
    }
}

/// Clamp `x` into the range spanned by `a` and `b`, whichever order they come in.
pub fn clamp_between(x: f64, a: f64, b: f64) -> f64 {
    x.clamp(a.min(b), a.max(b))
}
