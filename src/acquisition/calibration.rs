//! Moisture calibration
//!
//! Converts raw ADC readings from the soil probe into moisture percent using
//! a two-point linear curve. The default curve is the direct mapping
//! `0 → 0 %`, `1024 → 100 %`. The older dashboard curve (`1023 → 0 %`,
//! `300 → 100 %`) can be selected with [`Calibration::dashboard`] or through
//! the `[calibration]` config section.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::mapper::{clamp_between, try_map_value, MapError};
use crate::config::defaults::{RAW_DRY, RAW_WET, REVERSE_RAW_MAX};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("calibration curve is degenerate: {0}")]
    Range(#[from] MapError),
}

/// Two-point linear moisture curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Raw value read in completely dry soil (0 %)
    pub raw_dry: f64,
    /// Raw value read in saturated soil (100 %)
    pub raw_wet: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            raw_dry: RAW_DRY,
            raw_wet: RAW_WET,
        }
    }
}

impl Calibration {
    pub fn new(raw_dry: f64, raw_wet: f64) -> Self {
        Self { raw_dry, raw_wet }
    }

    /// Inverted curve used by the early dashboard screen.
    pub fn dashboard() -> Self {
        Self::new(1023.0, 300.0)
    }

    /// Clamp `raw` to the curve's span, scale to 0-100 and round.
    pub fn moisture_percent(&self, raw: i32) -> Result<u8, CalibrationError> {
        let clamped = clamp_between(f64::from(raw), self.raw_dry, self.raw_wet);
        let pct = try_map_value(clamped, self.raw_dry, self.raw_wet, 0.0, 100.0)?;
        Ok(pct.round().clamp(0.0, 100.0) as u8)
    }

    /// Exact inverse of [`moisture_percent`](Self::moisture_percent) for whole percents.
    ///
    /// `moisture_percent(raw_for_moisture(p)) == p` for every `p` in `0..=100`.
    pub fn raw_for_moisture(&self, pct: f64) -> Result<i32, CalibrationError> {
        if self.raw_dry == self.raw_wet {
            return Err(MapError::DegenerateRange(self.raw_dry).into());
        }
        let raw = try_map_value(pct.clamp(0.0, 100.0), 0.0, 100.0, self.raw_dry, self.raw_wet)?;
        Ok(raw.round() as i32)
    }
}

/// Canonical conversion: clamp to `[0, 1024]`, scale linearly to `[0, 100]`, round.
pub fn raw_to_moisture_percent(raw: i32) -> u8 {
    let clamped = f64::from(raw).clamp(RAW_DRY, RAW_WET);
    let pct = clamped / RAW_WET * 100.0;
    pct.round() as u8
}

/// Reverse conversion onto the `[0, 850]` raw range.
///
/// Lossy against [`raw_to_moisture_percent`]: the two ranges differ, so a
/// round trip lands within one percent step (8.5 raw units) of `raw * 850 / 1024`.
pub fn moisture_percent_to_raw(pct: f64) -> i32 {
    let pct = if pct.is_finite() { pct.clamp(0.0, 100.0) } else { 0.0 };
    (pct / 100.0 * REVERSE_RAW_MAX).round() as i32
}
