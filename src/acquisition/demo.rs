//! Demo-mode reading simulator
//!
//! Produces plausible readings by a bounded random walk over moisture,
//! temperature and humidity. `raw_analog` is derived from the walked moisture
//! through the calibration inverse, so the reading's moisture is exactly the
//! calibrated value of its raw field. This is an approximation for demo
//! realism, not a physical model.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::calibration::{Calibration, CalibrationError};
use crate::config::defaults::{
    DEMO_HEAT_INDEX_HUMIDITY, DEMO_HEAT_INDEX_OFFSET, DEMO_HUMIDITY_RANGE, DEMO_HUMIDITY_STEP,
    DEMO_MOISTURE_RANGE, DEMO_MOISTURE_STEP, DEMO_TEMPERATURE_RANGE, DEMO_TEMPERATURE_STEP,
};
use crate::types::SensorReading;

/// Walk state carried between simulated readings.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WalkState {
    moisture: f64,
    temperature: f64,
    humidity: f64,
}

impl Default for WalkState {
    fn default() -> Self {
        Self {
            moisture: 45.0,
            temperature: 24.0,
            humidity: 55.0,
        }
    }
}

/// Heat index used for synthetic readings.
pub fn demo_heat_index(temperature: f64, humidity: f64) -> f64 {
    if humidity > DEMO_HEAT_INDEX_HUMIDITY {
        temperature + DEMO_HEAT_INDEX_OFFSET
    } else {
        temperature
    }
}

fn step(rng: &mut StdRng, value: f64, max_step: f64, (lo, hi): (f64, f64)) -> f64 {
    (value + rng.gen_range(-max_step..=max_step)).clamp(lo, hi)
}

fn one_decimal(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub struct DemoSimulator {
    rng: StdRng,
    seed: Option<u64>,
    calibration: Calibration,
    last: Option<WalkState>,
}

impl DemoSimulator {
    /// Simulator seeded from `seed`, or from OS entropy when `None`.
    pub fn new(calibration: Calibration, seed: Option<u64>) -> Self {
        Self {
            rng: Self::rng_for(seed),
            seed,
            calibration,
            last: None,
        }
    }

    fn rng_for(seed: Option<u64>) -> StdRng {
        match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        }
    }

    /// Forget the walk so the next reading starts from the plausible default.
    pub fn reset(&mut self) {
        self.last = None;
        self.rng = Self::rng_for(self.seed);
    }

    /// Perturb the previous simulated reading (or the default on first use).
    pub fn next_reading(&mut self) -> Result<SensorReading, CalibrationError> {
        let state = match self.last {
            None => WalkState::default(),
            Some(prev) => WalkState {
                moisture: step(&mut self.rng, prev.moisture, DEMO_MOISTURE_STEP, DEMO_MOISTURE_RANGE),
                temperature: step(
                    &mut self.rng,
                    prev.temperature,
                    DEMO_TEMPERATURE_STEP,
                    DEMO_TEMPERATURE_RANGE,
                ),
                humidity: step(&mut self.rng, prev.humidity, DEMO_HUMIDITY_STEP, DEMO_HUMIDITY_RANGE),
            },
        };

        let raw = self.calibration.raw_for_moisture(state.moisture.round())?;
        let temperature = one_decimal(state.temperature);
        let humidity = one_decimal(state.humidity);
        let reading = SensorReading::simulated(
            raw,
            temperature,
            humidity,
            demo_heat_index(temperature, humidity),
            &self.calibration,
            Utc::now(),
        )?;

        self.last = Some(state);
        Ok(reading)
    }

    /// `count` consecutive readings, oldest first.
    pub fn batch(&mut self, count: usize) -> Result<Vec<SensorReading>, CalibrationError> {
        (0..count).map(|_| self.next_reading()).collect()
    }
}
