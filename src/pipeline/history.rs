//! Rolling history buffers feeding the chart series.
//!
//! Each metric keeps its own FIFO buffer so series can use different
//! retention without affecting one another.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::defaults::HISTORY_CAPACITY;
use crate::types::SensorReading;

/// Fixed-capacity, insertion-ordered buffer. Pushing past capacity evicts
/// the oldest element.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Default for HistoryBuffer<T> {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl<T> HistoryBuffer<T> {
    /// Buffer holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Only the scheduler's reset path may clear history.
    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> HistoryBuffer<T> {
    /// Current contents, oldest first.
    pub fn to_sequence(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Chart series captured for publication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySeries {
    pub moisture: Vec<u8>,
    pub temperature: Vec<f64>,
    pub humidity: Vec<f64>,
}

/// The three per-metric buffers owned by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct MetricHistory {
    moisture: HistoryBuffer<u8>,
    temperature: HistoryBuffer<f64>,
    humidity: HistoryBuffer<f64>,
}

impl MetricHistory {
    pub fn with_capacities(moisture: usize, temperature: usize, humidity: usize) -> Self {
        Self {
            moisture: HistoryBuffer::new(moisture),
            temperature: HistoryBuffer::new(temperature),
            humidity: HistoryBuffer::new(humidity),
        }
    }

    pub(crate) fn record(&mut self, reading: &SensorReading) {
        self.moisture.push(reading.moisture_percent);
        self.temperature.push(reading.temperature_c);
        self.humidity.push(reading.humidity_percent);
    }

    pub(crate) fn clear(&mut self) {
        self.moisture.clear();
        self.temperature.clear();
        self.humidity.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.moisture.is_empty() && self.temperature.is_empty() && self.humidity.is_empty()
    }

    pub fn moisture(&self) -> &HistoryBuffer<u8> {
        &self.moisture
    }

    pub fn temperature(&self) -> &HistoryBuffer<f64> {
        &self.temperature
    }

    pub fn humidity(&self) -> &HistoryBuffer<f64> {
        &self.humidity
    }

    pub fn series(&self) -> HistorySeries {
        HistorySeries {
            moisture: self.moisture.to_sequence(),
            temperature: self.temperature.to_sequence(),
            humidity: self.humidity.to_sequence(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::Calibration;
    use chrono::Utc;

    #[test]
    fn test_overflow_keeps_last_twenty() {
        let mut buf = HistoryBuffer::new(20);
        for i in 0..25 {
            buf.push(i);
        }
        assert_eq!(buf.len(), 20);
        assert_eq!(buf.to_sequence(), (5..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_under_capacity_preserves_order() {
        let mut buf = HistoryBuffer::new(5);
        buf.push("a");
        buf.push("b");
        assert_eq!(buf.to_sequence(), vec!["a", "b"]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut buf = HistoryBuffer::new(0);
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.to_sequence(), vec![2]);
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(HistoryBuffer::<f64>::default().capacity(), 20);
    }

    #[test]
    fn test_metrics_retained_independently() {
        let mut history = MetricHistory::with_capacities(3, 5, 2);
        let cal = Calibration::default();
        for raw in [100, 200, 300, 400, 500, 600] {
            let reading = SensorReading::simulated(raw, 20.0, 50.0, 22.0, &cal, Utc::now()).unwrap();
            history.record(&reading);
        }
        let series = history.series();
        assert_eq!(series.moisture.len(), 3);
        assert_eq!(series.temperature.len(), 5);
        assert_eq!(series.humidity.len(), 2);
        assert_eq!(series.moisture, vec![39, 49, 59]);
    }

    #[test]
    fn test_clear_empties_all_series() {
        let mut history = MetricHistory::default();
        let reading =
            SensorReading::simulated(512, 20.0, 50.0, 22.0, &Calibration::default(), Utc::now())
                .unwrap();
        history.record(&reading);
        assert!(!history.is_empty());
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.series(), HistorySeries::default());
    }
}
