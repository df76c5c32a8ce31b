//! Bounded per-channel time series

use alloc::collections::VecDeque;

use log::debug;
use serde::{Serialize, Serializer};

use super::Sample;
use crate::sensors::SensorType;

/// Summary of a channel's series for trend headers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

/// Time-ordered samples for one channel with a live ceiling
///
/// Samples are appended at the tail and evicted from the head, so the buffer
/// always holds the newest `live_ceiling` samples. Only snapshot ingestion
/// re-sorts (see [`TimeSeriesBuffer::extend_sorted`]).
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    sensor: SensorType,
    samples: VecDeque<Sample>,
    live_ceiling: usize,
}

impl TimeSeriesBuffer {
    pub fn new(sensor: SensorType, live_ceiling: usize) -> Self {
        Self {
            sensor,
            samples: VecDeque::with_capacity(live_ceiling.min(1440) + 1),
            live_ceiling,
        }
    }

    pub const fn sensor(&self) -> SensorType {
        self.sensor
    }

    pub const fn live_ceiling(&self) -> usize {
        self.live_ceiling
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a sample at the tail.
    ///
    /// An out-of-order timestamp is kept where it lands; the buffer is not
    /// re-sorted here.
    pub fn append(&mut self, sample: Sample) {
        if let Some(last) = self.samples.back()
            && sample.timestamp < last.timestamp
        {
            debug!(
                "{} sample at {} arrived before tail at {}",
                self.sensor.label(),
                sample.timestamp,
                last.timestamp
            );
        }
        self.samples.push_back(sample);
    }

    /// Drop samples from the head until the live ceiling holds.
    ///
    /// Returns how many samples were evicted.
    pub fn evict_if_over_capacity(&mut self) -> usize {
        let excess = self.samples.len().saturating_sub(self.live_ceiling);
        self.samples.drain(..excess);
        excess
    }

    /// Bulk-insert `samples` and restore timestamp order with one stable sort.
    pub fn extend_sorted<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = Sample>,
    {
        self.samples.extend(samples);
        self.samples
            .make_contiguous()
            .sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Most recent sample, or the channel's fallback value at time zero.
    pub fn latest(&self) -> Sample {
        self.samples
            .back()
            .copied()
            .unwrap_or(Sample::new(0, self.sensor.fallback_value()))
    }

    /// Most recent sample if any data exists
    pub fn last(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    /// Last `n` samples in ascending time order.
    ///
    /// Empty when the buffer holds fewer than two samples, since a single
    /// point cannot be drawn as a line.
    pub fn window(&self, n: usize) -> impl Iterator<Item = Sample> + '_ {
        let len = self.samples.len();
        let start = if len < 2 { len } else { len - n.min(len) };
        self.samples.range(start..).copied()
    }

    /// Full series, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    pub fn stats(&self) -> Option<SeriesStats> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sum = 0.0;
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for sample in &self.samples {
            sum += sample.value;
            min = min.min(sample.value);
            max = max.max(sample.value);
        }

        let count = self.samples.len();
        Some(SeriesStats {
            min,
            max,
            avg: sum / count as f64,
            count,
        })
    }
}

impl Serialize for TimeSeriesBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.samples.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn buffer_with(ceiling: usize, timestamps: &[u64]) -> TimeSeriesBuffer {
        let mut buffer = TimeSeriesBuffer::new(SensorType::Temperature, ceiling);
        for &ts in timestamps {
            buffer.append(Sample::new(ts, ts as f64));
        }
        buffer
    }

    #[test]
    fn test_eviction_only_removes_from_head() {
        let mut buffer = buffer_with(3, &[1, 2, 3, 4, 5]);

        assert_eq!(buffer.evict_if_over_capacity(), 2);
        assert_eq!(buffer.len(), 3);
        let kept: Vec<u64> = buffer.iter().map(|s| s.timestamp).collect();
        assert_eq!(kept, [3, 4, 5]);
    }

    #[test]
    fn test_append_evict_never_exceeds_ceiling() {
        let mut buffer = TimeSeriesBuffer::new(SensorType::Co2, 24);
        for ts in 0..300u64 {
            buffer.append(Sample::new(ts, 400.0 + ts as f64));
            buffer.evict_if_over_capacity();
            assert!(buffer.len() <= 24);
        }

        let kept: Vec<u64> = buffer.iter().map(|s| s.timestamp).collect();
        let expected: Vec<u64> = (276..300).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn test_append_does_not_resort() {
        let buffer = buffer_with(10, &[5, 3]);
        let order: Vec<u64> = buffer.iter().map(|s| s.timestamp).collect();
        assert_eq!(order, [5, 3]);
    }

    #[test]
    fn test_latest_falls_back_when_empty() {
        let buffer = TimeSeriesBuffer::new(SensorType::Humidity, 10);
        assert_eq!(buffer.latest(), Sample::new(0, 80.0));
        assert!(buffer.last().is_none());

        let buffer = buffer_with(10, &[1, 9]);
        assert_eq!(buffer.latest().timestamp, 9);
    }

    #[test]
    fn test_window_needs_two_samples() {
        let buffer = buffer_with(10, &[1]);
        assert_eq!(buffer.window(10).count(), 0);

        let buffer = buffer_with(10, &[1, 2, 3, 4]);
        let last_two: Vec<u64> = buffer.window(2).map(|s| s.timestamp).collect();
        assert_eq!(last_two, [3, 4]);
        assert_eq!(buffer.window(50).count(), 4);
    }

    #[test]
    fn test_extend_sorted_is_stable() {
        let mut buffer = TimeSeriesBuffer::new(SensorType::Temperature, 10);
        buffer.append(Sample::new(20, 1.0));
        buffer.extend_sorted([Sample::new(10, 2.0), Sample::new(20, 3.0), Sample::new(5, 4.0)]);

        let values: Vec<f64> = buffer.iter().map(|s| s.value).collect();
        // The live sample at t=20 stays ahead of the snapshot sample at t=20.
        assert_eq!(values, [4.0, 2.0, 1.0, 3.0]);
    }

    #[test]
    fn test_stats_over_series() {
        let buffer = buffer_with(10, &[10, 20, 30]);
        let stats = buffer.stats().unwrap();

        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.avg, 20.0);
        assert!(TimeSeriesBuffer::new(SensorType::Co2, 5).stats().is_none());
    }
}
