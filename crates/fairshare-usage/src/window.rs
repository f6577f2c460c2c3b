//! Time-decayed aggregation of point usage samples over a window

use fairshare_core::{ClusterUsage, QueueId, QueueUsage, ResourceName, UsageParams, WindowType};
use std::collections::HashMap;
use std::ops::Range;
use std::time::Duration;
use tracing::debug;

/// Extra param naming the spacing between consecutive samples
pub const SAMPLE_INTERVAL_PARAM: &str = "sampleInterval";

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Absolute allocation of every queue at one sample tick
pub type QueueAllocations = HashMap<QueueId, QueueUsage>;

/// Turns a sequence of samples into one normalized usage figure per queue.
///
/// The sample at window position `i` (0 = oldest, `W - 1` = newest) gets the raw
/// weight `0.5^((W - i) / h)` where `h` is the half-life in samples; weights are then
/// renormalized to sum to 1. Each sample is divided by its own cluster capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAggregator {
    window_len: usize,
    window_type: WindowType,
    half_life_samples: f64,
}

impl WindowAggregator {
    /// Create an aggregator over `window_len` samples with a one-sample half-life
    pub fn new(window_len: usize, window_type: WindowType) -> Self {
        Self {
            window_len: window_len.max(1),
            window_type,
            half_life_samples: 1.0,
        }
    }

    pub fn with_half_life(mut self, half_life_samples: f64) -> Self {
        if half_life_samples.is_finite() && half_life_samples > 0.0 {
            self.half_life_samples = half_life_samples;
        }
        self
    }

    /// Derive window length and half-life from the configured durations
    pub fn from_params(params: &UsageParams) -> Self {
        let mut sample_interval =
            params.extra_duration_param_or_default(SAMPLE_INTERVAL_PARAM, DEFAULT_SAMPLE_INTERVAL);
        if sample_interval.is_zero() {
            sample_interval = DEFAULT_SAMPLE_INTERVAL;
        }
        let tick = sample_interval.as_secs_f64();

        let window_len = (params.window_size_or_default().as_secs_f64() / tick).floor() as usize;
        let aggregator = Self::new(window_len, params.window_type_or_default());

        match params.half_life_period {
            Some(half_life) => aggregator.with_half_life(half_life.as_secs_f64() / tick),
            None => aggregator,
        }
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    pub fn half_life_samples(&self) -> f64 {
        self.half_life_samples
    }

    /// Indices of the samples that fall inside the current window
    pub fn window_range(&self, history_len: usize) -> Range<usize> {
        match self.window_type {
            WindowType::Sliding => history_len.saturating_sub(self.window_len)..history_len,
            WindowType::Tumbling => {
                if history_len == 0 {
                    return 0..0;
                }
                let bucket_start = (history_len - 1) / self.window_len * self.window_len;
                bucket_start..history_len
            }
        }
    }

    /// Normalized decay weights for `n` selected samples, oldest first
    pub fn decay_weights(&self, n: usize) -> Vec<f64> {
        // Exponents are relative to the newest sample; the dropped constant factor
        // cancels out in the normalization.
        let raw: Vec<f64> = (0..n)
            .map(|i| 0.5_f64.powf((n - 1 - i) as f64 / self.half_life_samples))
            .collect();
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return raw;
        }
        raw.into_iter().map(|w| w / total).collect()
    }

    /// Aggregate parallel allocation and capacity histories into a usage snapshot
    pub fn aggregate(
        &self,
        allocations: &[QueueAllocations],
        capacities: &[QueueUsage],
    ) -> ClusterUsage {
        let mut usage = ClusterUsage::new();
        let history_len = allocations.len().min(capacities.len());
        if history_len == 0 {
            return usage;
        }

        let range = self.window_range(history_len);
        let weights = self.decay_weights(range.len());

        for ((sample, capacity), weight) in allocations[range.clone()]
            .iter()
            .zip(&capacities[range.clone()])
            .zip(weights)
        {
            for (queue_id, allocated) in sample {
                let queue_usage = usage.queue_mut(queue_id);
                for resource in ResourceName::ALL {
                    let total = capacity.get(resource);
                    if total <= 0.0 {
                        continue;
                    }
                    queue_usage.add(resource, weight * allocated.get(resource) / total);
                }
            }
        }

        usage.cluster = capacities[history_len - 1];

        debug!(
            window_start = range.start,
            window_end = range.end,
            queues = usage.queues.len(),
            "Aggregated usage window"
        );

        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu_sample(entries: &[(&str, f64)]) -> QueueAllocations {
        entries
            .iter()
            .map(|(q, gpu)| (QueueId::from(*q), QueueUsage::new(*gpu, 0.0, 0.0)))
            .collect()
    }

    fn capacity(gpu: f64) -> QueueUsage {
        QueueUsage::new(gpu, 0.0, 0.0)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_sliding_window_range() {
        let aggregator = WindowAggregator::new(3, WindowType::Sliding);
        assert_eq!(aggregator.window_range(0), 0..0);
        assert_eq!(aggregator.window_range(2), 0..2);
        assert_eq!(aggregator.window_range(3), 0..3);
        assert_eq!(aggregator.window_range(10), 7..10);

        for w in 1..6 {
            let aggregator = WindowAggregator::new(w, WindowType::Sliding);
            for len in 0..12 {
                let range = aggregator.window_range(len);
                assert_eq!(range.len(), len.min(w));
                assert_eq!(range.end, len);
            }
        }
    }

    #[test]
    fn test_tumbling_window_range() {
        let aggregator = WindowAggregator::new(3, WindowType::Tumbling);
        assert_eq!(aggregator.window_range(0), 0..0);
        assert_eq!(aggregator.window_range(1), 0..1);
        assert_eq!(aggregator.window_range(3), 0..3);
        assert_eq!(aggregator.window_range(4), 3..4);
        assert_eq!(aggregator.window_range(6), 3..6);
        assert_eq!(aggregator.window_range(7), 6..7);
    }

    #[test]
    fn test_zero_window_treated_as_one() {
        let aggregator = WindowAggregator::new(0, WindowType::Sliding);
        assert_eq!(aggregator.window_len(), 1);
        assert_eq!(aggregator.window_range(5), 4..5);
    }

    #[test]
    fn test_decay_weights_sum_to_one() {
        for w in 1..40 {
            let aggregator = WindowAggregator::new(w, WindowType::Sliding);
            let weights = aggregator.decay_weights(w);
            assert_eq!(weights.len(), w);
            assert_close(weights.iter().sum(), 1.0);
        }

        let long = WindowAggregator::new(604_800, WindowType::Sliding);
        let weights = long.decay_weights(604_800);
        assert_close(weights.iter().sum(), 1.0);
    }

    #[test]
    fn test_decay_weights_halve_per_sample() {
        let aggregator = WindowAggregator::new(3, WindowType::Sliding);
        let weights = aggregator.decay_weights(3);
        // raw 0.125, 0.25, 0.5
        assert_close(weights[0], 1.0 / 7.0);
        assert_close(weights[1], 2.0 / 7.0);
        assert_close(weights[2], 4.0 / 7.0);
    }

    #[test]
    fn test_decay_weights_with_half_life() {
        let aggregator = WindowAggregator::new(3, WindowType::Sliding).with_half_life(2.0);
        let weights = aggregator.decay_weights(3);
        assert_close(weights[2] / weights[0], 2.0);
        assert_close(weights.iter().sum(), 1.0);
    }

    #[test]
    fn test_single_sample_window() {
        let aggregator = WindowAggregator::new(1, WindowType::Sliding);
        assert_eq!(aggregator.decay_weights(1), vec![1.0]);

        let usage = aggregator.aggregate(
            &[gpu_sample(&[("queue1", 4.0), ("queue2", 2.0)])],
            &[capacity(10.0)],
        );

        assert_close(usage.queue("queue1").unwrap().gpu, 0.4);
        assert_close(usage.queue("queue2").unwrap().gpu, 0.2);
        assert_eq!(usage.cluster.gpu, 10.0);
    }

    #[test]
    fn test_per_sample_capacity_normalization() {
        let aggregator = WindowAggregator::new(2, WindowType::Sliding);
        let usage = aggregator.aggregate(
            &[gpu_sample(&[("queue1", 5.0)]), gpu_sample(&[("queue1", 5.0)])],
            &[capacity(10.0), capacity(20.0)],
        );

        // weights 1/3 and 2/3; fractions 0.5 and 0.25
        assert_close(usage.queue("queue1").unwrap().gpu, 0.5 / 3.0 + 0.5 / 3.0);
        assert_eq!(usage.cluster.gpu, 20.0);
    }

    #[test]
    fn test_only_trailing_samples_used() {
        let aggregator = WindowAggregator::new(1, WindowType::Sliding);
        let usage = aggregator.aggregate(
            &[gpu_sample(&[("old", 10.0)]), gpu_sample(&[("new", 5.0)])],
            &[capacity(10.0), capacity(10.0)],
        );
        assert!(usage.queue("old").is_none());
        assert_close(usage.queue("new").unwrap().gpu, 0.5);
    }

    #[test]
    fn test_zero_capacity_dimension_skipped() {
        let aggregator = WindowAggregator::new(1, WindowType::Sliding);
        let mut sample = gpu_sample(&[("queue1", 2.0)]);
        sample.get_mut("queue1").unwrap().cpu = 3.0;

        let usage = aggregator.aggregate(&[sample], &[capacity(4.0)]);
        let queue = usage.queue("queue1").unwrap();
        assert_close(queue.gpu, 0.5);
        assert_eq!(queue.cpu, 0.0);
        assert!(queue.cpu.is_finite());
    }

    #[test]
    fn test_empty_history() {
        let aggregator = WindowAggregator::new(5, WindowType::Sliding);
        let usage = aggregator.aggregate(&[], &[]);
        assert!(usage.queues.is_empty());
        assert_eq!(usage.cluster, QueueUsage::default());
    }

    #[test]
    fn test_from_params() {
        let mut params = UsageParams {
            window_size: Some(Duration::from_secs(60)),
            half_life_period: Some(Duration::from_secs(20)),
            ..Default::default()
        };
        params
            .extra_params
            .insert(SAMPLE_INTERVAL_PARAM.to_string(), "10s".to_string());

        let aggregator = WindowAggregator::from_params(&params);
        assert_eq!(aggregator.window_len(), 6);
        assert_eq!(aggregator.window_type(), WindowType::Sliding);
        assert_close(aggregator.half_life_samples(), 2.0);

        let defaults = WindowAggregator::from_params(&UsageParams::default());
        assert_eq!(defaults.window_len(), 604_800);
        assert_close(defaults.half_life_samples(), 1.0);
    }
}
