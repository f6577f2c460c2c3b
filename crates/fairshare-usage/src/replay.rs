//! Deterministic source replaying an in-memory allocation history

use async_trait::async_trait;
use fairshare_core::{ClusterUsage, FairshareResult, QueueId, QueueUsage, UsageParams};
use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::RwLock;
use tracing::debug;

use crate::source::UsageSource;
use crate::window::{QueueAllocations, WindowAggregator};

/// Per-tick queue allocations, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationHistory(pub Vec<QueueAllocations>);

/// Per-tick cluster capacity, parallel to [`AllocationHistory`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterCapacityHistory(pub Vec<QueueUsage>);

impl AllocationHistory {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tab-separated GPU allocation per tick, one column per queue (sorted by id)
    pub fn to_tsv(&self) -> String {
        let queues: BTreeSet<&QueueId> = self.0.iter().flat_map(|tick| tick.keys()).collect();

        let mut out = String::from("t\t");
        let header: Vec<&str> = queues.iter().map(|q| q.as_str()).collect();
        out.push_str(&header.join("\t"));
        out.push('\n');

        for (t, tick) in self.0.iter().enumerate() {
            let _ = write!(out, "{}\t", t);
            for queue in &queues {
                let gpu = tick.get(*queue).map(|u| u.gpu).unwrap_or(0.0);
                let _ = write!(out, "{:.6}\t", gpu);
            }
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Default)]
struct History {
    allocations: AllocationHistory,
    capacities: ClusterCapacityHistory,
}

/// Usage source backed by an append-only history, used by simulations and tests.
///
/// Each instance owns its history; harnesses construct one and inject it where needed.
#[derive(Debug)]
pub struct ReplaySource {
    aggregator: WindowAggregator,
    history: RwLock<History>,
}

impl ReplaySource {
    pub fn new(params: &UsageParams) -> Self {
        Self::with_aggregator(WindowAggregator::from_params(params))
    }

    pub fn with_aggregator(aggregator: WindowAggregator) -> Self {
        Self {
            aggregator,
            history: RwLock::new(History::default()),
        }
    }

    pub fn aggregator(&self) -> &WindowAggregator {
        &self.aggregator
    }

    /// Record one sample tick: every queue's absolute allocation and the cluster capacity
    pub fn append_queued_allocation(&self, allocations: QueueAllocations, capacity: QueueUsage) {
        let mut history = self
            .history
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        history.allocations.0.push(allocations);
        history.capacities.0.push(capacity);
    }

    pub fn allocation_history(&self) -> AllocationHistory {
        self.history
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .allocations
            .clone()
    }

    pub fn capacity_history(&self) -> ClusterCapacityHistory {
        self.history
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .capacities
            .clone()
    }
}

#[async_trait]
impl UsageSource for ReplaySource {
    async fn get_resource_usage(&self) -> FairshareResult<ClusterUsage> {
        let history = self
            .history
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        debug!(samples = history.allocations.len(), "Replaying usage history");

        Ok(self
            .aggregator
            .aggregate(&history.allocations.0, &history.capacities.0))
    }

    fn name(&self) -> &'static str {
        "fake-with-history"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairshare_core::WindowType;
    use std::time::Duration;

    fn tick(entries: &[(&str, f64)]) -> QueueAllocations {
        entries
            .iter()
            .map(|(q, gpu)| (QueueId::from(*q), QueueUsage::new(*gpu, 0.0, 0.0)))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_history() {
        let source = ReplaySource::new(&UsageParams::default());
        let usage = source.get_resource_usage().await.unwrap();
        assert!(usage.queues.is_empty());
        assert_eq!(source.name(), "fake-with-history");
    }

    #[tokio::test]
    async fn test_single_second_window() {
        let params = UsageParams {
            window_size: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let source = ReplaySource::new(&params);
        source.append_queued_allocation(
            tick(&[("queue1", 4.0), ("queue2", 2.0)]),
            QueueUsage::new(10.0, 0.0, 0.0),
        );

        let usage = source.get_resource_usage().await.unwrap();
        assert!((usage.queue("queue1").unwrap().gpu - 0.4).abs() < 1e-9);
        assert!((usage.queue("queue2").unwrap().gpu - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_instances_do_not_share_history() {
        let first = ReplaySource::with_aggregator(WindowAggregator::new(2, WindowType::Sliding));
        let second = ReplaySource::with_aggregator(WindowAggregator::new(2, WindowType::Sliding));

        first.append_queued_allocation(tick(&[("queue1", 1.0)]), QueueUsage::new(1.0, 0.0, 0.0));

        assert_eq!(first.allocation_history().len(), 1);
        assert!(second.allocation_history().is_empty());
        assert!(second.get_resource_usage().await.unwrap().queues.is_empty());
    }

    #[tokio::test]
    async fn test_recent_samples_dominate() {
        let source = ReplaySource::with_aggregator(WindowAggregator::new(4, WindowType::Sliding));
        let capacity = QueueUsage::new(8.0, 0.0, 0.0);
        for _ in 0..3 {
            source.append_queued_allocation(tick(&[("busy", 8.0)]), capacity);
        }
        source.append_queued_allocation(tick(&[("idle", 8.0)]), capacity);

        let usage = source.get_resource_usage().await.unwrap();
        let busy = usage.queue("busy").unwrap().gpu;
        let idle = usage.queue("idle").unwrap().gpu;
        // weights 1/15, 2/15, 4/15, 8/15
        assert!((busy - 7.0 / 15.0).abs() < 1e-9);
        assert!((idle - 8.0 / 15.0).abs() < 1e-9);
        assert_eq!(source.capacity_history().0.len(), 4);
    }

    #[test]
    fn test_to_tsv() {
        let source = ReplaySource::new(&UsageParams::default());
        source.append_queued_allocation(tick(&[("b", 2.0), ("a", 1.0)]), QueueUsage::default());
        source.append_queued_allocation(tick(&[("a", 3.0)]), QueueUsage::default());

        let tsv = source.allocation_history().to_tsv();
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines[0], "t\ta\tb");
        assert_eq!(lines[1], "0\t1.000000\t2.000000\t");
        assert_eq!(lines[2], "1\t3.000000\t0.000000\t");
    }
}
