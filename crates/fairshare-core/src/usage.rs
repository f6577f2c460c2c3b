//! Queue identifiers, resource dimensions and usage snapshots

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;

/// Queue identifier (the queue's object name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct QueueId(String);

impl QueueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for QueueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for QueueId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Resource dimension tracked for quota and usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceName {
    Gpu,
    Cpu,
    Memory,
}

impl ResourceName {
    pub const ALL: [ResourceName; 3] = [ResourceName::Gpu, ResourceName::Cpu, ResourceName::Memory];
}

impl std::fmt::Display for ResourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceName::Gpu => write!(f, "gpu"),
            ResourceName::Cpu => write!(f, "cpu"),
            ResourceName::Memory => write!(f, "memory"),
        }
    }
}

/// Per-dimension usage figures.
///
/// Inside a [`ClusterUsage`] the queue entries are fractions of cluster capacity
/// and `cluster` holds the absolute capacity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueUsage {
    #[serde(default)]
    pub gpu: f64,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
}

impl QueueUsage {
    pub fn new(gpu: f64, cpu: f64, memory: f64) -> Self {
        Self { gpu, cpu, memory }
    }

    pub fn get(&self, resource: ResourceName) -> f64 {
        match resource {
            ResourceName::Gpu => self.gpu,
            ResourceName::Cpu => self.cpu,
            ResourceName::Memory => self.memory,
        }
    }

    pub fn set(&mut self, resource: ResourceName, value: f64) {
        match resource {
            ResourceName::Gpu => self.gpu = value,
            ResourceName::Cpu => self.cpu = value,
            ResourceName::Memory => self.memory = value,
        }
    }

    pub fn add(&mut self, resource: ResourceName, value: f64) {
        let current = self.get(resource);
        self.set(resource, current + value);
    }
}

/// Snapshot of cluster capacity and per-queue usage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterUsage {
    /// Cluster-wide capacity per resource
    pub cluster: QueueUsage,
    /// Usage per queue
    pub queues: HashMap<QueueId, QueueUsage>,
}

impl ClusterUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Usage entry for a queue, created on first access
    pub fn queue_mut(&mut self, id: &QueueId) -> &mut QueueUsage {
        self.queues.entry(id.clone()).or_default()
    }

    pub fn queue(&self, id: &str) -> Option<&QueueUsage> {
        self.queues.get(id)
    }
}
