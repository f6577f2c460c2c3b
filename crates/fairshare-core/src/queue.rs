//! Queue desired-state records and the per-snapshot `QueueInfo`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::usage::{QueueId, ResourceName};

/// Priority given to queues that do not set one
pub const DEFAULT_QUEUE_PRIORITY: i32 = 100;

/// Quota for one resource dimension
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceQuota {
    /// Deserved (guaranteed) share
    #[serde(default, rename = "deserved")]
    pub quota: f64,
    /// Weight used to split resources beyond deserved quotas
    #[serde(default)]
    pub over_quota_weight: f64,
    /// Hard limit
    #[serde(default)]
    pub limit: f64,
}

/// Quota for every resource dimension
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueQuota {
    #[serde(default)]
    pub gpu: ResourceQuota,
    #[serde(default)]
    pub cpu: ResourceQuota,
    #[serde(default)]
    pub memory: ResourceQuota,
}

impl QueueQuota {
    pub fn get(&self, resource: ResourceName) -> &ResourceQuota {
        match resource {
            ResourceName::Gpu => &self.gpu,
            ResourceName::Cpu => &self.cpu,
            ResourceName::Memory => &self.memory,
        }
    }
}

/// Queue record as delivered by the desired-state source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSpec {
    /// Object name, used as the queue identifier
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<QueueQuota>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub preempt_min_runtime: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub reclaim_min_runtime: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl QueueSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            parent_queue: None,
            priority: None,
            resources: None,
            preempt_min_runtime: None,
            reclaim_min_runtime: None,
            creation_timestamp: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_queue = Some(parent.into());
        self
    }

    pub fn with_resources(mut self, resources: QueueQuota) -> Self {
        self.resources = Some(resources);
        self
    }
}

/// In-memory view of one queue for a single scheduling snapshot.
///
/// The parent is held by identifier and resolved through the owning hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInfo {
    pub uid: QueueId,
    pub name: String,
    /// Empty for root queues
    pub parent_queue: QueueId,
    pub child_queues: Vec<QueueId>,
    pub resources: QueueQuota,
    pub priority: i32,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub preempt_min_runtime: Option<Duration>,
    pub reclaim_min_runtime: Option<Duration>,
}

impl QueueInfo {
    pub fn new(spec: &QueueSpec) -> Self {
        let name = match spec.display_name.as_deref() {
            Some(display) if !display.is_empty() => display.to_string(),
            _ => spec.name.clone(),
        };

        Self {
            uid: QueueId::new(spec.name.clone()),
            name,
            parent_queue: QueueId::new(spec.parent_queue.clone().unwrap_or_default()),
            child_queues: Vec::new(),
            resources: spec.resources.unwrap_or_default(),
            priority: spec.priority.unwrap_or(DEFAULT_QUEUE_PRIORITY),
            creation_timestamp: spec.creation_timestamp,
            preempt_min_runtime: spec.preempt_min_runtime,
            reclaim_min_runtime: spec.reclaim_min_runtime,
        }
    }

    pub fn is_leaf_queue(&self) -> bool {
        self.child_queues.is_empty()
    }

    pub fn has_parent(&self) -> bool {
        !self.parent_queue.is_empty()
    }

    /// Record a child; adding the same child twice is a no-op
    pub fn add_child_queue(&mut self, child: QueueId) {
        if self.child_queues.contains(&child) {
            return;
        }
        self.child_queues.push(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_info_defaults() {
        let info = QueueInfo::new(&QueueSpec::new("team-a"));
        assert_eq!(info.uid.as_str(), "team-a");
        assert_eq!(info.name, "team-a");
        assert_eq!(info.priority, DEFAULT_QUEUE_PRIORITY);
        assert!(!info.has_parent());
        assert!(info.is_leaf_queue());
        assert_eq!(info.resources, QueueQuota::default());
    }

    #[test]
    fn test_queue_info_from_full_spec() {
        let mut spec = QueueSpec::new("team-a").with_parent("org").with_resources(QueueQuota {
            gpu: ResourceQuota {
                quota: 4.0,
                over_quota_weight: 2.0,
                limit: 8.0,
            },
            ..Default::default()
        });
        spec.display_name = Some("Team A".to_string());
        spec.priority = Some(7);
        spec.preempt_min_runtime = Some(Duration::from_secs(60));

        let info = QueueInfo::new(&spec);
        assert_eq!(info.name, "Team A");
        assert_eq!(info.parent_queue.as_str(), "org");
        assert_eq!(info.priority, 7);
        assert_eq!(info.resources.get(ResourceName::Gpu).limit, 8.0);
        assert_eq!(info.preempt_min_runtime, Some(Duration::from_secs(60)));
        assert_eq!(info.reclaim_min_runtime, None);
    }

    #[test]
    fn test_add_child_queue_idempotent() {
        let mut info = QueueInfo::new(&QueueSpec::new("org"));
        info.add_child_queue(QueueId::from("team-a"));
        info.add_child_queue(QueueId::from("team-a"));
        assert_eq!(info.child_queues.len(), 1);
        assert!(!info.is_leaf_queue());

        info.add_child_queue(QueueId::from("team-b"));
        assert_eq!(info.child_queues.len(), 2);
    }

    #[test]
    fn test_queue_spec_parse() {
        let toml_str = r#"
name = "team-a"
parent_queue = "org"
priority = 50
preempt_min_runtime = "10m"

[resources.gpu]
deserved = 2.0
over_quota_weight = 1.0
limit = -1.0
"#;
        let spec: QueueSpec = toml::from_str(toml_str).unwrap();
        assert_eq!(spec.parent_queue.as_deref(), Some("org"));
        assert_eq!(spec.preempt_min_runtime, Some(Duration::from_secs(600)));

        let resources = spec.resources.unwrap();
        assert_eq!(resources.gpu.quota, 2.0);
        assert_eq!(resources.gpu.limit, -1.0);
        assert_eq!(resources.cpu, ResourceQuota::default());
    }
}
