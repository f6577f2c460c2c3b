//! Task (pod) descriptors consumed by gang task selection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::resource::ResourceRequirements;

/// Scheduling status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for an allocation
    Pending,
    /// Allocated in the current session
    Allocated,
    /// Allocated onto resources that are still being released
    Pipelined,
    /// Bind request in flight
    Binding,
    /// Bound to a node
    Bound,
    Running,
    /// Being evicted or terminating
    Releasing,
    Succeeded,
    Failed,
    /// Blocked by scheduling gates
    Gated,
    Unknown,
}

impl TaskStatus {
    /// Statuses that count towards a pod group's allocated members
    pub fn is_active_allocated(&self) -> bool {
        matches!(
            self,
            TaskStatus::Allocated
                | TaskStatus::Pipelined
                | TaskStatus::Binding
                | TaskStatus::Bound
                | TaskStatus::Running
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "Pending"),
            TaskStatus::Allocated => write!(f, "Allocated"),
            TaskStatus::Pipelined => write!(f, "Pipelined"),
            TaskStatus::Binding => write!(f, "Binding"),
            TaskStatus::Bound => write!(f, "Bound"),
            TaskStatus::Running => write!(f, "Running"),
            TaskStatus::Releasing => write!(f, "Releasing"),
            TaskStatus::Succeeded => write!(f, "Succeeded"),
            TaskStatus::Failed => write!(f, "Failed"),
            TaskStatus::Gated => write!(f, "Gated"),
            TaskStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A single task of a pod group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub uid: Uuid,
    pub name: String,
    pub status: TaskStatus,
    /// Status was set by a simulated (what-if) step rather than observed
    #[serde(default)]
    pub is_virtual_status: bool,
    #[serde(default)]
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub res_req: ResourceRequirements,
}

impl TaskInfo {
    pub fn new(name: impl Into<String>, res_req: ResourceRequirements) -> Self {
        Self {
            uid: Uuid::new_v4(),
            name: name.into(),
            status: TaskStatus::Pending,
            is_virtual_status: false,
            priority: 0,
            created_at: Utc::now(),
            res_req,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this task may be tried for allocation.
    ///
    /// Speculative attempts may also reuse tasks that are only virtually releasing.
    pub fn should_allocate(&self, is_real_allocation: bool) -> bool {
        self.status == TaskStatus::Pending
            || (!is_real_allocation && self.status == TaskStatus::Releasing && self.is_virtual_status)
    }
}

/// Default task ordering: higher priority, then older, then by name.
///
/// Returns true when `l` should be tried before `r`.
pub fn task_order_by_priority(l: &TaskInfo, r: &TaskInfo) -> bool {
    let ordering = r
        .priority
        .cmp(&l.priority)
        .then_with(|| l.created_at.cmp(&r.created_at))
        .then_with(|| l.name.cmp(&r.name));
    ordering == Ordering::Less
}
