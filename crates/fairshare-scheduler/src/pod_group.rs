//! Gang of tasks scheduled together

use fairshare_core::{GpuDemand, QueueId, ResourceRequirements, TaskInfo};
use std::collections::HashMap;
use uuid::Uuid;

/// Memoized task selection; cleared whenever the pod group changes
#[derive(Debug, Clone, Default)]
pub struct AllocationCache {
    /// Allocation mode the cached values were computed for
    pub(crate) is_real_allocation: bool,
    pub(crate) tasks_to_allocate: Option<Vec<Uuid>>,
    pub(crate) init_resource: Option<ResourceRequirements>,
    pub(crate) requested_gpus: Option<GpuDemand>,
}

impl AllocationCache {
    pub fn is_empty(&self) -> bool {
        self.tasks_to_allocate.is_none()
            && self.init_resource.is_none()
            && self.requested_gpus.is_none()
    }
}

/// A pod group: tasks that only make progress once `min_available` of them run
#[derive(Debug, Clone)]
pub struct PodGroupInfo {
    pub name: String,
    pub queue: QueueId,
    pub min_available: u32,
    pub tasks: HashMap<Uuid, TaskInfo>,
    pub(crate) cache: AllocationCache,
}

impl PodGroupInfo {
    pub fn new(name: impl Into<String>, queue: impl Into<QueueId>, min_available: u32) -> Self {
        Self {
            name: name.into(),
            queue: queue.into(),
            min_available,
            tasks: HashMap::new(),
            cache: AllocationCache::default(),
        }
    }

    pub fn add_task(&mut self, task: TaskInfo) {
        self.tasks.insert(task.uid, task);
        self.invalidate_allocation_cache();
    }

    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = TaskInfo>) -> Self {
        for task in tasks {
            self.add_task(task);
        }
        self
    }

    /// Tasks currently holding (or about to hold) resources
    pub fn active_allocated_tasks_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|task| task.status.is_active_allocated())
            .count()
    }

    /// Drop memoized selections; call after mutating tasks or their statuses
    pub fn invalidate_allocation_cache(&mut self) {
        self.cache = AllocationCache::default();
    }

    pub fn allocation_cache(&self) -> &AllocationCache {
        &self.cache
    }
}
