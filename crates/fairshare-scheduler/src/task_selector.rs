//! Gang-aware selection of the tasks to try next for a pod group
//!
//! A pod group below its quorum asks for enough tasks to reach `min_available` in
//! one attempt; once the quorum holds, tasks are added one at a time. Selections
//! are memoized on the pod group until its allocation cache is invalidated.

use fairshare_core::{task_order_by_priority, GpuDemand, ResourceRequirements, TaskInfo};
use tracing::debug;
use uuid::Uuid;

use crate::pod_group::PodGroupInfo;
use crate::priority_queue::PriorityQueue;

/// Default task order used by [`TaskSelector::by_priority`]
pub type TaskOrderFn = fn(&TaskInfo, &TaskInfo) -> bool;

/// Picks tasks of a pod group in `order` (true = try first)
pub struct TaskSelector<F = TaskOrderFn>
where
    F: Fn(&TaskInfo, &TaskInfo) -> bool,
{
    order: F,
    is_real_allocation: bool,
}

impl TaskSelector<TaskOrderFn> {
    pub fn by_priority(is_real_allocation: bool) -> Self {
        Self::new(task_order_by_priority, is_real_allocation)
    }
}

impl<F> TaskSelector<F>
where
    F: Fn(&TaskInfo, &TaskInfo) -> bool,
{
    /// `is_real_allocation` is false for speculative (what-if) attempts
    pub fn new(order: F, is_real_allocation: bool) -> Self {
        Self {
            order,
            is_real_allocation,
        }
    }

    pub fn is_real_allocation(&self) -> bool {
        self.is_real_allocation
    }

    /// Whether any task of the group is eligible for allocation
    pub fn has_tasks_to_allocate(&self, pod_group: &PodGroupInfo) -> bool {
        pod_group
            .tasks
            .values()
            .any(|task| task.should_allocate(self.is_real_allocation))
    }

    /// Tasks to try in this attempt, best first
    pub fn tasks_to_allocate<'a>(&self, pod_group: &'a mut PodGroupInfo) -> Vec<&'a TaskInfo> {
        let ids = self.selected_task_ids(pod_group);
        let pod_group: &'a PodGroupInfo = pod_group;
        ids.iter()
            .filter_map(|uid| pod_group.tasks.get(uid))
            .collect()
    }

    /// Summed resource request of the selected tasks
    pub fn tasks_to_allocate_init_resource(&self, pod_group: &mut PodGroupInfo) -> ResourceRequirements {
        self.sync_cache_mode(pod_group);
        if let Some(cached) = &pod_group.cache.init_resource {
            return cached.clone();
        }

        let ids = self.selected_task_ids(pod_group);
        let mut total = ResourceRequirements::default();
        for task in ids.iter().filter_map(|uid| pod_group.tasks.get(uid)) {
            if task.should_allocate(self.is_real_allocation) {
                total.add(&task.res_req);
            }
        }

        pod_group.cache.init_resource = Some(total.clone());
        total
    }

    /// GPU devices and GPU memory requested by the selected tasks.
    ///
    /// MIG profiles contribute their device portion and memory; unparsable profile
    /// names are logged and skipped.
    pub fn tasks_to_allocate_requested_gpus(&self, pod_group: &mut PodGroupInfo) -> GpuDemand {
        self.sync_cache_mode(pod_group);
        if let Some(cached) = pod_group.cache.requested_gpus {
            return cached;
        }

        let ids = self.selected_task_ids(pod_group);
        let mut demand = GpuDemand::default();
        for task in ids.iter().filter_map(|uid| pod_group.tasks.get(uid)) {
            demand.add(task.res_req.gpu_demand());
        }

        pod_group.cache.requested_gpus = Some(demand);
        demand
    }

    /// Number of tasks to take out of `eligible` candidates
    pub fn num_tasks_to_allocate(&self, pod_group: &PodGroupInfo, eligible: usize) -> usize {
        let allocated = pod_group.active_allocated_tasks_count();
        let min_available = pod_group.min_available as usize;
        let wanted = if allocated >= min_available {
            1
        } else {
            min_available
        };
        wanted.min(eligible)
    }

    fn selected_task_ids(&self, pod_group: &mut PodGroupInfo) -> Vec<Uuid> {
        self.sync_cache_mode(pod_group);
        if let Some(ids) = &pod_group.cache.tasks_to_allocate {
            return ids.clone();
        }

        let ids = {
            let mut queue = PriorityQueue::with_capacity(
                pod_group.tasks.len(),
                |l: &&TaskInfo, r: &&TaskInfo| (self.order)(*l, *r),
            );
            queue.extend(
                pod_group
                    .tasks
                    .values()
                    .filter(|task| task.should_allocate(self.is_real_allocation)),
            );

            let wanted = self.num_tasks_to_allocate(pod_group, queue.len());
            let mut ids = Vec::with_capacity(wanted);
            while ids.len() < wanted {
                match queue.pop() {
                    Some(task) => ids.push(task.uid),
                    None => break,
                }
            }
            ids
        };

        debug!(
            pod_group = %pod_group.name,
            selected = ids.len(),
            min_available = pod_group.min_available,
            "Selected tasks to allocate"
        );

        pod_group.cache.tasks_to_allocate = Some(ids.clone());
        ids
    }

    /// Memoized values only hold for the allocation mode they were computed in
    fn sync_cache_mode(&self, pod_group: &mut PodGroupInfo) {
        if pod_group.cache.is_real_allocation != self.is_real_allocation {
            pod_group.invalidate_allocation_cache();
            pod_group.cache.is_real_allocation = self.is_real_allocation;
        }
    }
}
