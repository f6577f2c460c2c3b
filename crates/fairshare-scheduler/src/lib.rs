//! fairshare-scheduler: Queue hierarchy and task selection for fairshare
//!
//! This crate provides the per-snapshot scheduling structures:
//! - The queue tree rebuilt from queue records, with quota sanity warnings
//! - Pod groups and gang-aware selection of the tasks to allocate next
//! - A priority queue ordered by a caller-supplied function

pub mod hierarchy;
pub mod pod_group;
pub mod priority_queue;
pub mod task_selector;

pub use hierarchy::{QueueHierarchy, QuotaWarning};
pub use pod_group::{AllocationCache, PodGroupInfo};
pub use priority_queue::PriorityQueue;
pub use task_selector::{TaskOrderFn, TaskSelector};
