//! fairshare-core: Core types for the fairshare scheduler core
//!
//! This crate provides the fundamental types used throughout fairshare:
//! - Queue records, quotas and the per-snapshot queue view
//! - Cluster and per-queue usage snapshots
//! - Task descriptors and resource requests (including MIG profiles)
//! - Configuration types
//! - Error handling

pub mod config;
pub mod error;
pub mod queue;
pub mod resource;
pub mod task;
pub mod usage;

pub use config::*;
pub use error::*;
pub use queue::*;
pub use resource::*;
pub use task::*;
pub use usage::*;
