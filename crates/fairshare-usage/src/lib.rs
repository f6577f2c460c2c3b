//! fairshare-usage: Historical queue usage for time-aware fairness
//!
//! This crate provides the usage accounting pipeline:
//! - Pluggable usage sources (Prometheus, fault injection, replayed history)
//! - Decayed window aggregation of usage samples
//! - A cached lister polling the configured source in the background

pub mod error;
pub mod fake;
pub mod lister;
pub mod prometheus;
pub mod registry;
pub mod replay;
pub mod source;
pub mod window;

pub use error::UsageReadError;
pub use fake::FakeSource;
pub use lister::UsageLister;
pub use prometheus::PrometheusSource;
pub use registry::{get_client, resolve_connection_string, ClientType};
pub use replay::{AllocationHistory, ClusterCapacityHistory, ReplaySource};
pub use source::UsageSource;
pub use window::{QueueAllocations, WindowAggregator};
