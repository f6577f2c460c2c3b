//! Errors returned when reading the cached usage snapshot

use chrono::{DateTime, Utc};
use fairshare_core::ClusterUsage;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure to serve a usage snapshot from the lister cache
#[derive(Error, Debug, Clone)]
pub enum UsageReadError {
    #[error("usage data is not available")]
    NotAvailable,

    /// The cached snapshot is older than the staleness period; it is still attached
    #[error(
        "usage data is stale, last update: {last_update}, staleness period: {staleness_period:?}, time since last update: {elapsed:?}"
    )]
    Stale {
        usage: Arc<ClusterUsage>,
        last_update: DateTime<Utc>,
        staleness_period: Duration,
        elapsed: Duration,
    },
}

impl UsageReadError {
    /// Snapshot carried by a stale read, if any
    pub fn usage(&self) -> Option<&Arc<ClusterUsage>> {
        match self {
            UsageReadError::NotAvailable => None,
            UsageReadError::Stale { usage, .. } => Some(usage),
        }
    }

    pub fn into_usage(self) -> Option<Arc<ClusterUsage>> {
        match self {
            UsageReadError::NotAvailable => None,
            UsageReadError::Stale { usage, .. } => Some(usage),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, UsageReadError::Stale { .. })
    }
}
