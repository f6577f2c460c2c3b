//! Cached usage lister with background polling
//!
//! The lister owns a single snapshot cell that only its polling task writes. Reads
//! are synchronous and serve whatever was fetched last, flagging it when it has
//! aged past the staleness period.

use chrono::{DateTime, Utc};
use fairshare_core::{
    ClusterUsage, FairshareError, FairshareResult, UsageParams, DEFAULT_FETCH_INTERVAL,
    DEFAULT_STALENESS_PERIOD, DEFAULT_WAIT_TIMEOUT,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::UsageReadError;
use crate::source::UsageSource;

const CACHE_SYNC_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
struct CachedUsage {
    usage: Arc<ClusterUsage>,
    fetched_at: Instant,
    fetched_at_wall: DateTime<Utc>,
}

/// Periodically fetches usage from a [`UsageSource`] and serves the latest snapshot
pub struct UsageLister {
    source: Arc<dyn UsageSource>,
    fetch_interval: Duration,
    staleness_period: Duration,
    wait_timeout: Duration,
    cache: RwLock<Option<CachedUsage>>,
    started: AtomicBool,
}

impl UsageLister {
    pub fn new(source: Arc<dyn UsageSource>, params: &UsageParams) -> Self {
        let params = params.with_defaults();
        Self {
            source,
            fetch_interval: params.fetch_interval.unwrap_or(DEFAULT_FETCH_INTERVAL),
            staleness_period: params.staleness_period.unwrap_or(DEFAULT_STALENESS_PERIOD),
            wait_timeout: params.wait_timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT),
            cache: RwLock::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Latest snapshot.
    ///
    /// Returns [`UsageReadError::NotAvailable`] until the first successful fetch and
    /// [`UsageReadError::Stale`] (still carrying the snapshot) once it has aged past
    /// the staleness period.
    pub fn get_resource_usage(&self) -> Result<Arc<ClusterUsage>, UsageReadError> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let Some(cached) = cache.as_ref() else {
            return Err(UsageReadError::NotAvailable);
        };

        let elapsed = cached.fetched_at.elapsed();
        if elapsed > self.staleness_period {
            return Err(UsageReadError::Stale {
                usage: cached.usage.clone(),
                last_update: cached.fetched_at_wall,
                staleness_period: self.staleness_period,
                elapsed,
            });
        }
        Ok(cached.usage.clone())
    }

    /// Fetch once from the source and replace the snapshot on success
    pub async fn fetch_and_update_usage(&self) -> FairshareResult<()> {
        let usage = self.source.get_resource_usage().await?;
        let queues = usage.queues.len();

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = Some(CachedUsage {
            usage: Arc::new(usage),
            fetched_at: Instant::now(),
            fetched_at_wall: Utc::now(),
        });
        debug!(source = self.source.name(), queues, "Updated usage snapshot");
        Ok(())
    }

    /// Spawn the polling task.
    ///
    /// The first fetch happens immediately. The task exits when `shutdown` turns
    /// `true` or its sender is dropped. A lister can only be started once.
    pub fn start(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> FairshareResult<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(FairshareError::Internal(
                "usage lister already started".to_string(),
            ));
        }

        let lister = Arc::clone(self);
        info!(
            source = lister.source.name(),
            fetch_interval = ?lister.fetch_interval,
            staleness_period = ?lister.staleness_period,
            "Starting usage lister"
        );

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(lister.fetch_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while !*shutdown.borrow() {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = lister.fetch_and_update_usage().await {
                            warn!(source = lister.source.name(), error = %e, "Failed to fetch usage");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            info!("Usage lister stopped");
        }))
    }

    /// Block until the first snapshot is available; `false` if shutdown came first
    pub async fn wait_for_cache_sync(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut poll = tokio::time::interval(CACHE_SYNC_POLL_INTERVAL);
        loop {
            if *shutdown.borrow() {
                return false;
            }
            tokio::select! {
                _ = poll.tick() => {
                    if self.has_data() {
                        return true;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    fn has_data(&self) -> bool {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Wall-clock time of the last successful fetch
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|cached| cached.fetched_at_wall)
    }

    pub fn fetch_interval(&self) -> Duration {
        self.fetch_interval
    }

    pub fn staleness_period(&self) -> Duration {
        self.staleness_period
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }
}
