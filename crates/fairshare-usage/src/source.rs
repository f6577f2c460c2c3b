//! Usage source trait definitions

use async_trait::async_trait;
use fairshare_core::{ClusterUsage, FairshareResult};

/// Pull-based gateway to historical queue usage
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Fetch one aggregated usage figure per queue per resource, plus cluster capacity
    async fn get_resource_usage(&self) -> FairshareResult<ClusterUsage>;

    /// Get the source name
    fn name(&self) -> &'static str;
}
