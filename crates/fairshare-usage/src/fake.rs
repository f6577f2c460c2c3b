//! Fault-injection source returning a canned result or error

use async_trait::async_trait;
use fairshare_core::{ClusterUsage, FairshareError, FairshareResult};
use std::sync::RwLock;

use crate::source::UsageSource;

#[derive(Debug, Default)]
struct CannedResponse {
    usage: ClusterUsage,
    error: Option<String>,
}

/// Usage source that replays whatever was last configured with
/// [`FakeSource::set_resource_usage`]
#[derive(Debug, Default)]
pub struct FakeSource {
    response: RwLock<CannedResponse>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the next responses; an error takes precedence over the usage
    pub fn set_resource_usage(&self, usage: ClusterUsage, error: Option<String>) {
        let mut response = self
            .response
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        response.usage = usage;
        response.error = error;
    }
}

#[async_trait]
impl UsageSource for FakeSource {
    async fn get_resource_usage(&self) -> FairshareResult<ClusterUsage> {
        let response = self
            .response
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match &response.error {
            Some(message) => Err(FairshareError::Source(message.clone())),
            None => Ok(response.usage.clone()),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairshare_core::QueueId;

    #[tokio::test]
    async fn test_default_is_empty() {
        let source = FakeSource::new();
        let usage = source.get_resource_usage().await.unwrap();
        assert!(usage.queues.is_empty());
    }

    #[tokio::test]
    async fn test_canned_usage() {
        let source = FakeSource::new();
        let mut usage = ClusterUsage::new();
        usage.cluster.gpu = 10.0;
        usage.queue_mut(&QueueId::from("queue1")).gpu = 0.5;
        source.set_resource_usage(usage.clone(), None);

        assert_eq!(source.get_resource_usage().await.unwrap(), usage);
    }

    #[tokio::test]
    async fn test_canned_error() {
        let source = FakeSource::new();
        source.set_resource_usage(ClusterUsage::new(), Some("backend down".to_string()));

        let err = source.get_resource_usage().await.unwrap_err();
        assert!(matches!(err, FairshareError::Source(_)));
        assert!(err.to_string().contains("backend down"));

        source.set_resource_usage(ClusterUsage::new(), None);
        assert!(source.get_resource_usage().await.is_ok());
    }
}
