//! Usage source selection from configuration

use fairshare_core::{FairshareError, FairshareResult, UsageDbConfig};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::fake::FakeSource;
use crate::prometheus::PrometheusSource;
use crate::replay::ReplaySource;
use crate::source::UsageSource;

/// Known usage source kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    Prometheus,
    Fake,
    FakeWithHistory,
}

impl ClientType {
    pub const ALL: [ClientType; 3] = [
        ClientType::Prometheus,
        ClientType::Fake,
        ClientType::FakeWithHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Prometheus => "prometheus",
            ClientType::Fake => "fake",
            ClientType::FakeWithHistory => "fake-with-history",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = FairshareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(FairshareError::Config(
                "client type cannot be empty".to_string(),
            ));
        }
        ClientType::ALL
            .into_iter()
            .find(|client_type| client_type.as_str() == s)
            .ok_or_else(|| {
                let supported: Vec<&str> = ClientType::ALL.iter().map(|c| c.as_str()).collect();
                FairshareError::Config(format!(
                    "unknown client type: {}, supported types: {:?}",
                    s, supported
                ))
            })
    }
}

/// Resolve the connection string from either the literal value or the named env var
pub fn resolve_connection_string(config: &UsageDbConfig) -> FairshareResult<String> {
    match (
        config.connection_string.is_empty(),
        config.connection_string_env_var.is_empty(),
    ) {
        (false, false) => Err(FairshareError::Config(
            "both connection string and connection string env var are set, only one is allowed"
                .to_string(),
        )),
        (true, true) => Err(FairshareError::Config(
            "connection string and connection string env var are not set, one is required"
                .to_string(),
        )),
        (false, true) => Ok(config.connection_string.clone()),
        (true, false) => Ok(std::env::var(&config.connection_string_env_var).unwrap_or_else(|_| {
            debug!(
                env_var = %config.connection_string_env_var,
                "Connection string env var not set, using empty connection string"
            );
            String::new()
        })),
    }
}

/// Build a new usage source for `config`; `None` disables time-aware fairness
pub fn get_client(config: Option<&UsageDbConfig>) -> FairshareResult<Option<Arc<dyn UsageSource>>> {
    let Some(config) = config else {
        return Ok(None);
    };

    let client_type: ClientType = config.client_type.parse()?;
    let params = config.usage_params.with_defaults();

    let source: Arc<dyn UsageSource> = match client_type {
        ClientType::Prometheus => {
            let address = resolve_connection_string(config)?;
            Arc::new(PrometheusSource::new(&address, &params)?)
        }
        ClientType::Fake => Arc::new(FakeSource::new()),
        ClientType::FakeWithHistory => Arc::new(ReplaySource::new(&params)),
    };

    info!(client_type = %client_type, "Created usage db client");
    Ok(Some(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(client_type: &str, connection_string: &str, env_var: &str) -> UsageDbConfig {
        UsageDbConfig {
            client_type: client_type.to_string(),
            connection_string: connection_string.to_string(),
            connection_string_env_var: env_var.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_client_type() {
        assert_eq!("prometheus".parse::<ClientType>().unwrap(), ClientType::Prometheus);
        assert_eq!("fake".parse::<ClientType>().unwrap(), ClientType::Fake);
        assert_eq!(
            "fake-with-history".parse::<ClientType>().unwrap(),
            ClientType::FakeWithHistory
        );

        let err = "".parse::<ClientType>().unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: client type cannot be empty");

        let err = "influx".parse::<ClientType>().unwrap_err();
        assert!(err.to_string().contains("unknown client type: influx"));
        assert!(err.to_string().contains("fake-with-history"));
    }

    #[test]
    fn test_resolve_literal_connection_string() {
        let resolved = resolve_connection_string(&config("prometheus", "http://prom:9090", ""));
        assert_eq!(resolved.unwrap(), "http://prom:9090");
    }

    #[test]
    fn test_resolve_both_set() {
        std::env::set_var("FAIRSHARE_TEST_BOTH_SET", "http://from-env:9090");
        let err = resolve_connection_string(&config("prometheus", "a", "FAIRSHARE_TEST_BOTH_SET"))
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("both connection string and connection string env var are set"));
        std::env::remove_var("FAIRSHARE_TEST_BOTH_SET");
    }

    #[test]
    fn test_resolve_neither_set() {
        let err = resolve_connection_string(&config("prometheus", "", "")).unwrap_err();
        assert!(err.to_string().contains("one is required"));
    }

    #[test]
    fn test_resolve_from_env() {
        std::env::set_var("FAIRSHARE_TEST_PROM_URL", "http://from-env:9090");
        let resolved =
            resolve_connection_string(&config("prometheus", "", "FAIRSHARE_TEST_PROM_URL"));
        assert_eq!(resolved.unwrap(), "http://from-env:9090");
        std::env::remove_var("FAIRSHARE_TEST_PROM_URL");

        let resolved =
            resolve_connection_string(&config("prometheus", "", "FAIRSHARE_TEST_UNSET_VAR"));
        assert_eq!(resolved.unwrap(), "");
    }

    #[test]
    fn test_get_client_none() {
        assert!(get_client(None).unwrap().is_none());
    }

    #[test]
    fn test_get_client_kinds() {
        let prometheus = get_client(Some(&config("prometheus", "http://localhost:9090", "")))
            .unwrap()
            .unwrap();
        assert_eq!(prometheus.name(), "prometheus");

        let fake = get_client(Some(&config("fake", "", ""))).unwrap().unwrap();
        assert_eq!(fake.name(), "fake");

        let replay = get_client(Some(&config("fake-with-history", "", "")))
            .unwrap()
            .unwrap();
        assert_eq!(replay.name(), "fake-with-history");
    }

    #[test]
    fn test_get_client_errors() {
        assert!(get_client(Some(&config("", "", ""))).is_err());
        assert!(get_client(Some(&config("unknown", "", ""))).is_err());
        assert!(get_client(Some(&config("prometheus", "", ""))).is_err());
        assert!(get_client(Some(&config("prometheus", "not a url", ""))).is_err());
    }

    #[test]
    fn test_get_client_returns_fresh_instances() {
        let cfg = config("fake", "", "");
        let first = get_client(Some(&cfg)).unwrap().unwrap();
        let second = get_client(Some(&cfg)).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
