//! Prometheus-backed usage source

use async_trait::async_trait;
use fairshare_core::{
    ClusterUsage, FairshareError, FairshareResult, QueueId, ResourceName,
    UsageParams, WindowType,
};
use futures::future::try_join_all;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use crate::source::UsageSource;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_QUERY_RESOLUTION: Duration = Duration::from_secs(60);
pub const DEFAULT_QUEUE_LABEL: &str = "queue_name";
/// One series per GPU exported by the DCGM exporter
pub const DEFAULT_GPU_CAPACITY_METRIC: &str = "count(DCGM_FI_DEV_GPU_UTIL)";

/// Prometheus query API response envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

impl VectorSample {
    fn value(&self) -> FairshareResult<f64> {
        self.value.1.parse::<f64>().map_err(|e| {
            FairshareError::Query(format!("invalid sample value {:?}: {}", self.value.1, e))
        })
    }
}

/// Usage of one resource dimension across all queues
struct DimensionUsage {
    resource: ResourceName,
    queues: HashMap<QueueId, f64>,
    /// Capacity summed over the same window; `None` without a capacity metric
    capacity: Option<f64>,
}

/// Queries per-queue allocation metrics over a trailing window.
///
/// Only sliding windows are supported; a tumbling configuration is replaced with a
/// sliding one at construction. Dimensions without a capacity metric report the
/// raw windowed sums per queue and leave the cluster capacity at zero.
pub struct PrometheusSource {
    client: reqwest::Client,
    query_url: String,
    window_size: Duration,
    query_resolution: Duration,
    queue_label: String,
    allocation_metrics: BTreeMap<ResourceName, String>,
    capacity_metrics: BTreeMap<ResourceName, String>,
}

impl PrometheusSource {
    /// Create a source talking to the Prometheus server at `address`
    pub fn new(address: &str, params: &UsageParams) -> FairshareResult<Self> {
        let url = reqwest::Url::parse(address).map_err(|e| {
            FairshareError::Config(format!("error creating prometheus client: {}", e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FairshareError::Config(format!(
                "error creating prometheus client: unsupported scheme {}",
                url.scheme()
            )));
        }

        if params.window_type == Some(WindowType::Tumbling) {
            warn!("Tumbling window is not supported for prometheus client, using sliding window instead");
        }
        if params.half_life_period.is_some() {
            warn!("Half-life decay is not applied by the prometheus client");
        }

        let query_timeout =
            params.extra_duration_param_or_default("usageQueryTimeout", DEFAULT_QUERY_TIMEOUT);
        let mut query_resolution =
            params.extra_duration_param_or_default("queryResolution", DEFAULT_QUERY_RESOLUTION);
        if query_resolution.is_zero() {
            query_resolution = DEFAULT_QUERY_RESOLUTION;
        }

        let client = reqwest::Client::builder()
            .timeout(query_timeout)
            .build()
            .map_err(|e| {
                FairshareError::Config(format!("error creating prometheus client: {}", e))
            })?;

        let allocation_metrics = BTreeMap::from([
            (
                ResourceName::Gpu,
                params.extra_string_param_or_default("gpuAllocationMetric", "kai_queue_allocated_gpus"),
            ),
            (
                ResourceName::Cpu,
                params.extra_string_param_or_default(
                    "cpuAllocationMetric",
                    "kai_queue_allocated_cpu_cores",
                ),
            ),
            (
                ResourceName::Memory,
                params.extra_string_param_or_default(
                    "memoryAllocationMetric",
                    "kai_queue_allocated_memory_bytes",
                ),
            ),
        ]);

        let capacity_metrics: BTreeMap<ResourceName, String> = [
            (
                ResourceName::Gpu,
                Some(params.extra_string_param_or_default(
                    "gpuCapacityMetric",
                    DEFAULT_GPU_CAPACITY_METRIC,
                )),
            ),
            (
                ResourceName::Cpu,
                params.extra_params.get("cpuCapacityMetric").cloned(),
            ),
            (
                ResourceName::Memory,
                params.extra_params.get("memoryCapacityMetric").cloned(),
            ),
        ]
        .into_iter()
        .filter_map(|(resource, metric)| {
            metric
                .filter(|metric| !metric.is_empty())
                .map(|metric| (resource, metric))
        })
        .collect();

        for resource in ResourceName::ALL {
            if !capacity_metrics.contains_key(&resource) {
                warn!(
                    resource = %resource,
                    "No capacity metric configured, reporting raw usage without cluster capacity"
                );
            }
        }

        Ok(Self {
            client,
            query_url: format!("{}/api/v1/query", address.trim_end_matches('/')),
            window_size: params.window_size_or_default(),
            query_resolution,
            queue_label: params.extra_string_param_or_default("queueLabel", DEFAULT_QUEUE_LABEL),
            allocation_metrics,
            capacity_metrics,
        })
    }

    /// Range-aggregation query for `expr` over the configured window
    fn range_query(&self, expr: &str) -> String {
        format!(
            "sum_over_time(({})[{}:{}])",
            expr,
            promql_duration(self.window_size),
            promql_duration(self.query_resolution),
        )
    }

    /// Number of resolution steps in the window, used to turn summed capacity into an average
    fn window_steps(&self) -> f64 {
        (self.window_size.as_secs_f64() / self.query_resolution.as_secs_f64()).max(1.0)
    }

    async fn query_vector(&self, query: &str) -> FairshareResult<Vec<VectorSample>> {
        let time = chrono::Utc::now().timestamp().to_string();
        let response = self
            .client
            .get(&self.query_url)
            .query(&[("query", query), ("time", time.as_str())])
            .send()
            .await
            .map_err(|e| FairshareError::Query(format!("error running query {}: {}", query, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FairshareError::Query(format!("error running query {}: {}", query, e)))?;

        let parsed: QueryResponse = serde_json::from_str(&body).map_err(|e| {
            FairshareError::Query(format!(
                "error running query {}: malformed response (status {}): {}",
                query, status, e
            ))
        })?;

        for warning in &parsed.warnings {
            warn!(query = %query, warning = %warning, "Warning querying usage metric");
        }

        if parsed.status != "success" {
            return Err(FairshareError::Query(format!(
                "error running query {}: {}: {}",
                query,
                parsed.error_type.unwrap_or_default(),
                parsed.error.unwrap_or_default()
            )));
        }

        let data = parsed.data.ok_or_else(|| {
            FairshareError::Query(format!("error running query {}: response has no data", query))
        })?;
        if data.result_type != "vector" {
            return Err(FairshareError::Query(format!(
                "unexpected query result: got {}, expected vector",
                data.result_type
            )));
        }

        serde_json::from_value(data.result).map_err(|e| {
            FairshareError::Query(format!("error running query {}: bad vector: {}", query, e))
        })
    }

    async fn query_dimension(&self, resource: ResourceName) -> FairshareResult<DimensionUsage> {
        let metric = self
            .allocation_metrics
            .get(&resource)
            .ok_or_else(|| FairshareError::Internal(format!("no allocation metric for {}", resource)))?;

        let samples = self.query_vector(&self.range_query(metric)).await?;
        if samples.is_empty() {
            return Err(FairshareError::Query(format!(
                "no data returned for cluster usage metric {}",
                metric
            )));
        }

        let mut queues = HashMap::new();
        for sample in &samples {
            let Some(queue) = sample.metric.get(&self.queue_label) else {
                debug!(metric = %metric, "Skipping sample without queue label");
                continue;
            };
            *queues.entry(QueueId::from(queue.as_str())).or_insert(0.0) += sample.value()?;
        }

        let capacity = match self.capacity_metrics.get(&resource) {
            Some(capacity_metric) => {
                let expr = format!("sum({})", capacity_metric);
                let samples = self.query_vector(&self.range_query(&expr)).await?;
                if samples.is_empty() {
                    return Err(FairshareError::Query(format!(
                        "no data returned for cluster capacity metric {}",
                        capacity_metric
                    )));
                }
                let mut total = 0.0;
                for sample in &samples {
                    total += sample.value()?;
                }
                Some(total)
            }
            None => None,
        };

        Ok(DimensionUsage {
            resource,
            queues,
            capacity,
        })
    }
}

#[async_trait]
impl UsageSource for PrometheusSource {
    async fn get_resource_usage(&self) -> FairshareResult<ClusterUsage> {
        let dimensions = try_join_all(ResourceName::ALL.map(|r| self.query_dimension(r))).await?;

        let mut usage = ClusterUsage::new();
        for dimension in dimensions {
            let Some(capacity) = dimension.capacity else {
                for (queue_id, value) in dimension.queues {
                    usage.queue_mut(&queue_id).set(dimension.resource, value);
                }
                continue;
            };

            usage
                .cluster
                .set(dimension.resource, capacity / self.window_steps());
            for (queue_id, value) in dimension.queues {
                let fraction = if capacity > 0.0 { value / capacity } else { 0.0 };
                usage.queue_mut(&queue_id).set(dimension.resource, fraction);
            }
        }

        debug!(queues = usage.queues.len(), "Fetched usage from prometheus");
        Ok(usage)
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}

/// Duration in the largest exact PromQL unit, e.g. `168h`, `90s`, `250ms`
fn promql_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
