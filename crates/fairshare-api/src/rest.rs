//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use fairshare_core::{ClusterUsage, QueueInfo, QueueQuota, QueueUsage};
use fairshare_scheduler::QueueHierarchy;
use fairshare_usage::{UsageLister, UsageReadError};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Application state shared across handlers
pub struct AppState {
    /// Absent when no usage database is configured
    pub lister: Option<Arc<UsageLister>>,
    pub queues: Arc<QueueHierarchy>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/usage", get(get_usage))
        .route("/api/v1/queues", get(list_queues))
        .route("/api/v1/queues/:id", get(get_queue))
        .route("/api/v1/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Cached usage snapshot
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// Snapshot is older than the staleness period
    pub stale: bool,
    pub last_update: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub usage: ClusterUsage,
}

/// Get the latest usage snapshot
async fn get_usage(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UsageResponse>, (StatusCode, String)> {
    let lister = state.lister.as_ref().ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            "usage database is not configured".to_string(),
        )
    })?;

    let last_update = lister.last_update();
    match lister.get_resource_usage() {
        Ok(usage) => Ok(Json(UsageResponse {
            stale: false,
            last_update,
            error: None,
            usage: usage.as_ref().clone(),
        })),
        Err(e @ UsageReadError::Stale { .. }) => {
            debug!(error = %e, "Serving stale usage");
            let error = e.to_string();
            match e.into_usage() {
                Some(usage) => Ok(Json(UsageResponse {
                    stale: true,
                    last_update,
                    error: Some(error),
                    usage: usage.as_ref().clone(),
                })),
                None => Err((StatusCode::SERVICE_UNAVAILABLE, error)),
            }
        }
        Err(e @ UsageReadError::NotAvailable) => {
            Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}

/// Queue response
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub uid: String,
    pub name: String,
    pub parent_queue: Option<String>,
    pub child_queues: Vec<String>,
    pub priority: i32,
    pub is_leaf: bool,
    pub resources: QueueQuota,
    /// Historical usage, when a fresh or stale snapshot is available
    pub usage: Option<QueueUsage>,
}

impl QueueResponse {
    fn new(queue: &QueueInfo, usage: Option<&ClusterUsage>) -> Self {
        Self {
            uid: queue.uid.to_string(),
            name: queue.name.clone(),
            parent_queue: queue.has_parent().then(|| queue.parent_queue.to_string()),
            child_queues: queue.child_queues.iter().map(|c| c.to_string()).collect(),
            priority: queue.priority,
            is_leaf: queue.is_leaf_queue(),
            resources: queue.resources,
            usage: usage.and_then(|u| u.queue(queue.uid.as_str()).copied()),
        }
    }
}

/// Usage for annotating queue responses; stale data is still used
fn current_usage(state: &AppState) -> Option<Arc<ClusterUsage>> {
    let lister = state.lister.as_ref()?;
    match lister.get_resource_usage() {
        Ok(usage) => Some(usage),
        Err(e) => e.into_usage(),
    }
}

/// List all queues
async fn list_queues(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<QueueResponse>>, (StatusCode, String)> {
    let usage = current_usage(&state);
    let responses = state
        .queues
        .iter()
        .map(|queue| QueueResponse::new(queue, usage.as_deref()))
        .collect();
    Ok(Json(responses))
}

/// Get a specific queue
async fn get_queue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<QueueResponse>, (StatusCode, String)> {
    let queue = state
        .queues
        .get(&id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("queue {} not found", id)))?;

    let usage = current_usage(&state);
    Ok(Json(QueueResponse::new(queue, usage.as_deref())))
}

/// System status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub queues: usize,
    pub usage_source: Option<String>,
    pub usage_available: bool,
}

/// Get system status
async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        queues: state.queues.len(),
        usage_source: state.lister.as_ref().map(|l| l.source_name().to_string()),
        usage_available: state
            .lister
            .as_ref()
            .is_some_and(|l| l.get_resource_usage().is_ok()),
    }))
}
