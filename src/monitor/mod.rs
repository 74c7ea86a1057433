//! Monitoring Server (C9): a read-only HTTP status surface over the
//! container and task registries, for operators and orchestration tooling.
//!
//! Grounded on the donor's `router/mod.rs` (axum `Router` + `AppState` +
//! `CorsLayer` shape) and `original_source/monitoring/server.py` (the
//! endpoint set and JSON envelope).

mod error;
mod handlers;

pub use error::MonitorError;

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::registry::{ContainerRegistry, TaskRegistry};

/// Shared state for every monitoring endpoint.
#[derive(Clone)]
pub struct AppState {
    pub containers: Arc<ContainerRegistry>,
    pub tasks: Arc<TaskRegistry>,
    pub worker_id: String,
    pub capacity: usize,
    pub start_time: DateTime<Utc>,
    pub koji_mount_root: PathBuf,
}

impl AppState {
    pub fn new(
        containers: Arc<ContainerRegistry>,
        tasks: Arc<TaskRegistry>,
        worker_id: String,
        capacity: usize,
        koji_mount_root: PathBuf,
    ) -> Self {
        Self { containers, tasks, worker_id, capacity, start_time: Utc::now(), koji_mount_root }
    }
}

/// Build the `/api/v1/*` monitoring router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(handlers::status))
        .route("/api/v1/containers", get(handlers::list_containers))
        .route("/api/v1/containers/:container_id", get(handlers::container_details))
        .route("/api/v1/tasks", get(handlers::list_tasks))
        .route("/api/v1/tasks/:task_id", get(handlers::task_details))
        .route("/api/v1/tasks/:task_id/logs", get(handlers::task_logs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}
