use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::registry::{ContainerInfo, ContainerStatus, TaskInfo, TaskStatus};

use super::error::MonitorError;
use super::AppState;

fn container_status_str(status: ContainerStatus) -> &'static str {
    match status {
        ContainerStatus::Created => "created",
        ContainerStatus::Running => "running",
        ContainerStatus::Exited => "exited",
        ContainerStatus::Removed => "removed",
    }
}

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    worker_id: String,
    uptime_seconds: i64,
    status: &'static str,
    capacity: usize,
    active_tasks: usize,
    containers_active: usize,
    tasks_completed_today: usize,
    last_task_time: Option<String>,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    state.containers.cleanup_old_entries();
    state.tasks.cleanup_old_entries();

    let active_containers = state.containers.list_active().len();
    let active_tasks = state.tasks.list_active().len();
    let tasks_completed_today = state.tasks.completed_today();

    let last_task_time = state
        .tasks
        .list_all()
        .into_iter()
        .filter_map(|t| t.finished_at)
        .max()
        .map(|t| t.to_rfc3339());

    Json(StatusResponse {
        worker_id: state.worker_id.clone(),
        uptime_seconds: (Utc::now() - state.start_time).num_seconds(),
        status: "healthy",
        capacity: state.capacity,
        active_tasks,
        containers_active: active_containers,
        tasks_completed_today,
        last_task_time,
    })
}

#[derive(Debug, Serialize)]
pub struct ContainerSummary {
    container_id: String,
    task_id: Option<i64>,
    image: String,
    status: &'static str,
    created_at: String,
    started_at: Option<String>,
}

impl From<ContainerInfo> for ContainerSummary {
    fn from(c: ContainerInfo) -> Self {
        Self {
            container_id: c.container_id,
            task_id: c.task_id,
            image: c.image,
            status: container_status_str(c.status),
            created_at: c.created_at.to_rfc3339(),
            started_at: c.started_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContainerListResponse {
    containers: Vec<ContainerSummary>,
    total: usize,
}

pub async fn list_containers(State(state): State<AppState>) -> Json<ContainerListResponse> {
    let containers: Vec<ContainerSummary> = state.containers.list_active().into_iter().map(Into::into).collect();
    let total = containers.len();
    Json(ContainerListResponse { containers, total })
}

#[derive(Debug, Serialize)]
pub struct ContainerSpecDetail {
    command: Vec<String>,
    user: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContainerMountDetail {
    source: String,
    target: String,
    read_only: bool,
}

#[derive(Debug, Serialize)]
pub struct ContainerDetailResponse {
    container_id: String,
    task_id: Option<i64>,
    image: String,
    status: &'static str,
    spec: ContainerSpecDetail,
    mounts: Vec<ContainerMountDetail>,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
}

pub async fn container_details(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> Result<Json<ContainerDetailResponse>, MonitorError> {
    let container = state
        .containers
        .get(&container_id)
        .ok_or_else(|| MonitorError::not_found(format!("Container not found: {}", container_id)))?;

    Ok(Json(ContainerDetailResponse {
        container_id: container.container_id.clone(),
        task_id: container.task_id,
        image: container.image.clone(),
        status: container_status_str(container.status),
        spec: ContainerSpecDetail { command: container.command.clone(), user: container.user.clone() },
        mounts: container
            .mounts
            .iter()
            .map(|m| ContainerMountDetail {
                source: m.source.display().to_string(),
                target: m.target.display().to_string(),
                read_only: m.read_only,
            })
            .collect(),
        created_at: container.created_at.to_rfc3339(),
        started_at: container.started_at.map(|t| t.to_rfc3339()),
        finished_at: container.finished_at.map(|t| t.to_rfc3339()),
    }))
}

#[derive(Debug, Serialize)]
pub struct TaskSummary {
    task_id: i64,
    #[serde(rename = "type")]
    task_type: String,
    status: &'static str,
    arch: Option<String>,
    tag: Option<String>,
    started_at: String,
    container_id: Option<String>,
}

impl From<TaskInfo> for TaskSummary {
    fn from(t: TaskInfo) -> Self {
        Self {
            task_id: t.task_id,
            task_type: t.task_type,
            status: task_status_str(t.status),
            arch: t.arch,
            tag: t.tag,
            started_at: t.started_at.to_rfc3339(),
            container_id: t.container_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    tasks: Vec<TaskSummary>,
    total: usize,
}

pub async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    let tasks: Vec<TaskSummary> = state.tasks.list_active().into_iter().map(Into::into).collect();
    let total = tasks.len();
    Json(TaskListResponse { tasks, total })
}

#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    task_id: i64,
    #[serde(rename = "type")]
    task_type: String,
    status: &'static str,
    arch: Option<String>,
    tag: Option<String>,
    srpm: Option<String>,
    started_at: String,
    finished_at: Option<String>,
    container_id: Option<String>,
    log_path: Option<String>,
    progress: Option<serde_json::Value>,
}

pub async fn task_details(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<TaskDetailResponse>, MonitorError> {
    let task = state.tasks.get(task_id).ok_or_else(|| MonitorError::not_found(format!("Task not found: {}", task_id)))?;

    Ok(Json(TaskDetailResponse {
        task_id: task.task_id,
        task_type: task.task_type,
        status: task_status_str(task.status),
        arch: task.arch,
        tag: task.tag,
        srpm: task.srpm,
        started_at: task.started_at.to_rfc3339(),
        finished_at: task.finished_at.map(|t| t.to_rfc3339()),
        container_id: task.container_id,
        log_path: task.log_path,
        progress: task.progress,
    }))
}

pub async fn task_logs(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, MonitorError> {
    let task = state.tasks.get(task_id).ok_or_else(|| MonitorError::not_found(format!("Task not found: {}", task_id)))?;

    let log_path = task.log_path.ok_or_else(|| MonitorError::not_found(format!("Log path not available for task {}", task_id)))?;

    let log_file = {
        let p = std::path::PathBuf::from(&log_path);
        if p.is_absolute() {
            p
        } else {
            state.koji_mount_root.join(log_path.trim_start_matches('/'))
        }
    };

    if !log_file.exists() {
        return Err(MonitorError::not_found(format!("Log file not found: {}", log_path)));
    }

    let tail_lines: usize = params.get("tail").and_then(|v| v.parse().ok()).unwrap_or(100);

    let content = tokio::fs::read(&log_file).await?;
    let text = String::from_utf8_lossy(&content);
    let tail: String = text.lines().rev().take(tail_lines).collect::<Vec<_>>().into_iter().rev().collect::<Vec<_>>().join("\n");

    Ok(([("Content-Type", "text/plain; charset=utf-8")], tail))
}
