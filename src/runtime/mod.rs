//! Container Runtime Port (C1): the capability-defined boundary between task
//! adapters and an external OCI engine.
//!
//! `ContainerRuntime` lists every engine capability an adapter is allowed to
//! use; `DockerRuntime` is the only implementation, driving a local engine
//! over its Unix socket via `bollard`. Adapters and tests depend on the trait,
//! never on `DockerRuntime` directly, so a stub engine can substitute in unit
//! tests the way `original_source`'s tests substitute a fake `PodmanManager`.

mod docker;
mod error;
mod spec;

pub use docker::DockerRuntime;
pub use error::{ContainerError, ContainerResult};
pub use spec::{
    ContainerHandle, ContainerRunResult, ContainerSpec, ContainerSpecBuilder, PullPolicy,
    ResourceLimits, VolumeMount,
};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::logsink::LogSink;

/// Timeouts governing C1 operations, resolved from configuration (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct RuntimeTimeouts {
    pub pull: Duration,
    pub start: Duration,
    pub stop_grace: Duration,
}

impl Default for RuntimeTimeouts {
    fn default() -> Self {
        Self {
            pull: Duration::from_secs(300),
            start: Duration::from_secs(60),
            stop_grace: Duration::from_secs(20),
        }
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Verify local image presence; pull according to `policy` if absent.
    async fn ensure_image_available(
        &self,
        image: &str,
        policy: PullPolicy,
        pull_timeout: Duration,
    ) -> ContainerResult<()>;

    /// Materialize a container from `spec`. Does not start it.
    async fn create(&self, spec: &ContainerSpec) -> ContainerResult<ContainerHandle>;

    /// Start a created container; blocks until running/exited/dead or timeout.
    async fn start(&self, handle: &ContainerHandle, timeout: Duration) -> ContainerResult<()>;

    /// Block until the container exits, returning its exit code.
    async fn wait(&self, handle: &ContainerHandle) -> ContainerResult<i64>;

    /// Remove a container. Absent-container is not an error.
    async fn remove(
        &self,
        handle: &ContainerHandle,
        force: bool,
        stop_grace: Duration,
    ) -> ContainerResult<()>;

    /// Spawn reader/writer workers that pump the engine's log stream into
    /// `sink` through a bounded, drop-oldest queue. Never blocks the caller
    /// beyond spawning, and never propagates streaming failures.
    async fn stream_logs(
        &self,
        handle: &ContainerHandle,
        sink: Arc<dyn LogSink>,
        follow: bool,
    ) -> ContainerResult<()>;

    /// Run `command` inside an already-running container, streaming output
    /// to `sink`. Returns the command's exit code.
    async fn exec(
        &self,
        handle: &ContainerHandle,
        command: &[String],
        sink: Arc<dyn LogSink>,
        env: Option<&HashMap<String, String>>,
    ) -> ContainerResult<i64>;

    /// Run `command`, capturing stdout into memory instead of a sink. Used
    /// for short introspective commands (e.g. `git rev-parse HEAD`) per the
    /// commit-hash Open Question decision in SPEC_FULL.md.
    async fn exec_capture(
        &self,
        handle: &ContainerHandle,
        command: &[String],
    ) -> ContainerResult<(i64, Vec<u8>)>;

    /// Transfer a single regular file from the host into the container.
    async fn copy_to(
        &self,
        handle: &ContainerHandle,
        src_file: &Path,
        dest_path: &Path,
    ) -> ContainerResult<()>;

    /// Convenience: ensure image → create → start → (attach) → wait → remove.
    async fn run(
        &self,
        spec: &ContainerSpec,
        sink: Arc<dyn LogSink>,
        attach: bool,
        pull_policy: PullPolicy,
        timeouts: &RuntimeTimeouts,
    ) -> ContainerResult<ContainerRunResult>;
}
