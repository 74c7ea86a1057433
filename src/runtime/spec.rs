//! Launch descriptors for the container runtime port

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// A bind mount from a host path into a container path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
    /// SELinux-style access-control label (`z`, `Z`, ...), passed through verbatim.
    pub selinux_label: Option<String>,
}

impl VolumeMount {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only,
            selinux_label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.selinux_label = Some(label.into());
        self
    }
}

/// Optional resource caps applied to a container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceLimits {
    pub memory_bytes: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub cpu_shares: Option<f64>,
    pub pids_limit: Option<i64>,
    pub cpuset: Option<String>,
}

/// Image pull policy, resolved from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPolicy {
    Always,
    IfNotPresent,
    Never,
}

/// Immutable launch descriptor for a single container. Once constructed, no
/// field is ever mutated; adapters build a fresh `ContainerSpec` per task.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    pub environment: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
    pub mounts: Vec<VolumeMount>,
    pub user_id: Option<u32>,
    pub group_id: Option<u32>,
    pub network_enabled: bool,
    pub limits: Option<ResourceLimits>,
    pub remove_after_exit: bool,
}

impl ContainerSpec {
    pub fn builder(image: impl Into<String>) -> ContainerSpecBuilder {
        ContainerSpecBuilder::new(image)
    }
}

/// Builder for `ContainerSpec`; the spec itself stays immutable once built.
pub struct ContainerSpecBuilder {
    image: String,
    command: Vec<String>,
    environment: HashMap<String, String>,
    workdir: Option<PathBuf>,
    mounts: Vec<VolumeMount>,
    user_id: Option<u32>,
    group_id: Option<u32>,
    network_enabled: bool,
    limits: Option<ResourceLimits>,
    remove_after_exit: bool,
}

impl ContainerSpecBuilder {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: Vec::new(),
            environment: HashMap::new(),
            workdir: None,
            mounts: Vec::new(),
            user_id: None,
            group_id: None,
            network_enabled: true,
            limits: None,
            remove_after_exit: true,
        }
    }

    pub fn command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, env: HashMap<String, String>) -> Self {
        self.environment.extend(env);
        self
    }

    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn mount(mut self, mount: VolumeMount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn mounts(mut self, mounts: Vec<VolumeMount>) -> Self {
        self.mounts = mounts;
        self
    }

    pub fn user(mut self, user_id: u32, group_id: u32) -> Self {
        self.user_id = Some(user_id);
        self.group_id = Some(group_id);
        self
    }

    pub fn network_enabled(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn remove_after_exit(mut self, remove: bool) -> Self {
        self.remove_after_exit = remove;
        self
    }

    pub fn build(self) -> ContainerSpec {
        ContainerSpec {
            image: self.image,
            command: self.command,
            environment: self.environment,
            workdir: self.workdir,
            mounts: self.mounts,
            user_id: self.user_id,
            group_id: self.group_id,
            network_enabled: self.network_enabled,
            limits: self.limits,
            remove_after_exit: self.remove_after_exit,
        }
    }
}

/// Opaque engine-assigned container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle(pub String);

impl ContainerHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a full `run()` lifecycle.
#[derive(Debug, Clone)]
pub struct ContainerRunResult {
    pub handle: ContainerHandle,
    pub exit_code: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
