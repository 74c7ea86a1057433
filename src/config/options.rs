use std::collections::HashMap;

use super::LogFormat;

/// Injected options object: the second tier of the C2 priority chain. A
/// caller (an embedder, or a test) constructs one directly instead of going
/// through a config file; every field left `None` falls through to the file
/// or built-in-default tier.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub worker_id: Option<String>,
    pub log_format: Option<LogFormat>,
    pub task_image_default: Option<String>,
    pub image_pull_policy: Option<String>,
    pub container_mounts: Option<Vec<String>>,
    pub network_enabled: Option<String>,
    pub container_labels: Option<HashMap<String, String>>,
    pub container_timeout_pull: Option<u64>,
    pub container_timeout_start: Option<u64>,
    pub container_timeout_stop_grace: Option<u64>,
    pub policy_enabled: Option<String>,
    pub policy_cache_ttl: Option<String>,
    pub buildroot_enabled: Option<String>,
    pub monitoring_enabled: Option<String>,
    pub monitoring_bind: Option<String>,
    pub monitoring_container_history_ttl: Option<String>,
    pub monitoring_task_history_ttl: Option<String>,
    pub podman_socket: Option<String>,
    pub host_mount_map: Option<HashMap<String, String>>,
    pub shared_storage_root: Option<String>,
    pub work_root: Option<String>,
    pub hub_url: Option<String>,
    pub hub_token: Option<String>,
}
