//! Configuration Surface (C2): resolves every named option through the
//! priority chain environment variable → injected options object →
//! configuration file → built-in default (§4.2).
//!
//! The file tier follows the donor's `Configuration::load` idiom (TOML via
//! `serde`, `anyhow::Context` on IO, path resolution relative to the config
//! file's directory); the environment tier piggybacks on `clap`'s `env`
//! derive attribute at the CLI boundary plus a direct `std::env::var` lookup
//! here for embedders that construct a `Configuration` without going through
//! the CLI at all. Environment variables use the prefix
//! `KOJI_ADJUTANT_<UPPER_SNAKE>`, matching `original_source/config.py`.

mod mounts;
mod options;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub use mounts::MountSpec;
pub use options::ConfigOptions;

const ENV_PREFIX: &str = "KOJI_ADJUTANT_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicyConfig {
    Always,
    IfNotPresent,
    Never,
}

impl std::str::FromStr for PullPolicyConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "always" => Ok(Self::Always),
            "if-not-present" => Ok(Self::IfNotPresent),
            "never" => Ok(Self::Never),
            other => anyhow::bail!("unrecognized image_pull_policy: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerTimeouts {
    pub pull: Duration,
    pub start: Duration,
    pub stop_grace: Duration,
}

impl Default for ContainerTimeouts {
    fn default() -> Self {
        Self {
            pull: Duration::from_secs(300),
            start: Duration::from_secs(60),
            stop_grace: Duration::from_secs(20),
        }
    }
}

/// Resolved, coerced configuration snapshot used by every other component.
/// Immutable once built by [`Configuration::load_layered`].
#[derive(Debug, Clone)]
pub struct Configuration {
    pub worker_id: String,
    pub log_format: LogFormat,

    pub task_image_default: String,
    pub image_pull_policy: PullPolicyConfig,
    pub container_mounts: Vec<MountSpec>,
    pub network_enabled: bool,
    pub container_labels: HashMap<String, String>,
    pub container_timeouts: ContainerTimeouts,

    pub policy_enabled: bool,
    pub policy_cache_ttl: i64,

    pub buildroot_enabled: bool,

    pub monitoring_enabled: bool,
    pub monitoring_bind: String,
    pub monitoring_container_history_ttl: i64,
    pub monitoring_task_history_ttl: i64,

    pub podman_socket: String,
    pub host_mount_map: HashMap<PathBuf, PathBuf>,

    pub shared_storage_root: PathBuf,
    pub work_root: PathBuf,

    pub hub_url: String,
    pub hub_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// On-disk (TOML) representation. Every field is optional: absence simply
/// means "fall through to the next tier".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub worker_id: Option<String>,
    pub log_format: Option<LogFormat>,
    pub task_image_default: Option<String>,
    pub image_pull_policy: Option<String>,
    pub container_mounts: Option<Vec<String>>,
    pub network_enabled: Option<String>,
    pub container_labels: Option<HashMap<String, String>>,
    pub container_timeout_pull: Option<String>,
    pub container_timeout_start: Option<String>,
    pub container_timeout_stop_grace: Option<String>,
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

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "failed to parse configuration".to_string())
    }
}

/// Boolean truth/false sets per §4.2: `true, True, 1, yes, on` / `false,
/// False, 0, no, off`. Values outside both sets are an error.
pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw {
        "true" | "True" | "1" | "yes" | "on" => Ok(true),
        "false" | "False" | "0" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a recognized boolean: {}", other),
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
}

/// Resolves one named option through env → options object → file → default,
/// the priority chain §4.2 specifies.
fn resolve<'a>(
    key: &str,
    from_options: Option<&'a str>,
    from_file: Option<&'a str>,
    default: &'a str,
    owned_env: &'a mut Option<String>,
) -> &'a str {
    *owned_env = env_var(key);
    if let Some(v) = owned_env.as_deref() {
        return v;
    }
    if let Some(v) = from_options {
        return v;
    }
    if let Some(v) = from_file {
        return v;
    }
    default
}

impl Configuration {
    /// Compose the full priority chain for every recognized option.
    pub fn load_layered(file_path: Option<&Path>, options: &ConfigOptions) -> Result<Self> {
        let file = match file_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let mut scratch = None;
        let worker_id = resolve(
            "WORKER_ID",
            options.worker_id.as_deref(),
            file.worker_id.as_deref(),
            "",
            &mut scratch,
        )
        .to_string();

        let mut scratch = None;
        let image_pull_policy_raw = resolve(
            "IMAGE_PULL_POLICY",
            options.image_pull_policy.as_deref(),
            file.image_pull_policy.as_deref(),
            "if-not-present",
            &mut scratch,
        )
        .to_string();
        let image_pull_policy: PullPolicyConfig = image_pull_policy_raw.parse()?;

        let mut scratch = None;
        let task_image_default = resolve(
            "TASK_IMAGE_DEFAULT",
            options.task_image_default.as_deref(),
            file.task_image_default.as_deref(),
            "quay.io/almalinuxorg/10-base:latest",
            &mut scratch,
        )
        .to_string();

        let mut scratch = None;
        let network_enabled_raw = resolve(
            "NETWORK_ENABLED",
            options.network_enabled.as_deref(),
            file.network_enabled.as_deref(),
            "true",
            &mut scratch,
        )
        .to_string();
        let network_enabled = parse_bool(&network_enabled_raw)?;

        let mut scratch = None;
        let policy_enabled_raw = resolve(
            "POLICY_ENABLED",
            options.policy_enabled.as_deref(),
            file.policy_enabled.as_deref(),
            "true",
            &mut scratch,
        )
        .to_string();
        let policy_enabled = parse_bool(&policy_enabled_raw)?;

        let mut scratch = None;
        let policy_cache_ttl: i64 = resolve(
            "POLICY_CACHE_TTL",
            options.policy_cache_ttl.as_deref(),
            file.policy_cache_ttl.as_deref(),
            "300",
            &mut scratch,
        )
        .parse()
        .context("policy_cache_ttl must be an integer")?;

        let mut scratch = None;
        let buildroot_enabled_raw = resolve(
            "BUILDROOT_ENABLED",
            options.buildroot_enabled.as_deref(),
            file.buildroot_enabled.as_deref(),
            "true",
            &mut scratch,
        )
        .to_string();
        let buildroot_enabled = parse_bool(&buildroot_enabled_raw)?;

        let mut scratch = None;
        let monitoring_enabled_raw = resolve(
            "MONITORING_ENABLED",
            options.monitoring_enabled.as_deref(),
            file.monitoring_enabled.as_deref(),
            "true",
            &mut scratch,
        )
        .to_string();
        let monitoring_enabled = parse_bool(&monitoring_enabled_raw)?;

        let mut scratch = None;
        let monitoring_bind = resolve(
            "MONITORING_BIND",
            options.monitoring_bind.as_deref(),
            file.monitoring_bind.as_deref(),
            "0.0.0.0:8080",
            &mut scratch,
        )
        .to_string();

        let mut scratch = None;
        let monitoring_container_history_ttl: i64 = resolve(
            "MONITORING_CONTAINER_HISTORY_TTL",
            options.monitoring_container_history_ttl.as_deref(),
            file.monitoring_container_history_ttl.as_deref(),
            "3600",
            &mut scratch,
        )
        .parse()
        .context("monitoring_container_history_ttl must be an integer")?;

        let mut scratch = None;
        let monitoring_task_history_ttl: i64 = resolve(
            "MONITORING_TASK_HISTORY_TTL",
            options.monitoring_task_history_ttl.as_deref(),
            file.monitoring_task_history_ttl.as_deref(),
            "86400",
            &mut scratch,
        )
        .parse()
        .context("monitoring_task_history_ttl must be an integer")?;

        let mut scratch = None;
        let podman_socket = resolve(
            "PODMAN_SOCKET",
            options.podman_socket.as_deref(),
            file.podman_socket.as_deref(),
            "unix:///var/run/podman.sock",
            &mut scratch,
        )
        .to_string();

        let mut scratch = None;
        let shared_storage_root = resolve(
            "SHARED_STORAGE_ROOT",
            options.shared_storage_root.as_deref(),
            file.shared_storage_root.as_deref(),
            "/mnt/koji",
            &mut scratch,
        )
        .to_string();

        let mut scratch = None;
        let work_root = resolve(
            "WORK_ROOT",
            options.work_root.as_deref(),
            file.work_root.as_deref(),
            "/mnt/koji/work",
            &mut scratch,
        )
        .to_string();

        let mut scratch = None;
        let hub_url = resolve(
            "HUB_URL",
            options.hub_url.as_deref(),
            file.hub_url.as_deref(),
            "http://localhost:8080/kojihub",
            &mut scratch,
        )
        .to_string();

        let hub_token = env_var("HUB_TOKEN")
            .or_else(|| options.hub_token.clone())
            .or_else(|| file.hub_token.clone());

        let container_timeouts = ContainerTimeouts {
            pull: parse_timeout_secs(
                env_var("CONTAINER_TIMEOUT_PULL").as_deref(),
                options.container_timeout_pull,
                file.container_timeout_pull.as_deref(),
                300,
            )?,
            start: parse_timeout_secs(
                env_var("CONTAINER_TIMEOUT_START").as_deref(),
                options.container_timeout_start,
                file.container_timeout_start.as_deref(),
                60,
            )?,
            stop_grace: parse_timeout_secs(
                env_var("CONTAINER_TIMEOUT_STOP_GRACE").as_deref(),
                options.container_timeout_stop_grace,
                file.container_timeout_stop_grace.as_deref(),
                20,
            )?,
        };

        let container_mounts = options
            .container_mounts
            .clone()
            .or(file.container_mounts.clone())
            .unwrap_or_else(|| vec![format!("{}:{}:rw:Z", shared_storage_root, shared_storage_root)])
            .iter()
            .map(|s| MountSpec::parse(s))
            .collect::<Result<Vec<_>>>()?;

        let container_labels = options
            .container_labels
            .clone()
            .or(file.container_labels.clone())
            .unwrap_or_default();

        let host_mount_map = match options
            .host_mount_map
            .clone()
            .or(file.host_mount_map.clone())
        {
            Some(map) => map
                .into_iter()
                .map(|(k, v)| (PathBuf::from(k), PathBuf::from(v)))
                .collect(),
            None => introspect_container_mounts(Path::new(&shared_storage_root)).unwrap_or_default(),
        };

        Ok(Self {
            worker_id,
            log_format: options.log_format.or(file.log_format).unwrap_or_default(),
            task_image_default,
            image_pull_policy,
            container_mounts,
            network_enabled,
            container_labels,
            container_timeouts,
            policy_enabled,
            policy_cache_ttl,
            buildroot_enabled,
            monitoring_enabled,
            monitoring_bind,
            monitoring_container_history_ttl,
            monitoring_task_history_ttl,
            podman_socket,
            host_mount_map,
            shared_storage_root: PathBuf::from(shared_storage_root),
            work_root: PathBuf::from(work_root),
            hub_url,
            hub_token,
        })
    }
}

fn parse_timeout_secs(
    env: Option<&str>,
    options: Option<u64>,
    file: Option<&str>,
    default: u64,
) -> Result<Duration> {
    if let Some(v) = env {
        return Ok(Duration::from_secs(v.parse().context("timeout must be an integer")?));
    }
    if let Some(v) = options {
        return Ok(Duration::from_secs(v));
    }
    if let Some(v) = file {
        return Ok(Duration::from_secs(v.parse().context("timeout must be an integer")?));
    }
    Ok(Duration::from_secs(default))
}

/// When `host_mount_map` is unset, parse `/proc/self/mountinfo` for bind
/// mounts whose target is beneath `shared_storage_root`, so a worker running
/// itself inside a container can translate container paths back to host
/// paths for nested container operation (§4.2).
fn introspect_container_mounts(shared_storage_root: &Path) -> Option<HashMap<PathBuf, PathBuf>> {
    let content = std::fs::read_to_string("/proc/self/mountinfo").ok()?;
    let mut map = HashMap::new();

    for line in content.lines() {
        let fields: Vec<&str> = line.split(" - ").next()?.split(' ').collect();
        if fields.len() < 5 {
            continue;
        }
        let mount_point = PathBuf::from(fields[4]);
        if mount_point.starts_with(shared_storage_root) {
            map.insert(mount_point.clone(), mount_point);
        }
    }

    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_accepts_documented_truth_and_false_sets() {
        for v in ["true", "True", "1", "yes", "on"] {
            assert!(parse_bool(v).unwrap(), "{v} should parse true");
        }
        for v in ["false", "False", "0", "no", "off"] {
            assert!(!parse_bool(v).unwrap(), "{v} should parse false");
        }
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn defaults_apply_with_no_file_or_options() {
        let options = ConfigOptions::default();
        let config = Configuration::load_layered(None, &options).unwrap();
        assert_eq!(config.image_pull_policy, PullPolicyConfig::IfNotPresent);
        assert!(config.network_enabled);
        assert_eq!(config.policy_cache_ttl, 300);
    }

    #[test]
    fn options_object_overrides_file_tier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adjutant.toml");
        std::fs::write(&path, "task_image_default = \"file-image:latest\"\n").unwrap();

        let mut options = ConfigOptions::default();
        options.task_image_default = Some("options-image:latest".to_string());

        let config = Configuration::load_layered(Some(&path), &options).unwrap();
        assert_eq!(config.task_image_default, "options-image:latest");
    }

    #[test]
    fn environment_variable_outranks_everything() {
        std::env::set_var("KOJI_ADJUTANT_TASK_IMAGE_DEFAULT", "env-image:latest");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adjutant.toml");
        std::fs::write(&path, "task_image_default = \"file-image:latest\"\n").unwrap();

        let mut options = ConfigOptions::default();
        options.task_image_default = Some("options-image:latest".to_string());

        let config = Configuration::load_layered(Some(&path), &options).unwrap();
        assert_eq!(config.task_image_default, "env-image:latest");

        std::env::remove_var("KOJI_ADJUTANT_TASK_IMAGE_DEFAULT");
    }
}
