use std::collections::HashMap;

use serde::Deserialize;

/// Subset of Koji's `getTag` result this worker consults: `extra` carries
/// any `adjutant_image_policy` entry the policy resolver needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub arches: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Subset of Koji's build-config result (`getBuildConfig`), which is where
/// a tag's effective `extra` (including inherited values) lives.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    pub tag_name: String,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub install_groups: Vec<String>,
    #[serde(default)]
    pub extra_packages: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repo {
    pub id: i64,
    pub tag_name: String,
    pub state: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    pub id: i64,
    pub tag_name: String,
    pub state: i32,
    #[serde(default)]
    pub urls: HashMap<String, String>,
}
