//! Policy Resolver (C3): selects a container image for `(tag, arch,
//! task_type)` via a cached hub lookup with rule-precedence evaluation.
//!
//! Grounded on `original_source/policy/resolver.py`. The cache itself follows
//! the donor's guarded-map idiom (`parking_lot::Mutex`, as used for the
//! registries) rather than `DashMap`: TTL checks and the "only insert on
//! successful fetch" rule read as a single critical section per key.

mod cache;
mod rule;

pub use cache::CachedPolicy;
pub use rule::{Policy, PolicyRule};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::hub::HubClient;
use cache::PolicyCache;

/// Abstraction over the hub RPC surface C3 needs, so tests can substitute a
/// stub without a live hub (mirrors `original_source`'s `session` parameter).
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn tag_policy_json(&self, tag_name: &str) -> Option<String>;
    async fn build_config_policy_json(&self, tag_name: &str) -> Option<String>;
}

#[async_trait]
impl PolicySource for HubClient {
    async fn tag_policy_json(&self, tag_name: &str) -> Option<String> {
        self.get_tag(tag_name)
            .await
            .ok()
            .and_then(|tag| tag.extra.get("adjutant_image_policy").cloned())
            .map(|v| v.to_string())
    }

    async fn build_config_policy_json(&self, tag_name: &str) -> Option<String> {
        self.get_build_config(tag_name)
            .await
            .ok()
            .and_then(|cfg| cfg.extra.get("adjutant_image_policy").cloned())
            .map(|v| v.to_string())
    }
}

pub struct PolicyResolver<S: PolicySource> {
    source: Arc<S>,
    cache: PolicyCache,
    policy_enabled: bool,
    cache_ttl_secs: i64,
    config_default: String,
}

impl<S: PolicySource> PolicyResolver<S> {
    pub fn new(source: Arc<S>, config: &Configuration) -> Self {
        Self {
            source,
            cache: PolicyCache::new(),
            policy_enabled: config.policy_enabled,
            cache_ttl_secs: config.policy_cache_ttl,
            config_default: config.task_image_default.clone(),
        }
    }

    /// Resolve an image for `(tag_name, arch, task_type)` per the §4.3
    /// algorithm: cache hit (if unexpired) → disabled-short-circuit → hub
    /// fetch (normalizing wrapped/unwrapped/string-or-dict shapes) → cache
    /// insert on success → rule evaluation.
    pub async fn resolve_image(&self, tag_name: &str, arch: &str, task_type: &str) -> String {
        if let Some(policy) = self.cache.get(tag_name, arch, self.cache_ttl_secs) {
            return evaluate(&policy, tag_name, arch, task_type).unwrap_or_else(|| self.config_default.clone());
        }

        if !self.policy_enabled {
            return self.config_default.clone();
        }

        match self.fetch_policy(tag_name).await {
            Some(policy) => {
                self.cache.insert(tag_name, arch, policy.clone());
                evaluate(&policy, tag_name, arch, task_type).unwrap_or_else(|| self.config_default.clone())
            }
            None => self.config_default.clone(),
        }
    }

    async fn fetch_policy(&self, tag_name: &str) -> Option<Policy> {
        let raw = match self.source.tag_policy_json(tag_name).await {
            Some(raw) => Some(raw),
            None => self.source.build_config_policy_json(tag_name).await,
        }?;

        match parse_policy_document(&raw) {
            Ok(policy) => Some(policy),
            Err(e) => {
                warn!("invalid policy document for tag {}: {}", tag_name, e);
                None
            }
        }
    }

    pub fn invalidate_tag(&self, tag_name: &str) {
        self.cache.invalidate_tag(tag_name);
    }

    pub fn invalidate(&self, tag_name: &str, arch: &str) {
        self.cache.invalidate(tag_name, arch);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

/// Normalize a policy document that may be a bare `{"rules": [...]}`, a
/// wrapped `{"adjutant_image_policy": {...}}`, or that whole thing again as
/// a JSON string (the hub stores `extra` values loosely typed).
fn parse_policy_document(raw: &str) -> Result<Policy, serde_json::Error> {
    let mut value: serde_json::Value = serde_json::from_str(raw).or_else(|_| {
        // raw may itself be a JSON-encoded string containing JSON.
        serde_json::from_str::<String>(raw).and_then(|inner| serde_json::from_str(&inner))
    })?;

    if let Some(wrapped) = value.get("adjutant_image_policy").cloned() {
        value = wrapped;
    }

    serde_json::from_value(value)
}

/// Evaluate rules once in list order, keeping the first match per precedence
/// class, then return the highest-precedence match (tag_arch > tag >
/// task_type > default).
fn evaluate(policy: &Policy, tag_name: &str, arch: &str, task_type: &str) -> Option<String> {
    let mut by_class: HashMap<&'static str, &str> = HashMap::new();

    for rule in &policy.rules {
        match rule {
            PolicyRule::TagArch { tag, arch: rule_arch, image } if tag == tag_name && rule_arch == arch => {
                by_class.entry("tag_arch").or_insert(image);
            }
            PolicyRule::Tag { tag, image } if tag == tag_name => {
                by_class.entry("tag").or_insert(image);
            }
            PolicyRule::TaskType { task_type: rule_type, image } if rule_type == task_type => {
                by_class.entry("task_type").or_insert(image);
            }
            PolicyRule::Default { image } => {
                by_class.entry("default").or_insert(image);
            }
            _ => {}
        }
    }

    debug!(
        "policy evaluation for tag={} arch={} task_type={}: {:?}",
        tag_name, arch, task_type, by_class
    );

    ["tag_arch", "tag", "task_type", "default"]
        .iter()
        .find_map(|class| by_class.get(class).map(|s| s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        calls: AtomicUsize,
        document: String,
    }

    #[async_trait]
    impl PolicySource for StubSource {
        async fn tag_policy_json(&self, _tag_name: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(self.document.clone())
        }

        async fn build_config_policy_json(&self, _tag_name: &str) -> Option<String> {
            None
        }
    }

    fn precedence_policy() -> String {
        serde_json::json!({
            "rules": [
                {"type": "default", "image": "D"},
                {"type": "task_type", "task_type": "buildArch", "image": "B"},
                {"type": "tag", "tag": "f39", "image": "T"},
                {"type": "tag_arch", "tag": "f39", "arch": "x86_64", "image": "TA"},
            ]
        })
        .to_string()
    }

    fn test_config(ttl: i64) -> Configuration {
        let options = crate::config::ConfigOptions::default();
        let mut config = Configuration::load_layered(None, &options).unwrap();
        config.policy_cache_ttl = ttl;
        config
    }

    #[tokio::test]
    async fn precedence_scenario_matches_spec() {
        let source = Arc::new(StubSource {
            calls: AtomicUsize::new(0),
            document: precedence_policy(),
        });
        let resolver = PolicyResolver::new(source, &test_config(300));

        assert_eq!(resolver.resolve_image("f39", "x86_64", "buildArch").await, "TA");
        assert_eq!(resolver.resolve_image("f39", "aarch64", "buildArch").await, "T");
        assert_eq!(resolver.resolve_image("other", "x86_64", "buildArch").await, "B");
        assert_eq!(resolver.resolve_image("other", "x86_64", "createrepo").await, "D");
    }

    #[tokio::test]
    async fn cache_hit_limits_hub_calls_per_distinct_key() {
        let source = Arc::new(StubSource {
            calls: AtomicUsize::new(0),
            document: precedence_policy(),
        });
        let resolver = PolicyResolver::new(source.clone(), &test_config(300));

        for _ in 0..5 {
            resolver.resolve_image("f39", "x86_64", "buildArch").await;
        }
        resolver.resolve_image("f39", "aarch64", "buildArch").await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_policy_returns_config_default_without_fetch() {
        let source = Arc::new(StubSource {
            calls: AtomicUsize::new(0),
            document: precedence_policy(),
        });
        let mut config = test_config(300);
        config.policy_enabled = false;
        let resolver = PolicyResolver::new(source.clone(), &config);

        let image = resolver.resolve_image("f39", "x86_64", "buildArch").await;
        assert_eq!(image, config.task_image_default);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrapped_and_unwrapped_policy_documents_agree() {
        let unwrapped = precedence_policy();
        let wrapped = serde_json::json!({ "adjutant_image_policy": serde_json::from_str::<serde_json::Value>(&unwrapped).unwrap() }).to_string();

        let a = parse_policy_document(&unwrapped).unwrap();
        let b = parse_policy_document(&wrapped).unwrap();

        assert_eq!(
            evaluate(&a, "f39", "x86_64", "buildArch"),
            evaluate(&b, "f39", "x86_64", "buildArch"),
        );
    }
}
