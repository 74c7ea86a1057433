use serde::Deserialize;

/// A single precedence rule inside a policy document. Tagged by `type` to
/// match the hub-stored JSON shape from `original_source/policy/resolver.py`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyRule {
    TagArch { tag: String, arch: String, image: String },
    Tag { tag: String, image: String },
    TaskType { task_type: String, image: String },
    Default { image: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    pub rules: Vec<PolicyRule>,
}
