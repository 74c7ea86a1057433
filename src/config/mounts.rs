use std::path::PathBuf;

use anyhow::{Context, Result};

/// One entry of the `container_mounts` option: `"src:dst:mode:label"`, where
/// `mode` is `ro` or `rw` and `label` (an SELinux-style tag) is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub source: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
    pub label: Option<String>,
}

impl MountSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        let (source, target) = match parts.as_slice() {
            [src, dst, ..] => (*src, *dst),
            _ => anyhow::bail!("mount spec must be src:dst[:mode[:label]]: {}", raw),
        };

        let mode = parts.get(2).copied().unwrap_or("rw");
        let read_only = match mode {
            "ro" => true,
            "rw" => false,
            other => anyhow::bail!("mount mode must be ro or rw, got: {}", other),
        };

        let label = parts.get(3).map(|s| s.to_string());

        Ok(Self {
            source: PathBuf::from(source),
            target: PathBuf::from(target),
            read_only,
            label,
        })
    }
}

impl std::str::FromStr for MountSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).with_context(|| format!("invalid mount spec: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_spec() {
        let spec = MountSpec::parse("/mnt/koji:/mnt/koji:ro:Z").unwrap();
        assert_eq!(spec.source, PathBuf::from("/mnt/koji"));
        assert_eq!(spec.target, PathBuf::from("/mnt/koji"));
        assert!(spec.read_only);
        assert_eq!(spec.label.as_deref(), Some("Z"));
    }

    #[test]
    fn defaults_to_rw_with_no_label() {
        let spec = MountSpec::parse("/a:/b").unwrap();
        assert!(!spec.read_only);
        assert!(spec.label.is_none());
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(MountSpec::parse("/a:/b:bogus").is_err());
    }
}
