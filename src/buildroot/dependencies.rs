use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::hub::HubClient;

/// Extract the package-name portion of each `BuildRequires:` clause from an
/// SRPM header, via `rpm -qp --requires` against the host-visible file.
pub async fn extract_buildrequires_from_srpm(srpm_path: &Path) -> anyhow::Result<Vec<String>> {
    if !srpm_path.exists() {
        anyhow::bail!("SRPM file not found: {}", srpm_path.display());
    }

    let output = tokio::process::Command::new("rpm")
        .arg("-qp")
        .arg("--requires")
        .arg(srpm_path)
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!(
            "rpm -qp --requires failed for {}: {}",
            srpm_path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let mut build_requires = Vec::new();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("BuildRequires:") {
            if let Some(package) = rest.trim().split_whitespace().next() {
                build_requires.push(package.to_string());
            }
        }
    }

    debug!("extracted {} BuildRequires from {}", build_requires.len(), srpm_path.display());
    Ok(build_requires)
}

/// Buildroot packages from the hub: install groups (as `@group`), extra
/// packages, and tag-extra `buildroot_packages` (list or delimited string).
pub async fn get_buildroot_packages(hub: &HubClient, tag_name: &str) -> Vec<String> {
    let mut packages = Vec::new();

    let build_config = match hub.get_build_config(tag_name).await {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("failed to get build config for {}: {}", tag_name, e);
            return packages;
        }
    };

    for group in &build_config.install_groups {
        packages.push(format!("@{}", group));
    }

    packages.extend(build_config.extra_packages.iter().cloned());

    if let Ok(tag) = hub.get_tag(tag_name).await {
        if let Some(buildroot_packages) = tag.extra.get("buildroot_packages") {
            match buildroot_packages {
                serde_json::Value::Array(items) => {
                    for item in items {
                        if let Some(s) = item.as_str() {
                            packages.push(s.to_string());
                        }
                    }
                }
                serde_json::Value::String(s) => {
                    packages.extend(s.replace(',', " ").split_whitespace().map(str::to_string));
                }
                _ => {}
            }
        }
    }

    packages
}

/// Union SRPM BuildRequires with hub-resolved buildroot packages, sorted for
/// stable diagnostic output.
pub async fn resolve_build_dependencies(
    hub: &HubClient,
    tag_name: &str,
    srpm_path: Option<&Path>,
) -> Vec<String> {
    let mut dependencies: BTreeSet<String> = BTreeSet::new();

    if let Some(path) = srpm_path {
        if path.exists() {
            match extract_buildrequires_from_srpm(path).await {
                Ok(deps) => dependencies.extend(deps),
                Err(e) => warn!("failed to extract SRPM dependencies: {}", e),
            }
        }
    }

    dependencies.extend(get_buildroot_packages(hub, tag_name).await);

    dependencies.into_iter().collect()
}
