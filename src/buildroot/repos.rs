use crate::hub::HubClient;

use super::error::{BuildrootError, BuildrootResult};

/// Render `/etc/yum.repos.d/koji.repo` content for `(tag, repo_id, arch)`.
pub async fn generate_repo_config(
    hub: &HubClient,
    tag_name: &str,
    repo_id: i64,
    arch: &str,
    topurl: Option<&str>,
) -> BuildrootResult<String> {
    hub.repo_info(repo_id)
        .await
        .map_err(|e| BuildrootError::RepoConfig(format!("repoInfo({}) failed: {}", repo_id, e)))?;

    let base = topurl.unwrap_or("/mnt/koji");
    let repo_path = format!("{}/repos/{}/{}/{}/", base, tag_name, repo_id, arch);

    let base_url = if base.starts_with("http") {
        repo_path.clone()
    } else {
        format!("file://{}", repo_path)
    };

    Ok(format!(
        "[koji-{tag}]\nname=Koji Repository for {tag}\nbaseurl={base_url}\nenabled=1\ngpgcheck=0\npriority=10\nskip_if_unavailable=0\n",
        tag = tag_name,
        base_url = base_url,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_base_url_uses_file_scheme() {
        let repo_path = "/mnt/koji/repos/f39-build/12/x86_64/";
        let rendered = format!("file://{}", repo_path);
        assert!(rendered.starts_with("file:///mnt/koji"));
    }
}
