use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use crate::logsink::LogSink;
use crate::runtime::{ContainerHandle, ContainerRuntime};

use super::error::{ScmError, ScmResult};

const GIT_URL_PATTERNS: &[&str] = &[
    r"^git://",
    r"^git\+https://",
    r"^git\+http://",
    r"^https?://.*\.git",
    r"^https?://github\.com/",
    r"^https?://gitlab\.com/",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefType {
    Commit,
    Tag,
    Branch,
}

#[derive(Debug, Clone)]
pub struct CheckoutMetadata {
    pub url: String,
    pub commit: String,
    pub branch: String,
    pub git_ref: String,
    pub ref_type: RefType,
}

/// Options overriding fragment-derived ref resolution; mirrors the
/// `branch`/`tag`/`commit` keys a task's SCM options dict may carry.
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub commit: Option<String>,
}

pub struct GitHandler {
    url: String,
    git_ref: String,
    ref_type: RefType,
}

impl GitHandler {
    pub fn is_scm_url(url: &str) -> bool {
        GIT_URL_PATTERNS.iter().any(|pattern| Regex::new(pattern).unwrap().is_match(url))
    }

    pub fn parse(url: &str, options: &CheckoutOptions) -> Self {
        let (url, fragment) = match url.split_once('#') {
            Some((url, fragment)) => (url.to_string(), Some(fragment.to_string())),
            None => (url.to_string(), None),
        };

        let (git_ref, ref_type) = if let Some(branch) = &options.branch {
            (branch.clone(), RefType::Branch)
        } else if let Some(tag) = &options.tag {
            (tag.clone(), RefType::Tag)
        } else if let Some(commit) = &options.commit {
            (commit.clone(), RefType::Commit)
        } else if let Some(fragment) = fragment {
            let ref_type = classify_ref(&fragment);
            (fragment, ref_type)
        } else {
            ("main".to_string(), RefType::Branch)
        };

        debug!("parsed git url: url={} ref={} ref_type={:?}", url, git_ref, ref_type);
        Self { url, git_ref, ref_type }
    }

    pub async fn checkout(
        &self,
        runtime: &dyn ContainerRuntime,
        handle: &ContainerHandle,
        dest_dir: &str,
        sink: Arc<dyn LogSink>,
    ) -> ScmResult<CheckoutMetadata> {
        info!("checking out git repo: {} -> {}", self.url, dest_dir);

        let env: HashMap<String, String> = HashMap::new();

        let exit_code = runtime
            .exec(handle, &["mkdir".into(), "-p".into(), dest_dir.into()], sink.clone(), Some(&env))
            .await?;
        if exit_code != 0 {
            return Err(ScmError::CheckoutFailed(format!("failed to create directory: {}", dest_dir)));
        }

        match self.ref_type {
            RefType::Commit => {
                let clone_cmd = vec!["git".into(), "clone".into(), self.url.clone(), dest_dir.into()];
                let exit_code = runtime.exec(handle, &clone_cmd, sink.clone(), Some(&env)).await?;
                if exit_code != 0 {
                    return Err(ScmError::CheckoutFailed(format!("git clone failed: {}", self.url)));
                }

                let checkout_cmd = vec!["git".into(), "-C".into(), dest_dir.into(), "checkout".into(), self.git_ref.clone()];
                let exit_code = runtime.exec(handle, &checkout_cmd, sink.clone(), Some(&env)).await?;
                if exit_code != 0 {
                    return Err(ScmError::CheckoutFailed(format!("git checkout commit failed: {}", self.git_ref)));
                }
            }
            RefType::Tag | RefType::Branch => {
                let clone_cmd = vec![
                    "git".into(), "clone".into(), "--depth".into(), "1".into(),
                    "--branch".into(), self.git_ref.clone(), self.url.clone(), dest_dir.into(),
                ];
                let exit_code = runtime.exec(handle, &clone_cmd, sink.clone(), Some(&env)).await?;
                if exit_code != 0 {
                    return Err(ScmError::CheckoutFailed(format!("git clone failed: {}", self.url)));
                }
            }
        }

        let (exit_code, stdout) = runtime
            .exec_capture(handle, &["git".into(), "-C".into(), dest_dir.into(), "rev-parse".into(), "HEAD".into()])
            .await?;
        let commit = if exit_code == 0 {
            String::from_utf8_lossy(&stdout).trim().to_string()
        } else {
            "unknown".to_string()
        };

        info!("git checkout complete: ref={} ref_type={:?}", self.git_ref, self.ref_type);

        Ok(CheckoutMetadata {
            url: self.url.clone(),
            commit,
            branch: if self.ref_type == RefType::Branch { self.git_ref.clone() } else { String::new() },
            git_ref: self.git_ref.clone(),
            ref_type: self.ref_type,
        })
    }
}

fn classify_ref(fragment: &str) -> RefType {
    let hex_commit = Regex::new(r"^[0-9a-f]{7,40}$").unwrap();
    let semver_tag = Regex::new(r"^\d+\.\d+").unwrap();

    if hex_commit.is_match(fragment) {
        RefType::Commit
    } else if fragment.starts_with('v') || semver_tag.is_match(fragment) {
        RefType::Tag
    } else {
        RefType::Branch
    }
}

/// Dispatch a URL to its SCM handler; only git is implemented.
pub fn get_scm_handler(url: &str, options: &CheckoutOptions) -> ScmResult<Arc<GitHandler>> {
    if GitHandler::is_scm_url(url) {
        Ok(Arc::new(GitHandler::parse(url, options)))
    } else {
        Err(ScmError::UnsupportedScm(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_git_scheme_urls() {
        assert!(GitHandler::is_scm_url("git://example.com/repo.git"));
        assert!(GitHandler::is_scm_url("https://github.com/user/repo.git"));
        assert!(GitHandler::is_scm_url("https://gitlab.com/user/repo"));
        assert!(!GitHandler::is_scm_url("svn://example.com/repo"));
    }

    #[test]
    fn fragment_classifies_commit_tag_branch() {
        let commit = GitHandler::parse("git://h/r.git#abcdef1234567", &CheckoutOptions::default());
        assert_eq!(commit.ref_type, RefType::Commit);

        let tag = GitHandler::parse("git://h/r.git#v1.0.0", &CheckoutOptions::default());
        assert_eq!(tag.ref_type, RefType::Tag);

        let branch = GitHandler::parse("git://h/r.git#feature/foo", &CheckoutOptions::default());
        assert_eq!(branch.ref_type, RefType::Branch);
    }

    #[test]
    fn missing_fragment_defaults_to_main_branch() {
        let handler = GitHandler::parse("git://h/r.git", &CheckoutOptions::default());
        assert_eq!(handler.git_ref, "main");
        assert_eq!(handler.ref_type, RefType::Branch);
    }

    #[test]
    fn explicit_options_override_fragment() {
        let options = CheckoutOptions { commit: Some("deadbeef".to_string()), ..Default::default() };
        let handler = GitHandler::parse("git://h/r.git#main", &options);
        assert_eq!(handler.ref_type, RefType::Commit);
        assert_eq!(handler.git_ref, "deadbeef");
    }
}
