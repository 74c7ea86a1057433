use std::path::Path;
use std::sync::Arc;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use tracing::{error, warn};

use crate::config::Configuration;
use crate::hub::HubClient;
use crate::logsink::LogSink;
use crate::policy::PolicyResolver;
use crate::registry::{ContainerInfo, ContainerRegistry, ContainerStatus, TaskInfo, TaskRegistry, TaskStatus};
use crate::runtime::{ContainerRuntime, ContainerSpec, RuntimeTimeouts, VolumeMount};

use super::base::{default_mounts, TaskContext};
use super::error::AdapterResult;

#[derive(Debug, Clone)]
pub struct CreaterepoParams {
    pub repo_id: i64,
    pub arch: String,
    pub tag_name: Option<String>,
    pub repo_dir: Option<String>,
    pub pkglist: Option<String>,
    pub groupdata: Option<String>,
    pub oldrepodata: Option<String>,
}

/// `[uploadpath, [filename, ...]]` on the wire — a 2-element array, not an
/// object, matching kojid's `createrepo` task result shape.
#[derive(Debug, Clone)]
pub struct CreaterepoResult {
    pub uploadpath: String,
    pub files: Vec<String>,
}

impl Serialize for CreaterepoResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.uploadpath)?;
        seq.serialize_element(&self.files)?;
        seq.end()
    }
}

/// Executes Koji `createrepo` tasks: runs `createrepo_c` in a container and
/// collects `repodata/` artifacts. Grounded on
/// `original_source/task_adapters/createrepo.py`.
pub struct CreaterepoAdapter {
    runtime: Arc<dyn ContainerRuntime>,
    policy: Arc<PolicyResolver<HubClient>>,
    containers: Arc<ContainerRegistry>,
    tasks: Arc<TaskRegistry>,
    config: Arc<Configuration>,
}

impl CreaterepoAdapter {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        policy: Arc<PolicyResolver<HubClient>>,
        containers: Arc<ContainerRegistry>,
        tasks: Arc<TaskRegistry>,
        config: Arc<Configuration>,
    ) -> Self {
        Self { runtime, policy, containers, tasks, config }
    }

    async fn build_spec(&self, ctx: &TaskContext, params: &CreaterepoParams) -> ContainerSpec {
        let image = match &params.tag_name {
            Some(tag_name) => self.policy.resolve_image(tag_name, &params.arch, "createrepo").await,
            None => self.config.task_image_default.clone(),
        };

        let work_target = ctx.container_work_path();
        let outdir = format!("{}/repo", work_target);
        let repo_dir = params.repo_dir.clone().unwrap_or_else(|| format!("/mnt/koji/repos/{}/{}", params.repo_id, params.arch));
        let pkglist = params.pkglist.clone().unwrap_or_else(|| format!("{}/pkglist", repo_dir));

        let mut command = vec![
            "/usr/bin/createrepo_c".to_string(),
            "--error-exit-val".to_string(),
            "-vd".to_string(),
            "-o".to_string(),
            outdir.clone(),
        ];

        let pkglist_has_content = tokio::fs::metadata(&pkglist).await.map(|m| m.len() > 0).unwrap_or(false);
        if pkglist_has_content {
            command.push("-i".into());
            command.push(pkglist.clone());
        }

        if let Some(groupdata) = &params.groupdata {
            if tokio::fs::metadata(groupdata).await.is_ok() {
                command.push("-g".into());
                command.push(groupdata.clone());
            }
        }

        if params.oldrepodata.is_some() {
            command.push("--update".into());
        }

        command.push(if pkglist_has_content { repo_dir.clone() } else { outdir });

        let mut env = ctx.environment.clone();
        env.insert("KOJI_TASK_ID".into(), ctx.task_id.to_string());
        env.insert("KOJI_REPO_ID".into(), params.repo_id.to_string());
        env.insert("KOJI_ARCH".into(), params.arch.clone());
        env.insert("TMPDIR".into(), work_target.clone());

        let mut mounts = default_mounts(ctx);
        if let Some(host_repo_dir) = self.host_path(&ctx.koji_mount_root, &repo_dir) {
            if host_repo_dir.exists() {
                mounts.push(VolumeMount::new(host_repo_dir, repo_dir.clone(), true).with_label("Z"));
            }
        }
        if let Some(groupdata) = &params.groupdata {
            if let Some(host_groupdata) = self.host_path(&ctx.koji_mount_root, groupdata) {
                if host_groupdata.exists() {
                    mounts.push(VolumeMount::new(host_groupdata, groupdata.clone(), true).with_label("Z"));
                }
            }
        }

        ContainerSpec::builder(image)
            .command(command)
            .envs(env)
            .workdir(work_target)
            .mounts(mounts)
            .user(1000, 1000)
            .network_enabled(true)
            .remove_after_exit(true)
            .build()
    }

    fn host_path(&self, koji_mount_root: &Path, container_path: &str) -> Option<std::path::PathBuf> {
        container_path.strip_prefix("/mnt/koji").map(|rest| koji_mount_root.join(rest.trim_start_matches('/')))
    }

    /// Runs the task. Never propagates an error: any in-run failure is
    /// reported as `(1, CreaterepoResult::default())` with the task marked
    /// `Failed`.
    pub async fn run(&self, ctx: &TaskContext, params: &CreaterepoParams, sink: Arc<dyn LogSink>) -> (i64, CreaterepoResult) {
        let mut task_info = TaskInfo::new(ctx.task_id, "createrepo");
        task_info.arch = Some(params.arch.clone());
        task_info.tag = params.tag_name.clone();
        self.tasks.register(task_info);

        match self.run_inner(ctx, params, sink).await {
            Ok((exit_code, result)) => {
                self.tasks.update_status(ctx.task_id, if exit_code == 0 { TaskStatus::Completed } else { TaskStatus::Failed });
                (exit_code, result)
            }
            Err(e) => {
                error!("createrepo task {} failed: {}", ctx.task_id, e);
                self.tasks.update_status(ctx.task_id, TaskStatus::Failed);
                (1, CreaterepoResult { uploadpath: String::new(), files: Vec::new() })
            }
        }
    }

    async fn run_inner(
        &self,
        ctx: &TaskContext,
        params: &CreaterepoParams,
        sink: Arc<dyn LogSink>,
    ) -> AdapterResult<(i64, CreaterepoResult)> {
        let spec = self.build_spec(ctx, params).await;

        let timeouts = RuntimeTimeouts::default();
        let result = self.runtime.run(&spec, sink, true, super::pull_policy(&self.config), &timeouts).await?;

        self.containers.register(ContainerInfo::new(result.handle.as_str(), &spec.image, spec.command.clone()));
        self.tasks.update_container_id(ctx.task_id, result.handle.as_str());
        self.containers.update_status(result.handle.as_str(), ContainerStatus::Exited);

        if result.exit_code != 0 {
            warn!("createrepo exited with non-zero code: {}", result.exit_code);
            return Ok((result.exit_code, CreaterepoResult { uploadpath: String::new(), files: Vec::new() }));
        }

        let outdir_host = ctx.work_dir.join("repo");
        let datadir_host = outdir_host.join("repodata");
        let uploadpath = format!("work/{}/repo", ctx.task_id);

        let mut files = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(&datadir_host).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Ok(file_type) = entry.file_type().await {
                    if file_type.is_file() {
                        files.push(entry.file_name().to_string_lossy().to_string());
                    }
                }
            }
        }

        Ok((result.exit_code, CreaterepoResult { uploadpath, files }))
    }
}
