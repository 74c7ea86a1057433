use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::buildroot::BuildrootInitializer;
use crate::config::Configuration;
use crate::hub::HubClient;
use crate::logsink::LogSink;
use crate::policy::PolicyResolver;
use crate::registry::{ContainerInfo, ContainerRegistry, ContainerStatus, TaskInfo, TaskRegistry, TaskStatus};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, RuntimeTimeouts};
use crate::scm::{get_scm_handler, CheckoutOptions};

use super::base::{default_mounts, TaskContext};
use super::error::{AdapterError, AdapterResult};

#[derive(Debug, Clone)]
pub struct BuildSrpmScmParams {
    pub url: String,
    pub build_tag: String,
    pub repo_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScmSourceInfo {
    pub source: String,
    pub url: String,
    pub commit: String,
    pub branch: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSrpmScmResult {
    pub srpm: String,
    pub logs: Vec<String>,
    pub brootid: i64,
    pub source: ScmSourceInfo,
}

enum BuildMethod {
    Make,
    Rpmbuild,
}

/// Executes Koji `buildSRPMFromSCM` tasks: checks out source from SCM and
/// builds an SRPM inside a container. Always requires buildroot
/// initialization and keeps the network enabled for checkout. Grounded on
/// `original_source/task_adapters/buildsrpm_scm.py`.
pub struct BuildSrpmScmAdapter {
    runtime: Arc<dyn ContainerRuntime>,
    policy: Arc<PolicyResolver<HubClient>>,
    buildroot: Arc<BuildrootInitializer>,
    containers: Arc<ContainerRegistry>,
    tasks: Arc<TaskRegistry>,
    config: Arc<Configuration>,
}

impl BuildSrpmScmAdapter {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        policy: Arc<PolicyResolver<HubClient>>,
        buildroot: Arc<BuildrootInitializer>,
        containers: Arc<ContainerRegistry>,
        tasks: Arc<TaskRegistry>,
        config: Arc<Configuration>,
    ) -> Self {
        Self { runtime, policy, buildroot, containers, tasks, config }
    }

    async fn build_spec(&self, ctx: &TaskContext, params: &BuildSrpmScmParams) -> ContainerSpec {
        let image = self.policy.resolve_image(&params.build_tag, "noarch", "buildSRPMFromSCM").await;

        let mut env = ctx.environment.clone();
        env.insert("KOJI_TASK_ID".into(), ctx.task_id.to_string());
        env.insert("KOJI_BUILD_TAG".into(), params.build_tag.clone());
        env.insert("KOJI_REPO_ID".into(), params.repo_id.to_string());
        env.insert("KOJI_SCM_URL".into(), params.url.clone());

        ContainerSpec::builder(image)
            .command(vec!["/bin/sleep".into(), "infinity".into()])
            .envs(env)
            .workdir(ctx.container_work_path())
            .mounts(default_mounts(ctx))
            .user(1000, 1000)
            .network_enabled(true)
            .remove_after_exit(true)
            .build()
    }

    /// Runs the task. Never propagates an error: any in-run failure is
    /// reported as `(1, BuildSrpmScmResult::default())` with the task marked
    /// `Failed`, matching kojid's "tasks never raise" contract.
    pub async fn run(&self, ctx: &TaskContext, params: &BuildSrpmScmParams, sink: Arc<dyn LogSink>) -> (i64, BuildSrpmScmResult) {
        let mut task_info = TaskInfo::new(ctx.task_id, "buildSRPMFromSCM");
        task_info.tag = Some(params.build_tag.clone());
        task_info.srpm = Some(params.url.clone());
        self.tasks.register(task_info);

        match self.run_inner(ctx, params, sink).await {
            Ok((exit_code, result)) => {
                self.tasks.update_status(ctx.task_id, if exit_code == 0 { TaskStatus::Completed } else { TaskStatus::Failed });
                info!("buildSRPMFromSCM task {} finished with exit code {}", ctx.task_id, exit_code);
                (exit_code, result)
            }
            Err(e) => {
                error!("buildSRPMFromSCM task {} failed: {}", ctx.task_id, e);
                self.tasks.update_status(ctx.task_id, TaskStatus::Failed);
                (
                    1,
                    BuildSrpmScmResult {
                        srpm: String::new(),
                        logs: vec![],
                        brootid: 0,
                        source: ScmSourceInfo { source: String::new(), url: String::new(), commit: String::new(), branch: String::new() },
                    },
                )
            }
        }
    }

    async fn run_inner(
        &self,
        ctx: &TaskContext,
        params: &BuildSrpmScmParams,
        sink: Arc<dyn LogSink>,
    ) -> AdapterResult<(i64, BuildSrpmScmResult)> {
        if !self.config.buildroot_enabled {
            return Err(AdapterError::MissingParameter("buildroot initialization required for buildSRPMFromSCM"));
        }

        let spec = self.build_spec(ctx, params).await;
        let work_target = ctx.container_work_path();
        let source_dir = format!("{}/source", work_target);

        let timeouts = RuntimeTimeouts::default();
        self.runtime.ensure_image_available(&spec.image, super::pull_policy(&self.config), timeouts.pull).await?;
        let handle = self.runtime.create(&spec).await?;
        self.containers.register(ContainerInfo::new(handle.as_str(), &spec.image, spec.command.clone()));
        self.tasks.update_container_id(ctx.task_id, handle.as_str());

        // BuildrootInitializer inspects an SRPM for BuildRequires; at this
        // point in the task no SRPM exists yet, so it is handed an empty
        // placeholder file and simply finds no extra requirements.
        let dummy_srpm_path = ctx.work_dir.join("dummy.src.rpm");
        if let Err(e) = tokio::fs::File::create(&dummy_srpm_path).await {
            self.runtime.remove(&handle, true, timeouts.stop_grace).await.ok();
            self.containers.unregister(handle.as_str());
            return Err(AdapterError::Io(e));
        }

        let run_result: AdapterResult<(String, String)> = async {
            self.runtime.start(&handle, timeouts.start).await?;
            self.containers.update_status(handle.as_str(), ContainerStatus::Running);
            self.runtime.stream_logs(&handle, sink.clone(), false).await?;

            let plan = self
                .buildroot
                .initialize(&dummy_srpm_path, &params.build_tag, "noarch", &ctx.work_dir, params.repo_id, ctx.task_id, None)
                .await?;

            let repo_file = ctx.work_dir.join("koji.repo");
            tokio::fs::write(&repo_file, &plan.repo_file_content).await?;
            let macros_file = ctx.work_dir.join("macros.koji");
            tokio::fs::write(&macros_file, &plan.macros_file_content).await?;

            self.runtime.copy_to(&handle, &repo_file, &plan.repo_file_dest).await?;
            self.runtime.copy_to(&handle, &macros_file, &plan.macros_file_dest).await?;

            let env: std::collections::HashMap<String, String> = plan.environment.clone().into_iter().collect();

            for cmd in &plan.init_commands {
                let exit_code = self.runtime.exec(&handle, cmd, sink.clone(), Some(&env)).await?;
                if exit_code != 0 {
                    return Err(AdapterError::InitCommandFailed(cmd.clone()));
                }
            }

            let handler = get_scm_handler(&params.url, &CheckoutOptions::default())?;
            let metadata = handler.checkout(self.runtime.as_ref(), &handle, &source_dir, sink.clone()).await?;
            info!("SCM checkout complete: commit={} branch={}", metadata.commit, metadata.branch);

            let method = self.detect_build_method(&handle, &source_dir, sink.clone()).await?;
            self.build_srpm(&handle, &source_dir, &work_target, method, sink.clone(), &env).await?;

            Ok((metadata.commit, metadata.branch))
        }
        .await;

        self.runtime.remove(&handle, true, timeouts.stop_grace).await.ok();
        self.containers.unregister(handle.as_str());

        let (commit, branch) = run_result?;

        let result = self.collect_artifacts(ctx, params, commit, branch).await?;
        Ok((0, result))
    }

    async fn detect_build_method(
        &self,
        handle: &ContainerHandle,
        source_dir: &str,
        sink: Arc<dyn LogSink>,
    ) -> AdapterResult<BuildMethod> {
        let check_cmd = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("test -f {}/Makefile && grep -q 'srpm:' {}/Makefile", source_dir, source_dir),
        ];
        let exit_code = self.runtime.exec(handle, &check_cmd, sink, None).await?;
        Ok(if exit_code == 0 { BuildMethod::Make } else { BuildMethod::Rpmbuild })
    }

    async fn build_srpm(
        &self,
        handle: &ContainerHandle,
        source_dir: &str,
        work_dir: &str,
        method: BuildMethod,
        sink: Arc<dyn LogSink>,
        env: &std::collections::HashMap<String, String>,
    ) -> AdapterResult<()> {
        let result_dir = format!("{}/result", work_dir);
        self.runtime.exec(handle, &["mkdir".into(), "-p".into(), result_dir.clone()], sink.clone(), Some(env)).await?;

        let build_cmd = match method {
            BuildMethod::Make => vec!["make".to_string(), "-C".to_string(), source_dir.to_string(), "srpm".to_string()],
            BuildMethod::Rpmbuild => {
                let spec_file = format!("{}/*.spec", source_dir);
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!(
                        "rpmbuild -bs --define '_topdir {}' --define '_sourcedir {}' --define '_srcrpmdir {}' {}",
                        work_dir, source_dir, result_dir, spec_file
                    ),
                ]
            }
        };

        let exit_code = self.runtime.exec(handle, &build_cmd, sink, Some(env)).await?;
        if exit_code != 0 {
            return Err(AdapterError::NoSrpmProduced(source_dir.to_string()));
        }
        Ok(())
    }

    async fn collect_artifacts(
        &self,
        ctx: &TaskContext,
        params: &BuildSrpmScmParams,
        commit: String,
        branch: String,
    ) -> AdapterResult<BuildSrpmScmResult> {
        let result_dir = ctx.work_dir.join("result");
        let upload_base = format!("work/{}/result", ctx.task_id);

        let mut srpm_files = Vec::new();
        let mut log_files = Vec::new();

        if let Ok(mut entries) = tokio::fs::read_dir(&result_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Ok(file_type) = entry.file_type().await {
                    if !file_type.is_file() {
                        continue;
                    }
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if name.ends_with(".src.rpm") {
                    srpm_files.push(format!("{}/{}", upload_base, name));
                } else if name.ends_with(".log") {
                    log_files.push(format!("{}/{}", upload_base, name));
                }
            }
        }

        if srpm_files.is_empty() {
            error!("no SRPM files found in result directory: {}", result_dir.display());
            return Err(AdapterError::NoSrpmProduced(result_dir.display().to_string()));
        }
        if srpm_files.len() > 1 {
            warn!("multiple SRPM files found, keeping first: {:?}", srpm_files);
            srpm_files.truncate(1);
        }

        let srpm_rel_path = srpm_files[0].clone();
        let srpm_basename = srpm_rel_path.rsplit('/').next().unwrap_or_default().to_string();

        Ok(BuildSrpmScmResult {
            srpm: srpm_rel_path,
            logs: log_files,
            brootid: ctx.task_id,
            source: ScmSourceInfo { source: srpm_basename, url: params.url.clone(), commit, branch },
        })
    }
}
