use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::buildroot::BuildrootInitializer;
use crate::config::Configuration;
use crate::hub::HubClient;
use crate::logsink::LogSink;
use crate::policy::PolicyResolver;
use crate::registry::{ContainerInfo, ContainerRegistry, ContainerStatus, TaskInfo, TaskRegistry, TaskStatus};
use crate::runtime::{ContainerRuntime, ContainerSpec, RuntimeTimeouts};

use super::base::{default_mounts, TaskContext};
use super::error::{AdapterError, AdapterResult};

#[derive(Debug, Clone)]
pub struct RebuildSrpmParams {
    pub srpm: String,
    pub build_tag: String,
    pub repo_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SrpmSourceInfo {
    pub source: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildSrpmResult {
    pub srpm: String,
    pub logs: Vec<String>,
    pub brootid: i64,
    pub source: SrpmSourceInfo,
}

/// Executes Koji `rebuildSRPM` tasks: rebuilds an existing SRPM with correct
/// dist tags and macros inside a container. Always requires buildroot
/// initialization. Grounded on
/// `original_source/task_adapters/rebuild_srpm.py`.
pub struct RebuildSrpmAdapter {
    runtime: Arc<dyn ContainerRuntime>,
    policy: Arc<PolicyResolver<HubClient>>,
    buildroot: Arc<BuildrootInitializer>,
    containers: Arc<ContainerRegistry>,
    tasks: Arc<TaskRegistry>,
    config: Arc<Configuration>,
}

impl RebuildSrpmAdapter {
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

    fn resolve_srpm_path(&self, ctx: &TaskContext, srpm: &str) -> PathBuf {
        if let Some(rest) = srpm.strip_prefix("work/") {
            ctx.work_dir.join(rest)
        } else {
            ctx.work_dir.join("work").join(srpm)
        }
    }

    async fn build_spec(&self, ctx: &TaskContext, params: &RebuildSrpmParams) -> ContainerSpec {
        let image = self.policy.resolve_image(&params.build_tag, "noarch", "rebuildSRPM").await;

        let mut env = ctx.environment.clone();
        env.insert("KOJI_TASK_ID".into(), ctx.task_id.to_string());
        env.insert("KOJI_BUILD_TAG".into(), params.build_tag.clone());
        env.insert("KOJI_REPO_ID".into(), params.repo_id.to_string());

        ContainerSpec::builder(image)
            .command(vec!["/bin/sleep".into(), "infinity".into()])
            .envs(env)
            .workdir(ctx.container_work_path())
            .mounts(default_mounts(ctx))
            .user(1000, 1000)
            .network_enabled(false)
            .remove_after_exit(true)
            .build()
    }

    /// Runs the task. Never propagates an error: any in-run failure is
    /// reported as `(1, RebuildSrpmResult::default())` with the task marked
    /// `Failed`, matching kojid's "tasks never raise" contract.
    pub async fn run(&self, ctx: &TaskContext, params: &RebuildSrpmParams, sink: Arc<dyn LogSink>) -> (i64, RebuildSrpmResult) {
        let mut task_info = TaskInfo::new(ctx.task_id, "rebuildSRPM");
        task_info.tag = Some(params.build_tag.clone());
        task_info.srpm = Some(params.srpm.clone());
        self.tasks.register(task_info);

        match self.run_inner(ctx, params, sink).await {
            Ok((exit_code, result)) => {
                self.tasks.update_status(ctx.task_id, if exit_code == 0 { TaskStatus::Completed } else { TaskStatus::Failed });
                info!("rebuildSRPM task {} finished with exit code {}", ctx.task_id, exit_code);
                (exit_code, result)
            }
            Err(e) => {
                error!("rebuildSRPM task {} failed: {}", ctx.task_id, e);
                self.tasks.update_status(ctx.task_id, TaskStatus::Failed);
                (
                    1,
                    RebuildSrpmResult {
                        srpm: String::new(),
                        logs: vec![],
                        brootid: 0,
                        source: SrpmSourceInfo { source: String::new(), url: String::new() },
                    },
                )
            }
        }
    }

    async fn run_inner(
        &self,
        ctx: &TaskContext,
        params: &RebuildSrpmParams,
        sink: Arc<dyn LogSink>,
    ) -> AdapterResult<(i64, RebuildSrpmResult)> {
        if !self.config.buildroot_enabled {
            return Err(AdapterError::MissingParameter("buildroot initialization required for rebuildSRPM"));
        }

        let srpm_path = self.resolve_srpm_path(ctx, &params.srpm);
        let spec = self.build_spec(ctx, params).await;

        let timeouts = RuntimeTimeouts::default();
        self.runtime.ensure_image_available(&spec.image, super::pull_policy(&self.config), timeouts.pull).await?;
        let handle = self.runtime.create(&spec).await?;
        self.containers.register(ContainerInfo::new(handle.as_str(), &spec.image, spec.command.clone()));
        self.tasks.update_container_id(ctx.task_id, handle.as_str());

        let work_target = ctx.container_work_path();

        let run_result: AdapterResult<()> = async {
            self.runtime.start(&handle, timeouts.start).await?;
            self.containers.update_status(handle.as_str(), ContainerStatus::Running);
            self.runtime.stream_logs(&handle, sink.clone(), false).await?;

            let plan = self
                .buildroot
                .initialize(&srpm_path, &params.build_tag, "noarch", &ctx.work_dir, params.repo_id, ctx.task_id, None)
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

            let container_srpm_dir = format!("{}/srpm", work_target);
            self.runtime
                .exec(&handle, &["mkdir".into(), "-p".into(), container_srpm_dir.clone()], sink.clone(), Some(&env))
                .await?;

            let srpm_filename = srpm_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let container_srpm_path = format!("{}/{}", container_srpm_dir, srpm_filename);
            self.runtime.copy_to(&handle, &srpm_path, Path::new(&container_srpm_path)).await?;

            let unpacked = self.unpack_srpm(&handle, &container_srpm_path, &work_target, sink.clone(), &env).await?;
            self.rebuild_srpm(&handle, &unpacked.spec_file, &unpacked.source_dir, &work_target, sink.clone(), &env).await?;

            Ok(())
        }
        .await;

        self.runtime.remove(&handle, true, timeouts.stop_grace).await.ok();
        self.containers.unregister(handle.as_str());

        run_result?;

        let result = self.collect_artifacts(ctx, params).await?;
        Ok((0, result))
    }

    async fn unpack_srpm(
        &self,
        handle: &crate::runtime::ContainerHandle,
        srpm_path: &str,
        dest_dir: &str,
        sink: Arc<dyn LogSink>,
        env: &std::collections::HashMap<String, String>,
    ) -> AdapterResult<UnpackedSrpm> {
        let specs_dir = format!("{}/SPECS", dest_dir);
        let sources_dir = format!("{}/SOURCES", dest_dir);

        self.runtime
            .exec(handle, &["mkdir".into(), "-p".into(), specs_dir.clone(), sources_dir.clone()], sink.clone(), Some(env))
            .await?;

        let exit_code = self
            .runtime
            .exec(
                handle,
                &["rpm".into(), "-ivh".into(), "--define".into(), format!("_topdir {}", dest_dir), srpm_path.to_string()],
                sink.clone(),
                Some(env),
            )
            .await?;
        if exit_code != 0 {
            return Err(AdapterError::NoSrpmProduced(srpm_path.to_string()));
        }

        self.runtime.exec(handle, &["ls".into(), "-1".into(), specs_dir.clone()], sink, Some(env)).await?;

        Ok(UnpackedSrpm { spec_file: format!("{}/*.spec", specs_dir), source_dir: sources_dir })
    }

    async fn rebuild_srpm(
        &self,
        handle: &crate::runtime::ContainerHandle,
        spec_file: &str,
        source_dir: &str,
        work_dir: &str,
        sink: Arc<dyn LogSink>,
        env: &std::collections::HashMap<String, String>,
    ) -> AdapterResult<()> {
        let result_dir = format!("{}/result", work_dir);
        self.runtime.exec(handle, &["mkdir".into(), "-p".into(), result_dir.clone()], sink.clone(), Some(env)).await?;

        let rebuild_cmd = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!(
                "rpmbuild -bs --define '_topdir {}' --define '_sourcedir {}' --define '_builddir {}/build' --define '_srcrpmdir {}' {}",
                work_dir, source_dir, work_dir, result_dir, spec_file
            ),
        ];

        let exit_code = self.runtime.exec(handle, &rebuild_cmd, sink, Some(env)).await?;
        if exit_code != 0 {
            return Err(AdapterError::NoSrpmProduced(spec_file.to_string()));
        }
        Ok(())
    }

    async fn collect_artifacts(&self, ctx: &TaskContext, _params: &RebuildSrpmParams) -> AdapterResult<RebuildSrpmResult> {
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

        validate_srpm_nvr(&result_dir.join(&srpm_basename), &srpm_basename).await?;

        Ok(RebuildSrpmResult {
            srpm: srpm_rel_path,
            logs: log_files,
            brootid: ctx.task_id,
            source: SrpmSourceInfo { source: srpm_basename.clone(), url: srpm_basename },
        })
    }
}

struct UnpackedSrpm {
    spec_file: String,
    source_dir: String,
}

/// Validates that the SRPM's name-version-release header matches its file
/// basename. Best-effort: if `rpm` isn't on the host, skips the check
/// rather than failing the task, mirroring `original_source`'s
/// `ImportError`-tolerant behavior when the `koji` RPM bindings are absent.
async fn validate_srpm_nvr(srpm_path: &Path, basename: &str) -> AdapterResult<()> {
    let output = match tokio::process::Command::new("rpm")
        .args(["-qp", "--queryformat", "%{NAME}-%{VERSION}-%{RELEASE}.src.rpm", srpm_path.to_string_lossy().as_ref()])
        .output()
        .await
    {
        Ok(o) => o,
        Err(_) => {
            debug!("rpm command unavailable, skipping SRPM NVR validation");
            return Ok(());
        }
    };
    if !output.status.success() {
        debug!("rpm query failed, skipping SRPM NVR validation");
        return Ok(());
    }
    let expected = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if expected != basename {
        return Err(AdapterError::NvrMismatch { expected, actual: basename.to_string() });
    }
    Ok(())
}
