use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::buildroot::BuildrootInitializer;
use crate::config::Configuration;
use crate::hub::HubClient;
use crate::logsink::LogSink;
use crate::policy::PolicyResolver;
use crate::registry::{ContainerRegistry, ContainerStatus, TaskInfo, TaskRegistry, TaskStatus};
use crate::runtime::{ContainerRuntime, ContainerSpec, RuntimeTimeouts};

use super::base::{default_mounts, TaskContext};
use super::error::{AdapterError, AdapterResult};

#[derive(Debug, Clone)]
pub struct BuildArchParams {
    pub pkg: String,
    pub root: String,
    pub arch: String,
    pub keep_srpm: bool,
    pub repo_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildArchResult {
    pub rpms: Vec<String>,
    pub srpms: Vec<String>,
    pub logs: Vec<String>,
    pub brootid: i64,
}

/// Executes Koji `buildArch` tasks: RPM builds in containers, via the exec
/// pattern exclusively. Grounded on `original_source/task_adapters/buildarch.py`.
pub struct BuildArchAdapter {
    runtime: Arc<dyn ContainerRuntime>,
    policy: Arc<PolicyResolver<HubClient>>,
    buildroot: Arc<BuildrootInitializer>,
    containers: Arc<ContainerRegistry>,
    tasks: Arc<TaskRegistry>,
    config: Arc<Configuration>,
}

impl BuildArchAdapter {
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

    async fn build_spec(&self, ctx: &TaskContext, params: &BuildArchParams) -> ContainerSpec {
        let image = self.policy.resolve_image(&params.root, &params.arch, "buildArch").await;

        let mut env = ctx.environment.clone();
        env.insert("KOJI_TASK_ID".into(), ctx.task_id.to_string());
        env.insert("KOJI_BUILD_TAG".into(), params.root.clone());
        env.insert("KOJI_ARCH".into(), params.arch.clone());
        env.insert("KOJI_REPO_ID".into(), params.repo_id.to_string());
        env.insert("KOJI_KEEP_SRPM".into(), if params.keep_srpm { "1" } else { "0" }.to_string());

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
    /// reported as `(1, BuildArchResult::default())` with the task marked
    /// `Failed`, matching kojid's "tasks never raise" contract.
    pub async fn run(&self, ctx: &TaskContext, params: &BuildArchParams, sink: Arc<dyn LogSink>) -> (i64, BuildArchResult) {
        self.tasks.register(TaskInfo::new(ctx.task_id, "buildArch"));

        match self.run_inner(ctx, params, sink).await {
            Ok((exit_code, result)) => {
                self.tasks.update_status(ctx.task_id, if exit_code == 0 { TaskStatus::Completed } else { TaskStatus::Failed });
                info!("buildArch task {} finished with exit code {}", ctx.task_id, exit_code);
                (exit_code, result)
            }
            Err(e) => {
                error!("buildArch task {} failed: {}", ctx.task_id, e);
                self.tasks.update_status(ctx.task_id, TaskStatus::Failed);
                (1, BuildArchResult { rpms: vec![], srpms: vec![], logs: vec![], brootid: 0 })
            }
        }
    }

    async fn run_inner(
        &self,
        ctx: &TaskContext,
        params: &BuildArchParams,
        sink: Arc<dyn LogSink>,
    ) -> AdapterResult<(i64, BuildArchResult)> {
        let srpm_path = ctx.work_dir.join("work").join(&params.pkg);
        let spec = self.build_spec(ctx, params).await;

        let timeouts = RuntimeTimeouts::default();
        self.runtime.ensure_image_available(&spec.image, super::pull_policy(&self.config), timeouts.pull).await?;
        let handle = self.runtime.create(&spec).await?;
        self.containers.register(crate::registry::ContainerInfo::new(handle.as_str(), &spec.image, spec.command.clone()));
        self.tasks.update_container_id(ctx.task_id, handle.as_str());

        let run_result: AdapterResult<(i64, String)> = async {
            self.runtime.start(&handle, timeouts.start).await?;
            self.containers.update_status(handle.as_str(), ContainerStatus::Running);
            self.runtime.stream_logs(&handle, sink.clone(), false).await?;

            let plan = self
                .buildroot
                .initialize(&srpm_path, &params.root, &params.arch, &ctx.work_dir, params.repo_id, ctx.task_id, None)
                .await?;

            let repo_file = ctx.work_dir.join("koji.repo");
            tokio::fs::write(&repo_file, &plan.repo_file_content).await?;
            let macros_file = ctx.work_dir.join("macros.koji");
            tokio::fs::write(&macros_file, &plan.macros_file_content).await?;

            self.runtime.copy_to(&handle, &repo_file, &plan.repo_file_dest).await?;
            self.runtime.copy_to(&handle, &macros_file, &plan.macros_file_dest).await?;

            let env = plan.environment.clone().into_iter().collect();
            for cmd in &plan.init_commands {
                let exit_code = self.runtime.exec(&handle, cmd, sink.clone(), Some(&env)).await?;
                if exit_code != 0 {
                    return Err(AdapterError::InitCommandFailed(cmd.clone()));
                }
            }

            let exit_code = self.runtime.exec(&handle, &plan.build_command, sink.clone(), Some(&env)).await?;
            if exit_code != 0 {
                warn!("build exited with non-zero code: {}", exit_code);
            }

            Ok((exit_code, plan.tag_name))
        }
        .await;

        self.runtime.remove(&handle, true, timeouts.stop_grace).await.ok();
        self.containers.unregister(handle.as_str());

        let (exit_code, _tag_name) = run_result?;
        let result = self.collect_artifacts(ctx, params).await;
        Ok((exit_code, result))
    }

    async fn collect_artifacts(&self, ctx: &TaskContext, params: &BuildArchParams) -> BuildArchResult {
        let result_dir = ctx.work_dir.join("result");
        let upload_base = format!("work/{}/result", ctx.task_id);

        let mut rpms = Vec::new();
        let mut srpms = Vec::new();
        let mut logs = Vec::new();

        if let Ok(mut entries) = tokio::fs::read_dir(&result_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Ok(file_type) = entry.file_type().await {
                    if !file_type.is_file() {
                        continue;
                    }
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if name.ends_with(".src.rpm") {
                    srpms.push(format!("{}/{}", upload_base, name));
                } else if name.ends_with(".rpm") {
                    rpms.push(format!("{}/{}", upload_base, name));
                } else if name.ends_with(".log") {
                    logs.push(format!("{}/{}", upload_base, name));
                }
            }
        }

        if !params.keep_srpm {
            srpms.clear();
        }

        BuildArchResult { rpms, srpms, logs, brootid: ctx.task_id }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::ConfigOptions;
    use crate::logsink::MemoryLogSink;
    use crate::registry::TaskStatus;
    use crate::runtime::{ContainerError, ContainerHandle, ContainerResult, ContainerRunResult, PullPolicy};

    #[derive(Default)]
    struct FakeRuntime {
        fail_pull: bool,
        created: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn ensure_image_available(&self, image: &str, _policy: PullPolicy, _pull_timeout: Duration) -> ContainerResult<()> {
            if self.fail_pull {
                return Err(ContainerError::ImagePullTimeout { image: image.to_string(), elapsed_secs: 300 });
            }
            Ok(())
        }

        async fn create(&self, _spec: &ContainerSpec) -> ContainerResult<ContainerHandle> {
            let mut created = self.created.lock().unwrap();
            let handle = ContainerHandle(format!("fake-{}", created.len()));
            created.push(handle.as_str().to_string());
            Ok(handle)
        }

        async fn start(&self, _handle: &ContainerHandle, _timeout: Duration) -> ContainerResult<()> {
            Ok(())
        }

        async fn wait(&self, _handle: &ContainerHandle) -> ContainerResult<i64> {
            Ok(0)
        }

        async fn remove(&self, handle: &ContainerHandle, _force: bool, _stop_grace: Duration) -> ContainerResult<()> {
            self.removed.lock().unwrap().push(handle.as_str().to_string());
            Ok(())
        }

        async fn stream_logs(&self, _handle: &ContainerHandle, _sink: Arc<dyn LogSink>, _follow: bool) -> ContainerResult<()> {
            Ok(())
        }

        async fn exec(
            &self,
            _handle: &ContainerHandle,
            _command: &[String],
            _sink: Arc<dyn LogSink>,
            _env: Option<&StdHashMap<String, String>>,
        ) -> ContainerResult<i64> {
            Ok(0)
        }

        async fn exec_capture(&self, _handle: &ContainerHandle, _command: &[String]) -> ContainerResult<(i64, Vec<u8>)> {
            Ok((0, Vec::new()))
        }

        async fn copy_to(&self, _handle: &ContainerHandle, _src_file: &Path, _dest_path: &Path) -> ContainerResult<()> {
            Ok(())
        }

        async fn run(
            &self,
            spec: &ContainerSpec,
            _sink: Arc<dyn LogSink>,
            _attach: bool,
            _pull_policy: PullPolicy,
            _timeouts: &RuntimeTimeouts,
        ) -> ContainerResult<ContainerRunResult> {
            let handle = self.create(spec).await?;
            Ok(ContainerRunResult { handle, exit_code: 0, started_at: chrono::Utc::now(), finished_at: chrono::Utc::now() })
        }
    }

    fn test_config() -> Arc<Configuration> {
        Arc::new(Configuration::load_layered(None, &ConfigOptions::default()).unwrap())
    }

    fn test_adapter(runtime: Arc<dyn ContainerRuntime>) -> BuildArchAdapter {
        let config = test_config();
        let hub = Arc::new(HubClient::new(&config).unwrap());
        let policy = Arc::new(PolicyResolver::new(hub.clone(), &config));
        let buildroot = Arc::new(BuildrootInitializer::new(hub));
        BuildArchAdapter::new(
            runtime,
            policy,
            buildroot,
            Arc::new(ContainerRegistry::new(3600)),
            Arc::new(TaskRegistry::new(3600)),
            config,
        )
    }

    fn test_ctx(task_id: i64, work_dir: &Path) -> TaskContext {
        TaskContext::new(task_id, work_dir.to_path_buf(), PathBuf::from("/mnt/koji"))
    }

    fn test_params() -> BuildArchParams {
        BuildArchParams { pkg: "foo-1.0-1.src.rpm".into(), root: "f39-build".into(), arch: "x86_64".into(), keep_srpm: true, repo_id: 7 }
    }

    #[tokio::test]
    async fn build_spec_sets_environment_command_and_mounts() {
        let adapter = test_adapter(Arc::new(FakeRuntime::default()));
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_ctx(42, tmp.path());
        let params = test_params();

        let spec = adapter.build_spec(&ctx, &params).await;

        assert_eq!(spec.command, vec!["/bin/sleep".to_string(), "infinity".to_string()]);
        assert_eq!(spec.environment.get("KOJI_TASK_ID").map(String::as_str), Some("42"));
        assert_eq!(spec.environment.get("KOJI_ARCH").map(String::as_str), Some("x86_64"));
        assert!(spec.network_enabled);
        assert_eq!(spec.mounts.len(), 2);
    }

    #[tokio::test]
    async fn image_pull_failure_marks_task_failed_and_returns_exit_code_one() {
        let runtime = Arc::new(FakeRuntime { fail_pull: true, ..Default::default() });
        let adapter = test_adapter(runtime.clone());
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_ctx(7, tmp.path());
        let params = test_params();
        let sink: Arc<dyn LogSink> = Arc::new(MemoryLogSink::new());

        let (exit_code, result) = adapter.run(&ctx, &params, sink).await;

        assert_eq!(exit_code, 1);
        assert!(result.rpms.is_empty());
        assert!(result.srpms.is_empty());
        assert!(result.logs.is_empty());
        assert_eq!(result.brootid, 0);
        assert_eq!(adapter.tasks.get(7).unwrap().status, TaskStatus::Failed);
        assert!(runtime.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn collect_artifacts_splits_by_extension_and_respects_keep_srpm() {
        let adapter = test_adapter(Arc::new(FakeRuntime::default()));
        let tmp = tempfile::tempdir().unwrap();
        let result_dir = tmp.path().join("result");
        tokio::fs::create_dir_all(&result_dir).await.unwrap();
        tokio::fs::write(result_dir.join("foo-1.0-1.x86_64.rpm"), b"").await.unwrap();
        tokio::fs::write(result_dir.join("foo-1.0-1.src.rpm"), b"").await.unwrap();
        tokio::fs::write(result_dir.join("build.log"), b"").await.unwrap();

        let ctx = test_ctx(9, tmp.path());
        let mut params = test_params();
        params.keep_srpm = false;

        let result = adapter.collect_artifacts(&ctx, &params).await;

        assert_eq!(result.rpms.len(), 1);
        assert!(result.srpms.is_empty(), "keep_srpm=false should drop srpms");
        assert_eq!(result.logs.len(), 1);
        assert_eq!(result.brootid, 9);
    }
}
