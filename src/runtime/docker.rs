//! `bollard`-backed implementation of the container runtime port.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    LogOutput, LogsOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::error::{ContainerError, ContainerResult};
use super::spec::{ContainerHandle, ContainerRunResult, ContainerSpec, PullPolicy};
use super::{ContainerRuntime, RuntimeTimeouts};
use crate::logsink::LogSink;

/// Bound on the in-flight log queue between the reader and writer workers.
/// On overflow the eldest chunk is dropped to admit the newest (§4.1, §8.3).
const LOG_QUEUE_CAPACITY: usize = 1024;

/// Driver over a local OCI engine reachable via Unix socket or HTTP, per C1.
pub struct DockerRuntime {
    docker: Docker,
    worker_id: Option<String>,
    shared_storage_mount: PathBuf,
    default_mount_label: String,
}

impl DockerRuntime {
    pub fn connect(socket_uri: &str, worker_id: Option<String>, shared_storage_mount: PathBuf) -> ContainerResult<Self> {
        let docker = if socket_uri.is_empty() || socket_uri == "unix:///var/run/podman.sock" {
            Docker::connect_with_socket(socket_uri, 120, bollard::API_DEFAULT_VERSION)
                .or_else(|_| Docker::connect_with_local_defaults())?
        } else if let Some(rest) = socket_uri.strip_prefix("unix://") {
            Docker::connect_with_socket(rest, 120, bollard::API_DEFAULT_VERSION)?
        } else {
            Docker::connect_with_http(socket_uri, 120, bollard::API_DEFAULT_VERSION)?
        };

        Ok(Self {
            docker,
            worker_id,
            shared_storage_mount,
            default_mount_label: "Z".to_string(),
        })
    }

    fn container_labels(&self, spec: &ContainerSpec) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        if let Some(worker_id) = &self.worker_id {
            labels.insert("adjutant.worker_id".to_string(), worker_id.clone());
        }
        if let Some(task_id) = spec.environment.get("KOJI_TASK_ID") {
            labels.insert("adjutant.task_id".to_string(), task_id.clone());
        }
        labels
    }

    fn build_mounts(&self, spec: &ContainerSpec) -> Vec<Mount> {
        spec.mounts
            .iter()
            .map(|m| {
                let label = m.selinux_label.clone().or_else(|| {
                    if m.target == self.shared_storage_mount {
                        Some(self.default_mount_label.clone())
                    } else {
                        None
                    }
                });

                Mount {
                    target: Some(m.target.to_string_lossy().to_string()),
                    source: Some(m.source.to_string_lossy().to_string()),
                    typ: Some(MountTypeEnum::BIND),
                    read_only: Some(m.read_only),
                    bind_options: label.map(|l| bollard::models::MountBindOptions {
                        selinux_relabel: match l.as_str() {
                            "z" => Some(bollard::models::MountBindOptionsSelinuxRelabelEnum::SHARED),
                            _ => Some(bollard::models::MountBindOptionsSelinuxRelabelEnum::PRIVATE),
                        },
                        ..Default::default()
                    }),
                    ..Default::default()
                }
            })
            .collect()
    }

    async fn wait_for_exit(&self, container: &str) -> ContainerResult<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(container, Some(options));
        match stream.next().await {
            Some(Ok(result)) => Ok(result.status_code),
            Some(Err(e)) => Err(ContainerError::Docker(e)),
            None => Ok(1),
        }
    }

    /// Spawn reader+writer workers pumping `output` into `sink` through a
    /// bounded drop-oldest queue, demultiplexing stdout/stderr.
    fn pump_output(
        mut output: impl futures_util::Stream<Item = Result<LogOutput, bollard::errors::Error>> + Unpin + Send + 'static,
        sink: Arc<dyn LogSink>,
    ) -> tokio::task::JoinHandle<()> {
        let queue: Arc<Mutex<VecDeque<LogOutput>>> = Arc::new(Mutex::new(VecDeque::with_capacity(LOG_QUEUE_CAPACITY)));
        let notify = Arc::new(Notify::new());
        let done = Arc::new(Mutex::new(false));

        let writer_queue = queue.clone();
        let writer_notify = notify.clone();
        let writer_done = done.clone();
        let writer = tokio::spawn(async move {
            loop {
                let item = {
                    let mut q = writer_queue.lock();
                    q.pop_front()
                };

                match item {
                    Some(chunk) => match chunk {
                        LogOutput::StdOut { message } => sink.write_stdout(&message),
                        LogOutput::Console { message } => sink.write_stdout(&message),
                        LogOutput::StdErr { message } => sink.write_stderr(&message),
                        LogOutput::StdIn { .. } => {}
                    },
                    None => {
                        if *writer_done.lock() {
                            break;
                        }
                        writer_notify.notified().await;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(item) = output.next().await {
                match item {
                    Ok(chunk) => {
                        let mut q = queue.lock();
                        if q.len() >= LOG_QUEUE_CAPACITY {
                            q.pop_front();
                        }
                        q.push_back(chunk);
                        drop(q);
                        notify.notify_one();
                    }
                    Err(e) => {
                        warn!("log stream error: {}", e);
                        break;
                    }
                }
            }
            *done.lock() = true;
            notify.notify_one();
            let _ = writer.await;
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ensure_image_available(
        &self,
        image: &str,
        policy: PullPolicy,
        pull_timeout: Duration,
    ) -> ContainerResult<()> {
        let exists = self.docker.inspect_image(image).await.is_ok();

        match policy {
            PullPolicy::Never => {
                if exists {
                    Ok(())
                } else {
                    Err(ContainerError::ImageUnavailable(image.to_string()))
                }
            }
            PullPolicy::IfNotPresent if exists => Ok(()),
            PullPolicy::IfNotPresent | PullPolicy::Always => {
                let start = std::time::Instant::now();
                const RETRY_BACKOFF: Duration = Duration::from_secs(1);

                loop {
                    let options = CreateImageOptions {
                        from_image: image,
                        ..Default::default()
                    };

                    let pull = async {
                        let mut stream = self.docker.create_image(Some(options), None, None);
                        while let Some(result) = stream.next().await {
                            match result {
                                Ok(info) => {
                                    if let Some(status) = info.status {
                                        debug!("pull {}: {}", image, status);
                                    }
                                }
                                Err(e) => return Err(ContainerError::Docker(e)),
                            }
                        }
                        Ok(())
                    };

                    let elapsed = start.elapsed();
                    if elapsed >= pull_timeout {
                        break Err(ContainerError::ImagePullTimeout {
                            image: image.to_string(),
                            elapsed_secs: elapsed.as_secs(),
                        });
                    }

                    match tokio::time::timeout(pull_timeout - elapsed, pull).await {
                        Ok(Ok(())) => {
                            info!("pulled image {} in {:?}", image, start.elapsed());
                            break Ok(());
                        }
                        Ok(Err(e)) => {
                            if start.elapsed() >= pull_timeout {
                                break Err(ContainerError::ImagePullTimeout {
                                    image: image.to_string(),
                                    elapsed_secs: start.elapsed().as_secs(),
                                });
                            }
                            warn!("pull attempt for {} failed, retrying: {}", image, e);
                            tokio::time::sleep(RETRY_BACKOFF).await;
                        }
                        Err(_) => {
                            break Err(ContainerError::ImagePullTimeout {
                                image: image.to_string(),
                                elapsed_secs: pull_timeout.as_secs(),
                            });
                        }
                    }
                }
            }
        }
    }

    async fn create(&self, spec: &ContainerSpec) -> ContainerResult<ContainerHandle> {
        let env_vars: Vec<String> = spec
            .environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = HostConfig {
            mounts: Some(self.build_mounts(spec)),
            memory: spec.limits.as_ref().and_then(|l| l.memory_bytes),
            cpu_quota: spec.limits.as_ref().and_then(|l| l.cpu_quota),
            cpu_period: spec.limits.as_ref().map(|_| 100_000),
            pids_limit: spec.limits.as_ref().and_then(|l| l.pids_limit),
            cpuset_cpus: spec.limits.as_ref().and_then(|l| l.cpuset.clone()),
            network_mode: Some(if spec.network_enabled {
                "bridge".to_string()
            } else {
                "none".to_string()
            }),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            ..Default::default()
        };

        let user = match (spec.user_id, spec.group_id) {
            (Some(u), Some(g)) => Some(format!("{}:{}", u, g)),
            (Some(u), None) => Some(u.to_string()),
            _ => None,
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            env: Some(env_vars),
            user,
            working_dir: spec.workdir.as_ref().map(|p| p.to_string_lossy().to_string()),
            labels: Some(self.container_labels(spec)),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let result = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;

        Ok(ContainerHandle(result.id))
    }

    async fn start(&self, handle: &ContainerHandle, timeout: Duration) -> ContainerResult<()> {
        let start = async {
            self.docker
                .start_container(handle.as_str(), None::<StartContainerOptions<String>>)
                .await
        };

        match tokio::time::timeout(timeout, start).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ContainerError::Docker(e)),
            Err(_) => Err(ContainerError::ContainerStartTimeout(handle.to_string())),
        }
    }

    async fn wait(&self, handle: &ContainerHandle) -> ContainerResult<i64> {
        self.wait_for_exit(handle.as_str()).await
    }

    async fn remove(
        &self,
        handle: &ContainerHandle,
        force: bool,
        stop_grace: Duration,
    ) -> ContainerResult<()> {
        if !force {
            let _ = tokio::time::timeout(
                stop_grace,
                self.docker
                    .stop_container(handle.as_str(), Some(StopContainerOptions { t: stop_grace.as_secs() as i64 })),
            )
            .await;
        }

        let options = RemoveContainerOptions {
            force: true,
            v: false,
            ..Default::default()
        };

        match self.docker.remove_container(handle.as_str(), Some(options)).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(ContainerError::ContainerRemoveFailed(handle.to_string(), e.to_string())),
        }
    }

    async fn stream_logs(
        &self,
        handle: &ContainerHandle,
        sink: Arc<dyn LogSink>,
        follow: bool,
    ) -> ContainerResult<()> {
        let options = LogsOptions::<String> {
            follow,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let stream = self.docker.logs(handle.as_str(), Some(options));
        Self::pump_output(stream, sink);
        Ok(())
    }

    async fn exec(
        &self,
        handle: &ContainerHandle,
        command: &[String],
        sink: Arc<dyn LogSink>,
        env: Option<&HashMap<String, String>>,
    ) -> ContainerResult<i64> {
        let env_vec = env.map(|e| e.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>());

        let create_opts = CreateExecOptions {
            cmd: Some(command.to_vec()),
            env: env_vec,
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.docker.create_exec(handle.as_str(), create_opts).await?;

        match self.docker.start_exec(&exec.id, None::<StartExecOptions>).await? {
            StartExecResults::Attached { output, .. } => {
                let handle = Self::pump_output(output, sink);
                let _ = handle.await;
            }
            StartExecResults::Detached => {}
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok(inspect.exit_code.unwrap_or(1))
    }

    async fn exec_capture(
        &self,
        handle: &ContainerHandle,
        command: &[String],
    ) -> ContainerResult<(i64, Vec<u8>)> {
        let create_opts = CreateExecOptions {
            cmd: Some(command.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.docker.create_exec(handle.as_str(), create_opts).await?;
        let mut captured = Vec::new();

        if let StartExecResults::Attached { mut output, .. } = self.docker.start_exec(&exec.id, None::<StartExecOptions>).await? {
            while let Some(chunk) = output.next().await {
                match chunk? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        captured.extend_from_slice(&message);
                    }
                    _ => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok((inspect.exit_code.unwrap_or(1), captured))
    }

    async fn copy_to(
        &self,
        handle: &ContainerHandle,
        src_file: &Path,
        dest_path: &Path,
    ) -> ContainerResult<()> {
        let metadata = tokio::fs::metadata(src_file).await.map_err(ContainerError::Io)?;
        if !metadata.is_file() {
            return Err(ContainerError::InvalidArgument(format!(
                "copy_to source is not a regular file: {}",
                src_file.display()
            )));
        }

        let member_name = dest_path
            .file_name()
            .ok_or_else(|| ContainerError::InvalidArgument("copy_to destination has no file name".to_string()))?
            .to_string_lossy()
            .to_string();

        let dest_dir = dest_path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "/".to_string());

        let data = tokio::fs::read(src_file).await.map_err(ContainerError::Io)?;

        let mode = std::os::unix::fs::PermissionsExt::mode(&metadata.permissions());

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder
            .append_data(&mut header, &member_name, data.as_slice())
            .map_err(ContainerError::Io)?;
        let archive = builder.into_inner().map_err(ContainerError::Io)?;

        let options = UploadToContainerOptions {
            path: dest_dir,
            ..Default::default()
        };

        self.docker
            .upload_to_container(handle.as_str(), Some(options), archive.into())
            .await?;

        Ok(())
    }

    async fn run(
        &self,
        spec: &ContainerSpec,
        sink: Arc<dyn LogSink>,
        attach: bool,
        pull_policy: PullPolicy,
        timeouts: &RuntimeTimeouts,
    ) -> ContainerResult<ContainerRunResult> {
        self.ensure_image_available(&spec.image, pull_policy, timeouts.pull).await?;

        let handle = self.create(spec).await?;
        let started_at = Utc::now();

        let result = async {
            if attach {
                let attach_opts = AttachContainerOptions::<String> {
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    ..Default::default()
                };
                let AttachContainerResults { output, mut input } =
                    self.docker.attach_container(handle.as_str(), Some(attach_opts)).await?;
                let _ = input.shutdown().await;
                Self::pump_output(output, sink.clone());
            }

            self.start(&handle, timeouts.start).await?;
            let exit_code = self.wait(&handle).await?;
            Ok::<i64, ContainerError>(exit_code)
        }
        .await;

        let exit_code = match result {
            Ok(code) => code,
            Err(e) => {
                let _ = self.remove(&handle, true, timeouts.stop_grace).await;
                return Err(e);
            }
        };

        let finished_at = Utc::now();

        if spec.remove_after_exit {
            self.remove(&handle, true, timeouts.stop_grace).await?;
        }

        Ok(ContainerRunResult {
            handle,
            exit_code,
            started_at,
            finished_at,
        })
    }
}
