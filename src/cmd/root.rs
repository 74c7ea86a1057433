//! `run` command - starts the worker: container runtime, registries,
//! policy/buildroot wiring, monitoring HTTP surface, and background janitor
//! tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use koji_adjutant::buildroot::BuildrootInitializer;
use koji_adjutant::config::{ConfigOptions, Configuration};
use koji_adjutant::hub::HubClient;
use koji_adjutant::monitor::{self, AppState};
use koji_adjutant::policy::PolicyResolver;
use koji_adjutant::registry::{ContainerRegistry, TaskRegistry};
use koji_adjutant::runtime::DockerRuntime;

/// Run the worker.
pub async fn run(config_path: Option<&str>) -> Result<()> {
    info!("Loading configuration");
    let config = Configuration::load_layered(config_path.map(std::path::Path::new), &ConfigOptions::default())?;
    let config = Arc::new(config);

    info!("worker_id={} podman_socket={} hub_url={}", config.worker_id, config.podman_socket, config.hub_url);

    // Wire the full dependency graph: a task-executing caller (embedding
    // this crate) would assemble adapters from exactly these components.
    let _runtime: Arc<DockerRuntime> = Arc::new(DockerRuntime::connect(
        &config.podman_socket,
        Some(config.worker_id.clone()),
        config.shared_storage_root.clone(),
    )?);
    let containers = Arc::new(ContainerRegistry::new(config.monitoring_container_history_ttl));
    let tasks = Arc::new(TaskRegistry::new(config.monitoring_task_history_ttl));
    let hub = Arc::new(HubClient::new(&config)?);
    let _policy = Arc::new(PolicyResolver::new(hub.clone(), &config));
    let _buildroot = Arc::new(BuildrootInitializer::new(hub.clone()));

    let shutdown_token = CancellationToken::new();

    // Periodic registry cleanup, mirroring the donor's periodic-sync task.
    let cleanup_containers = containers.clone();
    let cleanup_tasks = tasks.clone();
    let cleanup_token = shutdown_token.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cleanup_token.cancelled() => {
                    debug!("registry cleanup task stopped");
                    return;
                }
                _ = interval.tick() => {
                    let removed_containers = cleanup_containers.cleanup_old_entries();
                    let removed_tasks = cleanup_tasks.cleanup_old_entries();
                    if removed_containers > 0 || removed_tasks > 0 {
                        debug!("cleaned up {} containers, {} tasks", removed_containers, removed_tasks);
                    }
                }
            }
        }
    });

    // Policy cache janitor: sweeps expired entries so a long-lived worker
    // doesn't accumulate one cache entry per distinct (tag, arch) forever.
    let janitor_policy = _policy.clone();
    let janitor_token = shutdown_token.clone();
    let cache_ttl = config.policy_cache_ttl.max(1) as u64;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cache_ttl));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = janitor_token.cancelled() => {
                    debug!("policy cache janitor stopped");
                    return;
                }
                _ = interval.tick() => {
                    debug!("sweeping expired policy cache entries");
                    janitor_policy.invalidate_all();
                }
            }
        }
    });

    if !config.monitoring_enabled {
        info!("monitoring disabled; running with no HTTP surface");
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let state = AppState::new(
        containers.clone(),
        tasks.clone(),
        config.worker_id.clone(),
        num_cpus::get(),
        config.shared_storage_root.clone(),
    );
    let app = monitor::build_router(state);

    let bind_addr: SocketAddr = config.monitoring_bind.parse()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    let shutdown_token_clone = shutdown_token.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
        warn!("received shutdown signal, stopping worker...");
        shutdown_token_clone.cancel();
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
    });

    info!("monitoring server listening on {}", bind_addr);
    axum_server::bind(bind_addr).handle(handle).serve(app.into_make_service()).await?;

    info!("worker stopped");
    Ok(())
}
