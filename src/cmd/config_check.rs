//! `config check` command - loads configuration through the full priority
//! chain and reports the resolved values, without starting the worker.

use anyhow::Result;

use koji_adjutant::config::{ConfigOptions, Configuration};

pub async fn run(config_path: Option<&str>) -> Result<()> {
    let config = Configuration::load_layered(config_path.map(std::path::Path::new), &ConfigOptions::default())?;

    println!("koji-adjutant configuration");
    println!("===========================\n");
    println!("  worker_id: {}", config.worker_id);
    println!("  log_format: {:?}", config.log_format);
    println!("  task_image_default: {}", config.task_image_default);
    println!("  image_pull_policy: {:?}", config.image_pull_policy);
    println!("  network_enabled: {}", config.network_enabled);
    println!("  policy_enabled: {}", config.policy_enabled);
    println!("  policy_cache_ttl: {}s", config.policy_cache_ttl);
    println!("  buildroot_enabled: {}", config.buildroot_enabled);
    println!("  monitoring_enabled: {}", config.monitoring_enabled);
    println!("  monitoring_bind: {}", config.monitoring_bind);
    println!("  podman_socket: {}", config.podman_socket);
    println!("  shared_storage_root: {}", config.shared_storage_root.display());
    println!("  work_root: {}", config.work_root.display());
    println!("  hub_url: {}", config.hub_url);

    if !config.shared_storage_root.exists() {
        println!("\nwarning: shared_storage_root does not exist: {}", config.shared_storage_root.display());
    }
    if !config.work_root.exists() {
        println!("warning: work_root does not exist: {}", config.work_root.display());
    }

    Ok(())
}
