use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::hub::HubClient;

use super::dependencies::resolve_build_dependencies;
use super::environment::{directory_structure, generate_rpm_macros, setup_build_environment};
use super::error::BuildrootResult;
use super::repos::generate_repo_config;

/// Everything a task adapter needs to prepare a container for an RPM build:
/// repo/macros file bodies and destinations, init/build command lists,
/// environment, and the dependency set (kept for diagnostics).
#[derive(Debug, Clone)]
pub struct BuildrootPlan {
    pub repo_file_content: String,
    pub repo_file_dest: PathBuf,
    pub macros_file_content: String,
    pub macros_file_dest: PathBuf,
    pub init_commands: Vec<Vec<String>>,
    pub build_command: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub dependencies: Vec<String>,
    pub tag_id: i64,
    pub tag_name: String,
}

pub struct BuildrootInitializer {
    hub: Arc<HubClient>,
}

impl BuildrootInitializer {
    pub fn new(hub: Arc<HubClient>) -> Self {
        Self { hub }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn initialize(
        &self,
        srpm_path: &Path,
        tag_name: &str,
        arch: &str,
        work_dir: &Path,
        repo_id: i64,
        task_id: i64,
        dist: Option<&str>,
    ) -> BuildrootResult<BuildrootPlan> {
        let tag = self.hub.get_tag(tag_name).await.ok();
        let (tag_id, tag_name) = match tag {
            Some(tag) => (tag.id, tag.name),
            None => {
                warn!("could not resolve tag '{}' via hub; using name as-is", tag_name);
                (0, tag_name.to_string())
            }
        };

        let srpm_arg = if srpm_path.exists() { Some(srpm_path) } else { None };
        let dependencies = resolve_build_dependencies(&self.hub, &tag_name, srpm_arg).await;

        let repo_file_content = generate_repo_config(&self.hub, &tag_name, repo_id, arch, None).await?;

        let environment = setup_build_environment(work_dir, task_id, &tag_name, arch, repo_id, dist);
        let macros = generate_rpm_macros(work_dir, dist);
        let macros_file_content = format_macros_file(&macros);

        let srpm_filename = srpm_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let init_commands = generate_init_commands(work_dir, &dependencies);
        let build_command = generate_build_command(work_dir, &srpm_filename, &macros);

        Ok(BuildrootPlan {
            repo_file_content,
            repo_file_dest: PathBuf::from("/etc/yum.repos.d/koji.repo"),
            macros_file_content,
            macros_file_dest: PathBuf::from("/etc/rpm/macros.koji"),
            init_commands,
            build_command,
            environment,
            dependencies,
            tag_id,
            tag_name,
        })
    }
}

fn generate_init_commands(work_dir: &Path, dependencies: &[String]) -> Vec<Vec<String>> {
    let mut commands = Vec::new();

    let mut mkdir = vec!["mkdir".to_string(), "-p".to_string()];
    for dir in directory_structure(work_dir) {
        mkdir.push(dir.display().to_string());
    }
    commands.push(mkdir);

    if !dependencies.is_empty() {
        let mut install = vec![
            "dnf".to_string(),
            "install".to_string(),
            "-y".to_string(),
            "--setopt=install_weak_deps=False".to_string(),
            "--setopt=skip_missing_names_on_install=False".to_string(),
            "--setopt=keepcache=True".to_string(),
        ];
        install.extend(dependencies.iter().cloned());
        commands.push(install);
    }

    commands
}

fn format_macros_file(macros: &BTreeMap<String, String>) -> String {
    let mut lines: Vec<String> = macros.iter().map(|(name, value)| format!("%{} {}", name, value)).collect();
    lines.push(String::new());
    lines.join("\n")
}

fn generate_build_command(work_dir: &Path, srpm_filename: &str, macros: &BTreeMap<String, String>) -> Vec<String> {
    let srpm_path = work_dir.join("work").join(srpm_filename);
    let mut command = vec!["rpmbuild".to_string(), "--rebuild".to_string(), srpm_path.display().to_string()];

    for (name, value) in macros {
        command.push("--define".to_string());
        command.push(format!("{} {}", name, value));
    }

    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_commands_skip_dnf_step_when_no_dependencies() {
        let commands = generate_init_commands(Path::new("/builddir"), &[]);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0][0], "mkdir");
    }

    #[test]
    fn init_commands_include_dnf_step_with_dependencies() {
        let deps = vec!["gcc".to_string(), "@build".to_string()];
        let commands = generate_init_commands(Path::new("/builddir"), &deps);
        assert_eq!(commands.len(), 2);
        assert!(commands[1].contains(&"gcc".to_string()));
        assert!(commands[1].contains(&"@build".to_string()));
    }

    #[test]
    fn macros_file_ends_with_trailing_newline() {
        let mut macros = BTreeMap::new();
        macros.insert("dist".to_string(), ".almalinux10".to_string());
        let content = format_macros_file(&macros);
        assert_eq!(content, "%dist .almalinux10\n");
    }

    #[test]
    fn build_command_includes_a_define_per_macro() {
        let mut macros = BTreeMap::new();
        macros.insert("dist".to_string(), ".almalinux10".to_string());
        macros.insert("_topdir".to_string(), "/builddir".to_string());
        let command = generate_build_command(Path::new("/builddir"), "foo-1.0.src.rpm", &macros);
        assert_eq!(command[0], "rpmbuild");
        assert_eq!(command.iter().filter(|s| s.as_str() == "--define").count(), 2);
    }
}
