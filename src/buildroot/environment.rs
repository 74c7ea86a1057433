use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// RPM macro definitions matching mock's buildroot layout, keyed without the
/// leading `%`. A `BTreeMap` keeps macro-file output order stable across runs.
pub fn generate_rpm_macros(work_dir: &Path, dist: Option<&str>) -> BTreeMap<String, String> {
    let buildroot_dir = work_dir.join("BUILDROOT");
    let dist = dist.unwrap_or(".almalinux10");

    let mut macros = BTreeMap::new();
    macros.insert("dist".to_string(), dist.to_string());
    macros.insert("_topdir".to_string(), work_dir.display().to_string());
    macros.insert("_builddir".to_string(), work_dir.join("build").display().to_string());
    macros.insert("_rpmdir".to_string(), work_dir.join("result").display().to_string());
    macros.insert("_srcrpmdir".to_string(), work_dir.join("result").display().to_string());
    macros.insert("_sourcedir".to_string(), work_dir.join("work").display().to_string());
    macros.insert("_specdir".to_string(), work_dir.join("work").display().to_string());
    macros.insert("_buildrootdir".to_string(), buildroot_dir.display().to_string());
    macros
}

/// Environment variables for build execution; callers overwrite
/// `KOJI_TASK_ID` once the real task id is known.
pub fn setup_build_environment(
    work_dir: &Path,
    task_id: i64,
    build_tag: &str,
    arch: &str,
    repo_id: i64,
    dist: Option<&str>,
) -> BTreeMap<String, String> {
    let buildroot_dir = work_dir.join("BUILDROOT");
    let build_dir = work_dir.join("build");

    let mut env = BTreeMap::new();
    env.insert("KOJI_TASK_ID".to_string(), task_id.to_string());
    env.insert("KOJI_BUILD_TAG".to_string(), build_tag.to_string());
    env.insert("KOJI_ARCH".to_string(), arch.to_string());
    env.insert("KOJI_REPO_ID".to_string(), repo_id.to_string());
    env.insert("BUILDROOT".to_string(), buildroot_dir.display().to_string());
    env.insert("RPM_BUILD_DIR".to_string(), build_dir.display().to_string());
    env.insert("_topdir".to_string(), work_dir.display().to_string());
    env.insert("LANG".to_string(), "en_US.UTF-8".to_string());
    env.insert("LC_ALL".to_string(), "en_US.UTF-8".to_string());
    env.insert("TZ".to_string(), "UTC".to_string());
    env.insert("HOME".to_string(), work_dir.display().to_string());

    for (name, value) in generate_rpm_macros(work_dir, dist) {
        env.insert(format!("RPM_{}", name), value);
    }

    env
}

/// Standard buildroot directory layout, mirroring mock's.
pub fn directory_structure(work_dir: &Path) -> Vec<PathBuf> {
    vec![
        work_dir.join("work"),
        work_dir.join("build"),
        work_dir.join("BUILDROOT"),
        work_dir.join("result"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_use_default_dist_when_unset() {
        let macros = generate_rpm_macros(Path::new("/builddir"), None);
        assert_eq!(macros.get("dist").unwrap(), ".almalinux10");
        assert_eq!(macros.get("_topdir").unwrap(), "/builddir");
    }

    #[test]
    fn environment_includes_rpm_prefixed_macros() {
        let env = setup_build_environment(Path::new("/builddir"), 42, "f39-build", "x86_64", 7, None);
        assert_eq!(env.get("KOJI_TASK_ID").unwrap(), "42");
        assert_eq!(env.get("RPM__topdir").unwrap(), "/builddir");
    }
}
