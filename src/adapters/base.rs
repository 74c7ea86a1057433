use std::collections::HashMap;
use std::path::PathBuf;

use crate::runtime::VolumeMount;

/// Everything an adapter needs about the task it is executing, independent
/// of task-kind-specific parameters.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: i64,
    pub work_dir: PathBuf,
    pub koji_mount_root: PathBuf,
    pub environment: HashMap<String, String>,
}

impl TaskContext {
    pub fn new(task_id: i64, work_dir: PathBuf, koji_mount_root: PathBuf) -> Self {
        Self { task_id, work_dir, koji_mount_root, environment: HashMap::new() }
    }

    /// Path this task's work directory is bound to inside the container,
    /// per the `/work/<task_id>` convention every adapter uses.
    pub fn container_work_path(&self) -> String {
        format!("/work/{}", self.task_id)
    }
}

/// Standard `(koji_mount_root -> /mnt/koji, work_dir -> /work/<task_id>)`
/// mount pair every adapter starts from.
pub fn default_mounts(ctx: &TaskContext) -> Vec<VolumeMount> {
    vec![
        VolumeMount::new(ctx.koji_mount_root.clone(), "/mnt/koji", false).with_label("Z"),
        VolumeMount::new(ctx.work_dir.clone(), ctx.container_work_path(), false).with_label("Z"),
    ]
}
