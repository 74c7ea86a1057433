use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub task_id: i64,
    pub task_type: String,
    pub status: TaskStatus,
    pub arch: Option<String>,
    pub tag: Option<String>,
    pub srpm: Option<String>,
    pub container_id: Option<String>,
    pub log_path: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: Option<serde_json::Value>,
}

impl TaskInfo {
    pub fn new(task_id: i64, task_type: impl Into<String>) -> Self {
        Self {
            task_id,
            task_type: task_type.into(),
            status: TaskStatus::Running,
            arch: None,
            tag: None,
            srpm: None,
            container_id: None,
            log_path: None,
            started_at: Utc::now(),
            finished_at: None,
            progress: None,
        }
    }
}

/// Thread-safe registry of active/recent tasks, keyed by task id.
pub struct TaskRegistry {
    entries: Mutex<HashMap<i64, TaskInfo>>,
    history_ttl: ChronoDuration,
}

impl TaskRegistry {
    pub fn new(history_ttl_secs: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            history_ttl: ChronoDuration::seconds(history_ttl_secs),
        }
    }

    pub fn register(&self, info: TaskInfo) {
        self.entries.lock().insert(info.task_id, info);
    }

    pub fn update_status(&self, task_id: i64, status: TaskStatus) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&task_id) {
            entry.status = status;
            if status != TaskStatus::Running {
                entry.finished_at.get_or_insert(Utc::now());
            }
        }
    }

    pub fn update_container_id(&self, task_id: i64, container_id: impl Into<String>) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&task_id) {
            entry.container_id = Some(container_id.into());
        }
    }

    pub fn update_progress(&self, task_id: i64, progress: serde_json::Value) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&task_id) {
            entry.progress = Some(progress);
        }
    }

    pub fn get(&self, task_id: i64) -> Option<TaskInfo> {
        self.entries.lock().get(&task_id).cloned()
    }

    pub fn list_all(&self) -> Vec<TaskInfo> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn list_active(&self) -> Vec<TaskInfo> {
        self.entries
            .lock()
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .cloned()
            .collect()
    }

    /// Tasks that finished today (local server process time), regardless of
    /// final status — used by C9 `tasks_completed_today` (excludes failures,
    /// see `completed_today`).
    pub fn completed_today(&self) -> usize {
        let today = Utc::now().date_naive();
        self.entries
            .lock()
            .values()
            .filter(|t| {
                t.status == TaskStatus::Completed
                    && t.finished_at.map(|f| f.date_naive() == today).unwrap_or(false)
            })
            .count()
    }

    pub fn cleanup_old_entries(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, info| match info.finished_at {
            Some(finished_at) => now - finished_at < self.history_ttl,
            None => true,
        });
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn completed_today_excludes_failed_tasks() {
        let registry = TaskRegistry::new(300);

        registry.register(TaskInfo::new(1, "buildArch"));
        registry.update_status(1, TaskStatus::Completed);

        registry.register(TaskInfo::new(2, "buildArch"));
        registry.update_status(2, TaskStatus::Failed);

        registry.register(TaskInfo::new(3, "buildArch"));
        registry.update_status(3, TaskStatus::Completed);

        registry.register(TaskInfo::new(4, "createrepo"));

        assert_eq!(registry.completed_today(), 2);
        assert_eq!(registry.list_active().len(), 1);
    }

    #[test]
    fn concurrent_registration_preserves_total_count() {
        let registry = Arc::new(TaskRegistry::new(300));
        let producers = 8;
        let per_producer = 50;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for k in 0..per_producer {
                        let id = (p * per_producer + k) as i64;
                        registry.register(TaskInfo::new(id, "buildArch"));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.len(), producers * per_producer);
    }
}
