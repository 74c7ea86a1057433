use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::runtime::VolumeMount;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Exited,
    Removed,
}

#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub container_id: String,
    pub task_id: Option<i64>,
    pub image: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ContainerStatus,
    pub mounts: Vec<VolumeMount>,
    pub command: Vec<String>,
    pub user: Option<String>,
}

impl ContainerInfo {
    pub fn new(container_id: impl Into<String>, image: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            container_id: container_id.into(),
            task_id: None,
            image: image.into(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            status: ContainerStatus::Created,
            mounts: Vec::new(),
            command,
            user: None,
        }
    }
}

/// Thread-safe registry of active/recent containers, keyed by container id.
pub struct ContainerRegistry {
    entries: Mutex<HashMap<String, ContainerInfo>>,
    history_ttl: ChronoDuration,
}

impl ContainerRegistry {
    pub fn new(history_ttl_secs: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            history_ttl: ChronoDuration::seconds(history_ttl_secs),
        }
    }

    pub fn register(&self, info: ContainerInfo) {
        self.entries.lock().insert(info.container_id.clone(), info);
    }

    pub fn unregister(&self, container_id: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(container_id) {
            entry.status = ContainerStatus::Removed;
            entry.finished_at = Some(Utc::now());
        }
    }

    pub fn update_status(&self, container_id: &str, status: ContainerStatus) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(container_id) {
            entry.status = status;
            match status {
                ContainerStatus::Running if entry.started_at.is_none() => {
                    entry.started_at = Some(Utc::now());
                }
                ContainerStatus::Exited => {
                    entry.finished_at.get_or_insert(Utc::now());
                }
                _ => {}
            }
        }
    }

    pub fn get(&self, container_id: &str) -> Option<ContainerInfo> {
        self.entries.lock().get(container_id).cloned()
    }

    pub fn list_all(&self) -> Vec<ContainerInfo> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn list_active(&self) -> Vec<ContainerInfo> {
        self.entries
            .lock()
            .values()
            .filter(|c| c.status != ContainerStatus::Removed)
            .cloned()
            .collect()
    }

    /// Drop entries whose `finished_at + history_ttl < now`. Active entries
    /// (no `finished_at`) are never removed.
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
    fn register_and_get_round_trips() {
        let registry = ContainerRegistry::new(300);
        registry.register(ContainerInfo::new("c1", "alma:10", vec!["sleep".into()]));
        let found = registry.get("c1").unwrap();
        assert_eq!(found.image, "alma:10");
        assert_eq!(found.status, ContainerStatus::Created);
    }

    #[test]
    fn unregister_marks_removed_and_retains_for_ttl() {
        let registry = ContainerRegistry::new(300);
        registry.register(ContainerInfo::new("c1", "alma:10", vec![]));
        registry.unregister("c1");

        let info = registry.get("c1").unwrap();
        assert_eq!(info.status, ContainerStatus::Removed);
        assert!(info.finished_at.is_some());
        assert!(registry.list_active().is_empty());
        assert_eq!(registry.list_all().len(), 1);
    }

    #[test]
    fn cleanup_removes_only_expired_entries() {
        let registry = ContainerRegistry::new(0);
        registry.register(ContainerInfo::new("expired", "img", vec![]));
        registry.unregister("expired");

        registry.register(ContainerInfo::new("active", "img", vec![]));

        std::thread::sleep(std::time::Duration::from_millis(5));
        let removed = registry.cleanup_old_entries();

        assert_eq!(removed, 1);
        assert!(registry.get("expired").is_none());
        assert!(registry.get("active").is_some());
    }

    #[test]
    fn concurrent_registration_preserves_total_count() {
        let registry = Arc::new(ContainerRegistry::new(300));
        let producers = 8;
        let per_producer = 50;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for k in 0..per_producer {
                        registry.register(ContainerInfo::new(
                            format!("c-{}-{}", p, k),
                            "img",
                            vec![],
                        ));
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
