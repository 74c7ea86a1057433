//! Registries (C8): thread-safe maps of active/recent containers and tasks.
//!
//! Grounded on `original_source/monitoring/registry.py`'s RLock-guarded
//! `ContainerRegistry`/`TaskRegistry`. The donor's `server/manager.rs` uses
//! `DashMap` (striped-lock, no single critical section spanning a read+write
//! pair); this spec requires "every read and write holds the lock" as a
//! single invariant, so each registry here is a `parking_lot::Mutex<HashMap>`
//! instead — a plain mutex makes that invariant syntactically obvious rather
//! than relying on DashMap's per-shard locking to happen to be enough.

mod container;
mod task;

pub use container::{ContainerInfo, ContainerRegistry, ContainerStatus};
pub use task::{TaskInfo, TaskRegistry, TaskStatus};
