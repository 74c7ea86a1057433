//! Log Sink (C7): fans container stdout/stderr into a line-oriented logger
//! and an append-only file under the shared-storage log root.
//!
//! Grounded on `original_source/task_adapters/logging.py`'s `FileKojiLogSink`
//! (dual destination, best-effort on both) and on the reader/writer pump
//! idiom in `environment/docker/power.rs`. The donor's `SinkPool`
//! (`tokio::sync::broadcast`) drops messages for *slow subscribers*, not the
//! eldest entry on a bounded queue — a different backpressure contract than
//! C1's drop-oldest requirement, so the bounded queue used by the runtime
//! (`runtime::docker::DockerRuntime::pump_output`) is a bespoke
//! `VecDeque`-backed construct rather than a reuse of `SinkPool`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{error, info};

/// Destination for a container's demultiplexed stdout/stderr.
pub trait LogSink: Send + Sync {
    fn write_stdout(&self, data: &[u8]);
    fn write_stderr(&self, data: &[u8]);
}

/// Default sink: tracing line-logger + append-mode log file.
pub struct FileLogSink {
    log_path: PathBuf,
    file: Mutex<Option<std::fs::File>>,
}

impl FileLogSink {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        let log_path = log_path.into();

        if let Some(parent) = log_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!("failed to create log directory {}: {}", parent.display(), e);
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                error!("failed to open log file {}: {}. continuing log-only", log_path.display(), e);
            })
            .ok();

        Self {
            log_path,
            file: Mutex::new(file),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn append(&self, data: &[u8]) {
        let mut guard = self.file.lock().unwrap();
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(data) {
                error!("failed writing to log file {}: {}", self.log_path.display(), e);
            }
            let _ = file.flush();
        }
    }

    fn log_lines(data: &[u8], is_stderr: bool) {
        let text = String::from_utf8_lossy(data);
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if is_stderr {
                error!(target: "container", "{}", line);
            } else {
                info!(target: "container", "{}", line);
            }
        }
    }
}

impl LogSink for FileLogSink {
    fn write_stdout(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        Self::log_lines(data, false);
        self.append(data);
    }

    fn write_stderr(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        Self::log_lines(data, true);
        self.append(data);
    }
}

/// In-memory sink used by tests to assert on captured output without disk IO.
#[derive(Default)]
pub struct MemoryLogSink {
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(&self) -> Vec<u8> {
        self.stdout.lock().unwrap().clone()
    }

    pub fn stderr(&self) -> Vec<u8> {
        self.stderr.lock().unwrap().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn write_stdout(&self, data: &[u8]) {
        self.stdout.lock().unwrap().extend_from_slice(data);
    }

    fn write_stderr(&self, data: &[u8]) {
        self.stderr.lock().unwrap().extend_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_collects_both_streams() {
        let sink = MemoryLogSink::new();
        sink.write_stdout(b"hello\n");
        sink.write_stderr(b"oops\n");
        assert_eq!(sink.stdout(), b"hello\n");
        assert_eq!(sink.stderr(), b"oops\n");
    }

    #[test]
    fn file_sink_persists_appended_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.log");
        let sink = FileLogSink::new(&path);
        sink.write_stdout(b"line one\n");
        sink.write_stderr(b"line two\n");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("line one"));
        assert!(contents.contains("line two"));
    }

    #[test]
    fn empty_chunks_are_ignored() {
        let sink = MemoryLogSink::new();
        sink.write_stdout(b"");
        assert!(sink.stdout().is_empty());
    }
}
