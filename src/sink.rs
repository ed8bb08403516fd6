//! Append-only annotation log.
//!
//! Every submission becomes exactly one JSON line. Writes are serialized by
//! an in-process mutex and an exclusive advisory lock on the file, and each
//! line goes out in a single `write_all` on an append-mode handle, so lines
//! from concurrent sessions (or a second server process sharing the file)
//! never interleave and earlier lines are never touched.
//!
//! An append that has started always finishes, even if its caller is
//! dropped, because the blocking write runs on its own thread. Callers that
//! advance a counter after a successful append must do so on a task that
//! outlives the request (see `api::sessions::submit`), otherwise a retry logs
//! the same task twice. Readers that still meet duplicates should keep the
//! last line per `(prolific_id, task_id)`.

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to serialize annotation: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write annotation log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt annotation at {path}:{line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Annotation writer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug)]
pub struct AnnotationSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AnnotationSink {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line.
    pub async fn append<T: Serialize>(&self, record: &T) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await?
            .map_err(|source| SinkError::Io {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!("Appended annotation to {}", self.path.display());
        Ok(())
    }

    /// Parse every line of the log. A log that does not exist yet is empty.
    pub async fn read_records<T: DeserializeOwned>(&self) -> Result<Vec<T>, SinkError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SinkError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut records = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(line).map_err(|source| SinkError::Corrupt {
                path: self.path.clone(),
                line: idx + 1,
                source,
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

fn append_line(path: &Path, line: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    FileExt::lock_exclusive(&file)?;
    let written = file.write_all(line).and_then(|_| file.flush());
    let unlocked = FileExt::unlock(&file);
    written?;
    unlocked
}
