//! [`CheckpointStore`]: JSON file of `key → last forwarded line`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Value written for a key whose source has never been forwarded.
const NEVER_FORWARDED: &str = "";

/// Checkpoint read back for one source key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// Nothing has been confirmed for this key yet.
    Absent,
    /// Exact text of the last confirmed line.
    Line(String),
}

impl Checkpoint {
    pub fn as_line(&self) -> Option<&str> {
        match self {
            Checkpoint::Absent => None,
            Checkpoint::Line(line) => Some(line),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Checkpoint::Absent)
    }
}

/// Filesystem-backed checkpoint persistence.
///
/// All keys share one JSON object. Every update is a read-modify-write of the
/// whole object performed under an async mutex, written to a temp file next
/// to the target and renamed over it, so a crash leaves either the old or the
/// new object on disk and never loses other keys.
pub struct CheckpointStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CheckpointStore {
    /// Create a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint for `key`.
    ///
    /// A missing file, a missing key and the empty sentinel all read as
    /// [`Checkpoint::Absent`]. An unreadable or unparseable file is an error.
    pub async fn get(&self, key: &str) -> Result<Checkpoint, StoreError> {
        let _guard = self.lock.lock().await;
        let map = self.load().await?;

        Ok(match map.get(key) {
            None => Checkpoint::Absent,
            Some(Value::String(line)) if line.as_str() == NEVER_FORWARDED => Checkpoint::Absent,
            Some(Value::String(line)) => Checkpoint::Line(line.clone()),
            Some(other) => {
                warn!(
                    key,
                    path = %self.path.display(),
                    value = %other,
                    "non-string checkpoint value, treating as absent"
                );
                Checkpoint::Absent
            }
        })
    }

    /// Record `line` as the checkpoint for `key`.
    pub async fn set(&self, key: &str, line: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await?;
        map.insert(key.to_string(), Value::String(line.to_string()));
        self.write_atomic(&map).await?;
        debug!(key, path = %self.path.display(), "checkpoint persisted");
        Ok(())
    }

    /// Mark `key` as never forwarded; the next run backfills its source.
    pub async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.set(key, NEVER_FORWARDED).await
    }

    /// Load the whole map. Caller must hold `lock`.
    async fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if data.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&data) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
            Err(e) => Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Write `map` to a temp file beside the target, then rename over it.
    async fn write_atomic(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let json = serde_json::to_vec_pretty(map)?;
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
            }
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoints".to_string());
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self
            .path
            .with_file_name(format!(".{file_name}.tmp.{}.{unique}", std::process::id()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(source) = result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(source));
        }
        self.sync_parent_dir().await.map_err(write_err)
    }

    /// Flush the directory entry so the rename itself survives power loss.
    #[cfg(unix)]
    async fn sync_parent_dir(&self) -> std::io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::File::open(dir).await?.sync_all().await
    }

    #[cfg(not(unix))]
    async fn sync_parent_dir(&self) -> std::io::Result<()> {
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
