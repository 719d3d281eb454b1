//! JSON file storage implementation.
//!
//! Stores each task as `tasks/<id>.json` under the storage root and keeps
//! small per-task meta markers (version + updated_at) next to an id
//! sequence in `meta/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use taskrank_core::{NewTask, Task, TaskId, TaskPatch};
use super::{Storage, StorageError, Result};
use tokio::fs;
use tracing::{debug, error};

/// Contents of `meta/sequence.json`.
#[derive(Debug, Serialize, Deserialize)]
struct Sequence {
    next_id: TaskId,
}

fn ids_exhausted() -> StorageError {
    StorageError::Other("task ids exhausted".to_string())
}

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
}

impl JsonStorage {
    /// Open storage at `root`, creating the directory layout if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("tasks")).await?;
        fs::create_dir_all(root.join("meta").join("tasks")).await?;

        Ok(Self { root })
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn task_path(&self, id: TaskId) -> PathBuf {
        self.root.join("tasks").join(format!("{}.json", id))
    }

    fn meta_path(&self, id: TaskId) -> PathBuf {
        self.root.join("meta").join("tasks").join(format!("{}.meta.json", id))
    }

    fn sequence_path(&self) -> PathBuf {
        self.root.join("meta").join("sequence.json")
    }

    /// Reserve the next task id and advance the sequence.
    ///
    /// A missing sequence file starts at 1. A corrupt one is an error, not
    /// a reset, so deleted ids are never handed out again.
    async fn next_id(&self) -> Result<TaskId> {
        let path = self.sequence_path();
        let mut next = read_json::<Sequence>(&path)
            .await?
            .map_or(TaskId::new(1), |s| s.next_id);

        // Never hand out an id whose file is still on disk.
        while fs::try_exists(self.task_path(next)).await? {
            next = next.next().ok_or_else(ids_exhausted)?;
        }

        let sequence = Sequence { next_id: next.next().ok_or_else(ids_exhausted)? };
        fs::write(&path, serde_json::to_string_pretty(&sequence)?.as_bytes()).await?;
        Ok(next)
    }

    /// Read and increment the per-task version, return the new version.
    async fn bump_version(&self, id: TaskId) -> Result<u64> {
        let path = self.meta_path(id);
        let mut version = 0u64;
        if let Ok(s) = fs::read_to_string(&path).await {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&s) {
                if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                    version = v;
                }
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        fs::write(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }

    async fn write_task(&self, task: &Task) -> Result<()> {
        let json = serde_json::to_string_pretty(task)?;
        fs::write(self.task_path(task.id), json.as_bytes()).await?;
        let version = self.bump_version(task.id).await?;
        debug!("Saved task {} (version {})", task.id, version);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = list_dir(&self.root.join("tasks")).await?;
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn load_task(&self, id: TaskId) -> Result<Option<Task>> {
        read_json(&self.task_path(id)).await
    }

    async fn create_task(&mut self, new_task: NewTask) -> Result<Task> {
        new_task.validate()?;
        let id = self.next_id().await?;
        let task = new_task.into_task(id)?;
        self.write_task(&task).await?;
        Ok(task)
    }

    async fn update_task(&mut self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        let Some(mut task) = self.load_task(id).await? else {
            return Err(StorageError::NotFound(id));
        };
        patch.apply(&mut task);
        self.write_task(&task).await?;
        Ok(task)
    }

    async fn delete_task(&mut self, id: TaskId) -> Result<()> {
        match fs::remove_file(self.task_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id));
            }
            Err(e) => return Err(e.into()),
        }
        fs::remove_file(self.meta_path(id)).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
        })?;
        debug!("Deleted task {}", id);
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        // A record that vanished between read_dir and read is skipped; one
        // that cannot be parsed fails the whole listing.
        match read_json(&path).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => {
                error!("Unreadable record {}: {}", path.display(), e);
                return Err(e);
            }
        }
    }
    Ok(items)
}
