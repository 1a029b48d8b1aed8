//! Durable checkpoint storage: one JSON file per job under a checkpoint
//! directory, written atomically (temp file + rename) and rate-limited so a
//! busy tree replication doesn't fsync on every tag.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::{FreightlinerError, FreightlinerResult};
use crate::types::Checkpoint;

const MIN_WRITE_INTERVAL: Duration = Duration::from_secs(1);

/// Reads and writes [`Checkpoint`] files under one directory.
pub struct CheckpointStore {
    dir: PathBuf,
    last_write: Mutex<Option<Instant>>,
}

impl CheckpointStore {
    /// Opens a store rooted at `dir`. The directory is not created until
    /// the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_write: Mutex::new(None),
        }
    }

    fn path_for(&self, job_id: uuid::Uuid) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }

    /// Loads the checkpoint for `job_id`.
    pub async fn load(&self, job_id: uuid::Uuid) -> FreightlinerResult<Checkpoint> {
        let path = self.path_for(job_id);
        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| FreightlinerError::not_found(format!("no checkpoint for job {job_id}: {e}")))?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Writes `checkpoint` to disk, serialised by an internal mutex and
    /// atomic at the filesystem level (write to `${path}.tmp`, then
    /// rename). Skipped if the last write was under a second ago and
    /// `force` is false; returns whether it actually wrote.
    pub async fn save(&self, checkpoint: &Checkpoint, force: bool) -> FreightlinerResult<bool> {
        let mut last_write = self.last_write.lock().await;
        if !force {
            if let Some(last) = *last_write {
                if last.elapsed() < MIN_WRITE_INTERVAL {
                    return Ok(false);
                }
            }
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(checkpoint.job_id);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(checkpoint)?;
        tokio::fs::write(&tmp_path, &content).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        *last_write = Some(Instant::now());
        Ok(true)
    }

    /// Lists the job IDs with a checkpoint file in this store's directory.
    pub async fn list(&self) -> FreightlinerResult<Vec<uuid::Uuid>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = job_id_from_path(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Loads one checkpoint for display; an alias of [`Self::load`] kept
    /// separate so the CLI's `checkpoint show` subcommand reads clearly.
    pub async fn show(&self, job_id: uuid::Uuid) -> FreightlinerResult<Checkpoint> {
        self.load(job_id).await
    }

    /// Removes a checkpoint file. Not an error if it's already gone.
    pub async fn delete(&self, job_id: uuid::Uuid) -> FreightlinerResult<()> {
        match tokio::fs::remove_file(self.path_for(job_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn job_id_from_path(path: &Path) -> Option<uuid::Uuid> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let checkpoint = Checkpoint::new(uuid::Uuid::new_v4());
        assert!(store.save(&checkpoint, true).await.unwrap());
        let loaded = store.load(checkpoint.job_id).await.unwrap();
        assert_eq!(loaded.job_id, checkpoint.job_id);
    }

    #[tokio::test]
    async fn unforced_save_is_rate_limited() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let checkpoint = Checkpoint::new(uuid::Uuid::new_v4());
        assert!(store.save(&checkpoint, false).await.unwrap());
        assert!(!store.save(&checkpoint, false).await.unwrap());
    }

    #[tokio::test]
    async fn list_finds_saved_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let a = Checkpoint::new(uuid::Uuid::new_v4());
        let b = Checkpoint::new(uuid::Uuid::new_v4());
        store.save(&a, true).await.unwrap();
        store.save(&b, true).await.unwrap();
        let ids = store.list().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.job_id));
        assert!(ids.contains(&b.job_id));
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let checkpoint = Checkpoint::new(uuid::Uuid::new_v4());
        store.save(&checkpoint, true).await.unwrap();
        store.delete(checkpoint.job_id).await.unwrap();
        assert!(store.load(checkpoint.job_id).await.is_err());
    }

    #[tokio::test]
    async fn list_on_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let store = CheckpointStore::new(missing);
        assert!(store.list().await.unwrap().is_empty());
    }
}
