//! Server state management.
//!
//! This module provides the [`ServerState`] type threaded through every HTTP
//! handler: one shared [`BaseClient`] covering every configured registry,
//! the in-process table tracking background tree-replication jobs, and the
//! in-process counters the `/metrics` endpoint reports.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::client::BaseClient;
use crate::tree::CheckpointStore;
use crate::types::Checkpoint;

/// Where a background `replicate-tree` job currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Running,
    Completed,
    Failed,
    Canceled,
}

/// In-memory record of a background job, kept until the process restarts.
/// [`CheckpointStore`] is the durable fallback once a job falls out of
/// this table.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub phase: JobPhase,
    pub checkpoint: Option<Checkpoint>,
    pub error: Option<String>,
}

/// Process-lifetime counters backing `/metrics`. Deliberately not
/// Prometheus-formatted; see the module doc comment.
#[derive(Default)]
pub struct Metrics {
    pub requests_served: AtomicU64,
    pub bytes_transferred: AtomicU64,
    pub active_jobs: AtomicUsize,
}

/// Shared state for every request handler.
#[derive(Clone)]
pub struct ServerState {
    client: Arc<BaseClient>,
    checkpoint_dir: PathBuf,
    jobs: Arc<RwLock<HashMap<uuid::Uuid, JobStatus>>>,
    metrics: Arc<Metrics>,
}

impl ServerState {
    /// Builds a fresh server state over `client`, checkpointing background
    /// jobs under `checkpoint_dir`.
    pub fn new(client: Arc<BaseClient>, checkpoint_dir: PathBuf) -> Self {
        Self {
            client,
            checkpoint_dir,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(Metrics::default()),
        }
    }

    pub fn client(&self) -> &Arc<BaseClient> {
        &self.client
    }

    pub fn checkpoint_dir(&self) -> &PathBuf {
        &self.checkpoint_dir
    }

    /// A fresh handle onto this server's checkpoint directory. Cheap to
    /// construct -- [`CheckpointStore`] holds no long-lived lock, only a
    /// rate-limit timestamp scoped to that handle.
    pub fn checkpoint_store(&self) -> CheckpointStore {
        CheckpointStore::new(self.checkpoint_dir.clone())
    }

    pub fn jobs(&self) -> &Arc<RwLock<HashMap<uuid::Uuid, JobStatus>>> {
        &self.jobs
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn record_request(&self) {
        self.metrics.requests_served.fetch_add(1, Ordering::Relaxed);
    }
}
