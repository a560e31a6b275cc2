//! In-memory sync job state and the registry that exposes cancellation.
//!
//! Jobs live only for the duration of one run; final results are what lands
//! in the mirror, so there is no job table. The registry maps job id to
//! cancellation token and is owned by whoever exposes the cancel endpoints -
//! tests instantiate their own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::cancellation::CancellationToken;

/// One live sync run: id, token and the monotonically increasing count of
/// records committed so far.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub sync_id: String,
    pub token: CancellationToken,
    saved: Arc<AtomicU64>,
    pub started_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn new() -> Self {
        Self::with_id(format!("sync_{}", Uuid::new_v4()))
    }

    pub fn with_id(sync_id: impl Into<String>) -> Self {
        Self {
            sync_id: sync_id.into(),
            token: CancellationToken::new(),
            saved: Arc::new(AtomicU64::new(0)),
            started_at: Utc::now(),
        }
    }

    /// Adds a committed batch to the saved counter and returns the new total.
    pub fn record_saved(&self, count: u64) -> u64 {
        self.saved.fetch_add(count, Ordering::SeqCst) + count
    }

    pub fn saved_count(&self) -> u64 {
        self.saved.load(Ordering::SeqCst)
    }
}

impl Default for SyncJob {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of live sync jobs, keyed by job id. Multiple concurrent jobs are
/// permitted; each owns its own token.
#[derive(Debug, Clone, Default)]
pub struct SyncJobRegistry {
    jobs: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl SyncJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, job: &SyncJob) {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.sync_id.clone(), job.token.clone());
        tracing::info!(sync_id = %job.sync_id, "registered sync job");
    }

    pub async fn deregister(&self, sync_id: &str) {
        let mut jobs = self.jobs.write().await;
        jobs.remove(sync_id);
    }

    /// Cancels one job by id. Returns false when no live job has that id.
    pub async fn cancel(&self, sync_id: &str, reason: impl Into<String>) -> bool {
        let jobs = self.jobs.read().await;
        match jobs.get(sync_id) {
            Some(token) => {
                token.cancel(reason);
                true
            }
            None => {
                tracing::warn!(sync_id, "no active sync job with this id");
                false
            }
        }
    }

    /// Cancels every live job and returns how many were cancelled.
    pub async fn cancel_all(&self, reason: impl Into<String> + Clone) -> usize {
        let mut jobs = self.jobs.write().await;
        let count = jobs.len();
        for (sync_id, token) in jobs.iter() {
            token.cancel(reason.clone());
            tracing::info!(%sync_id, "cancelled sync job");
        }
        jobs.clear();
        count
    }

    pub async fn active_ids(&self) -> Vec<String> {
        let jobs = self.jobs.read().await;
        jobs.keys().cloned().collect()
    }

    pub async fn active_count(&self) -> usize {
        let jobs = self.jobs.read().await;
        jobs.len()
    }
}
