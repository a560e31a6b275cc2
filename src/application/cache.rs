//! Single-flight read cache for expensive aggregation results.
//!
//! Keyed by logical resource name. Concurrent cache-miss callers must not
//! each re-run the expensive query: the first caller claims the per-key
//! warming flag and runs it, everyone else polls until the flag clears and
//! shares the winner's value. Entries never expire on their own; the write
//! path invalidates explicitly after a mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::error::SyncError;

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryStatus {
    pub cached: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_warming: bool,
}

#[derive(Debug)]
struct Slot<V> {
    value: Option<V>,
    last_updated: Option<DateTime<Utc>>,
    warming: bool,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            value: None,
            last_updated: None,
            warming: false,
        }
    }
}

/// Process-wide cache with per-key single-flight recompute.
///
/// All flag checks and updates happen under one async mutex, so claim /
/// release of the warming flag is race-free; the expensive compute itself
/// runs with the lock released.
#[derive(Debug, Clone)]
pub struct SingleFlightCache<V> {
    slots: Arc<Mutex<HashMap<String, Slot<V>>>>,
    poll_interval: Duration,
}

impl<V: Clone> SingleFlightCache<V> {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            poll_interval,
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let slots = self.slots.lock().await;
        slots.get(key).and_then(|slot| slot.value.clone())
    }

    pub async fn set(&self, key: &str, value: V) {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(key.to_string()).or_default();
        slot.value = Some(value);
        slot.last_updated = Some(Utc::now());
    }

    pub async fn invalidate(&self, key: &str) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(key) {
            slot.value = None;
            slot.last_updated = None;
        }
        info!(key, "cache invalidated");
    }

    pub async fn invalidate_all(&self) {
        let mut slots = self.slots.lock().await;
        for slot in slots.values_mut() {
            slot.value = None;
            slot.last_updated = None;
        }
        info!("cache fully invalidated");
    }

    pub async fn status(&self) -> HashMap<String, CacheEntryStatus> {
        let slots = self.slots.lock().await;
        slots
            .iter()
            .map(|(key, slot)| {
                (
                    key.clone(),
                    CacheEntryStatus {
                        cached: slot.value.is_some(),
                        last_updated: slot.last_updated,
                        is_warming: slot.warming,
                    },
                )
            })
            .collect()
    }

    /// Recomputes the entry for `key` through `compute`, deduplicating
    /// concurrent callers.
    ///
    /// If another caller is already warming this key, polls at the fixed
    /// interval until that warm finishes and returns its value. A failed
    /// warm clears the flag before propagating, so the key is never wedged;
    /// pollers that find the flag cleared with no value run the compute
    /// themselves.
    pub async fn warm<F, Fut>(&self, key: &str, compute: F) -> Result<V, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, SyncError>>,
    {
        let mut waited = false;
        loop {
            {
                let mut slots = self.slots.lock().await;
                let slot = slots.entry(key.to_string()).or_default();
                if !slot.warming {
                    if waited {
                        if let Some(value) = slot.value.clone() {
                            debug!(key, "warm finished elsewhere, reusing result");
                            return Ok(value);
                        }
                        // The other warm failed; fall through and claim.
                    }
                    slot.warming = true;
                    break;
                }
                waited = true;
            }
            debug!(key, "warm already in progress, polling");
            tokio::time::sleep(self.poll_interval).await;
        }

        let started = std::time::Instant::now();
        let result = compute().await;

        let mut slots = self.slots.lock().await;
        let slot = slots.entry(key.to_string()).or_default();
        slot.warming = false;
        match result {
            Ok(value) => {
                slot.value = Some(value.clone());
                slot.last_updated = Some(Utc::now());
                info!(key, elapsed_ms = started.elapsed().as_millis() as u64, "cache warmed");
                Ok(value)
            }
            Err(err) => {
                slot.value = None;
                slot.last_updated = None;
                Err(err)
            }
        }
    }
}
