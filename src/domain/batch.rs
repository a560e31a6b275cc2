//! Observed state of a carrier-side batch.
//!
//! A batch is external: identified by an integer id, observed through the
//! details endpoint, never assumed current. Every decision that depends on
//! batch state re-reads it first.

use serde::{Deserialize, Serialize};

/// Batch statuses the carrier reports for batches that can no longer take an
/// assignment.
pub const DELETED_BATCH_STATUSES: [&str; 3] = ["deleted", "cancelled", "expired"];

/// Snapshot of a batch as last observed on the carrier platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub found: bool,
    pub status: String,
    pub orders_count: u32,
    pub driver_id: i64,
    pub driver_name: String,
    pub driver_mobile: String,
    pub assignment_id: i64,
}

/// How the orchestrator should treat a batch for a given requested driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchDisposition {
    /// Deleted/cancelled/expired upstream, observed empty, or not found at
    /// all. Local linkage must be reset before any new assignment.
    DeletedOrEmpty,
    /// Already assigned to the requested driver - idempotent success.
    AssignedSame { driver_id: i64, assignment_id: i64 },
    /// Assigned to somebody else - explicit conflict, never overwritten.
    AssignedOther { driver_id: i64, driver_name: String },
    /// Exists, holds orders, no assignment yet.
    Unassigned,
}

impl BatchSnapshot {
    /// Snapshot for a batch the carrier does not know about.
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn is_deleted(&self) -> bool {
        let status = self.status.to_lowercase();
        DELETED_BATCH_STATUSES.iter().any(|s| *s == status)
    }

    pub fn is_empty(&self) -> bool {
        self.found && self.orders_count == 0
    }

    /// A batch that cannot take an assignment anymore: deleted upstream,
    /// empty, or unknown to the carrier.
    pub fn is_stale(&self) -> bool {
        !self.found || self.is_deleted() || self.is_empty()
    }

    pub fn is_assigned(&self) -> bool {
        !self.is_stale() && self.driver_id > 0 && self.assignment_id > 0
    }

    pub fn disposition(&self, requested_driver_id: i64) -> BatchDisposition {
        if self.is_stale() {
            return BatchDisposition::DeletedOrEmpty;
        }
        if self.is_assigned() {
            if self.driver_id == requested_driver_id {
                return BatchDisposition::AssignedSame {
                    driver_id: self.driver_id,
                    assignment_id: self.assignment_id,
                };
            }
            return BatchDisposition::AssignedOther {
                driver_id: self.driver_id,
                driver_name: self.driver_name.clone(),
            };
        }
        BatchDisposition::Unassigned
    }
}
