//! Error kinds surfaced by the sync and assignment subsystem.
//!
//! Callers branch on the variant: `StaleState` prompts a reassign from
//! scratch, `Conflict` surfaces the blocking driver, `Cancelled` reports the
//! partial save count. Orchestrator-level failures must carry one of these
//! kinds, never a bare string.

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The job's cancellation token fired. `saved_count` is the number of
    /// records committed before the token was observed.
    #[error("cancelled: {reason} ({saved_count} records saved)")]
    Cancelled { reason: String, saved_count: u64 },

    /// Orders that should exist on the carrier side are still missing after
    /// the upload-and-recheck loop.
    #[error("{} order(s) still missing upstream after upload: {}", order_ids.len(), order_ids.join(", "))]
    NotFoundUpstream { order_ids: Vec<String> },

    /// None of the requested order ids resolved to local order records.
    #[error("no matching local orders found")]
    NotFoundLocal,

    /// Senders without upload routing metadata; the bulk upload cannot be
    /// parameterized without it.
    #[error("sender(s) not registered for upload routing: {}", senders.join(", "))]
    MissingRouting { senders: Vec<String> },

    /// The batch is already assigned to a different driver. Never silently
    /// overwritten.
    #[error("batch {batch_id} already assigned to driver {current_driver_id} ({current_driver_name}); requested driver {requested_driver_id}")]
    Conflict {
        batch_id: i64,
        current_driver_id: i64,
        current_driver_name: String,
        requested_driver_id: i64,
    },

    /// The batch was observed deleted/cancelled/expired or empty on the
    /// carrier side. Local linkage has been reset; the caller should assign
    /// again to create a fresh batch.
    #[error("batch {batch_id} is {status} on the carrier side; local batch linkage was reset")]
    StaleState { batch_id: i64, status: String },

    /// Network/timeout/5xx class failure, eligible for the fixed retry
    /// ladder.
    #[error("transient upstream failure: {message}")]
    TransientUpstream { message: String },

    /// The assign retry ladder ran out and the final status re-check did not
    /// show the requested driver either.
    #[error("assignment attempts exhausted: {last_error}")]
    ExhaustedRetries {
        last_error: String,
        suggestion: String,
        console_url: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Rewrites the saved-count annotation on a `Cancelled` error; any other
    /// variant passes through unchanged.
    pub fn with_saved_count(self, saved: u64) -> Self {
        match self {
            Self::Cancelled { reason, .. } => Self::Cancelled {
                reason,
                saved_count: saved,
            },
            other => other,
        }
    }
}
