//! Domain module - core entities, events and service seams
//!
//! This module contains the entities mirrored from or observed on the carrier
//! platform, the job/cancellation primitives, the progress event contract,
//! and the traits behind which the carrier, registry, upload and persistence
//! collaborators sit.

pub mod batch;
pub mod cancellation;
pub mod error;
pub mod events;
pub mod order;
pub mod partner;
pub mod repositories;
pub mod services;
pub mod sync_job;

// Re-export commonly used items for convenience
pub use batch::{BatchDisposition, BatchSnapshot, DELETED_BATCH_STATUSES};
pub use cancellation::CancellationToken;
pub use error::{SyncError, SyncResult};
pub use events::{SyncEvent, SyncEventType, SyncStage};
pub use order::Order;
pub use partner::PartnerRecord;
pub use sync_job::{SyncJob, SyncJobRegistry};
