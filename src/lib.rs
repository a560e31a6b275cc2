//! Fleetsync - carrier platform synchronization subsystem
//!
//! This crate keeps a logistics operations backend consistent with a
//! third-party carrier platform: a cancellable partner sync pipeline that
//! mirrors the carrier's driver roster locally, a batch assignment
//! orchestrator that reconciles local orders against carrier batches, and a
//! single-flight cache for expensive aggregation reads.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;

// Re-export the main entry points for easier access
pub use application::assignment::{AssignmentOutcome, AssignmentRequest, BatchAssignmentService};
pub use application::cache::SingleFlightCache;
pub use application::sync_service::{PartnerSyncService, SyncCoordinator, SyncSummary};
pub use domain::cancellation::CancellationToken;
pub use domain::error::SyncError;
pub use domain::sync_job::{SyncJob, SyncJobRegistry};
