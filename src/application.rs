//! Application layer - pipelines, orchestration and caching
//!
//! Composes the domain service seams into the three externally visible
//! behaviors: the partner sync pipeline, the batch assignment orchestrator
//! and the single-flight cache.

pub mod assignment;
pub mod cache;
pub mod executor;
pub mod sync_service;

pub use assignment::{AssignmentOutcome, AssignmentRequest, BatchAssignmentService};
pub use cache::{CacheEntryStatus, SingleFlightCache};
pub use executor::run_windowed;
pub use sync_service::{PartnerSyncService, ProgressSink, SyncCoordinator, SyncSummary};
