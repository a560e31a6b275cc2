//! Repository traits over local persistence.
//!
//! Implemented by the sqlite repositories in the infrastructure layer;
//! in-memory fakes implement them in tests.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::order::Order;
use crate::domain::partner::PartnerRecord;
use crate::domain::services::{Credential, RoutingInfo};

/// The partner mirror. Replace-all-then-upsert is the only write pattern:
/// a sync run deletes everything first, then upserts in batches.
#[async_trait]
pub trait PartnerMirrorRepository: Send + Sync {
    async fn delete_all(&self) -> Result<u64>;

    /// Upserts one batch keyed by partner id; returns how many rows were
    /// written.
    async fn upsert_batch(&self, records: &[PartnerRecord]) -> Result<u64>;

    async fn count(&self) -> Result<u64>;
}

/// Local orders with their mutable carrier linkage.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Order>>;

    /// Points the orders at a carrier batch and records the assignment
    /// progress state.
    async fn link_batch(&self, ids: &[String], batch_id: i64, assignment_status: &str)
        -> Result<u64>;

    /// Resets the carrier batch linkage so a future assignment creates a
    /// fresh batch.
    async fn clear_batch(&self, ids: &[String]) -> Result<u64>;
}

/// Service-account credentials used when the caller does not supply one.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn active_credential(&self) -> Result<Option<Credential>>;
}

/// Upload routing metadata, looked up by sender name.
#[async_trait]
pub trait RoutingRepository: Send + Sync {
    async fn routing_for_senders(&self, senders: &[String])
        -> Result<HashMap<String, RoutingInfo>>;
}
