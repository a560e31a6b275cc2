//! Service seams to the external collaborators.
//!
//! The orchestrator and the sync pipeline only ever see these traits; the
//! reqwest-backed clients live in the infrastructure layer and tests swap in
//! in-memory fakes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::batch::BatchSnapshot;
use crate::domain::error::SyncError;
use crate::domain::order::Order;

/// Username/password pair for the carrier panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// An order as the carrier knows it, matched by merchant order id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub order_id: String,
    pub awb_number: String,
    pub status: String,
    pub batch_id: Option<i64>,
}

/// One roster page entry, flattened from the carrier's driver-list response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterEntry {
    pub driver_id: i64,
    pub user_id: i64,
    pub name: String,
    pub phone_number: String,
    pub city: String,
    pub raw_status: String,
    pub attendance: String,
    pub bank_info_provided: bool,
    pub app_version: String,
    pub last_active: Option<DateTime<Utc>>,
    pub registered_at: Option<DateTime<Utc>>,
    pub reason: String,
}

/// Per-driver detail from the profile endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverProfile {
    pub driver_id: i64,
    pub current_lat: Option<f64>,
    pub current_lon: Option<f64>,
    pub national_id: String,
    pub license_number: String,
    pub license_expiry: String,
    pub hub_data: HashMap<String, String>,
    pub business_data: HashMap<String, String>,
}

/// Per-driver financial record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankDetail {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

/// Result of the generate call. A carrier response meaning "already
/// generated" is success, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    Generated,
    AlreadyGenerated,
}

/// Successful assignment acknowledgement from the carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentReceipt {
    pub driver_id: i64,
    pub assignment_id: i64,
}

/// Payload of the assign-driver call.
#[derive(Debug, Clone, Serialize)]
pub struct AssignDriverRequest {
    pub batch_id: i64,
    pub driver_id: i64,
    pub lat: f64,
    pub lng: f64,
    pub radius: String,
    pub allow_route_change: bool,
    pub decline_batch_before_accept: bool,
    pub accept_timer: u32,
    pub cancel_at_first_pickup: bool,
    pub cancel_timer: u32,
}

impl AssignDriverRequest {
    pub fn new(batch_id: i64, driver_id: i64, lat: f64, lng: f64, radius: String) -> Self {
        Self {
            batch_id,
            driver_id,
            lat,
            lng,
            radius,
            allow_route_change: false,
            decline_batch_before_accept: false,
            accept_timer: 0,
            cancel_at_first_pickup: false,
            cancel_timer: 0,
        }
    }
}

/// One row of the identity-registry export, keyed by national id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub national_id: String,
    pub plate_number: String,
    pub unit_brand: String,
    pub address: String,
    pub unit_out_date: String,
    pub unit_return_date: String,
    pub usage_duration: String,
    pub status: String,
}

/// Upload routing metadata looked up per sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutingInfo {
    pub business: i64,
    pub city: i64,
    pub service_type: i64,
    pub hub: i64,
}

/// Typed surface of the carrier platform's REST API.
///
/// Order/batch operations take the access token obtained from
/// `authenticate`; the roster/profile/bank endpoints ride on the standing
/// panel credential the client is configured with.
#[async_trait]
pub trait CarrierApi: Send + Sync {
    async fn authenticate(&self, credential: &Credential) -> Result<String, SyncError>;

    /// Looks an order up by merchant order id. `None` means the carrier has
    /// not ingested it (yet).
    async fn search_order(
        &self,
        access_token: &str,
        merchant_order_id: &str,
    ) -> Result<Option<RemoteOrder>, SyncError>;

    /// Fetches the current batch state. Always called fresh; never cached.
    async fn batch_details(
        &self,
        access_token: &str,
        batch_id: i64,
    ) -> Result<BatchSnapshot, SyncError>;

    async fn generate_batch(
        &self,
        access_token: &str,
        batch_id: i64,
    ) -> Result<GenerateOutcome, SyncError>;

    async fn assign_driver(
        &self,
        access_token: &str,
        request: &AssignDriverRequest,
    ) -> Result<AssignmentReceipt, SyncError>;

    /// One page of the driver roster. A page shorter than `page_size` is the
    /// last one.
    async fn roster_page(&self, page: u32, page_size: u32)
        -> Result<Vec<RosterEntry>, SyncError>;

    async fn driver_profile(
        &self,
        driver_id: i64,
        user_id: i64,
    ) -> Result<Option<DriverProfile>, SyncError>;

    async fn bank_detail(&self, user_id: i64) -> Result<Option<BankDetail>, SyncError>;
}

/// Identity-registry export, fetched once per sync run and matched in
/// memory.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn fetch_export(&self) -> Result<Vec<RegistryRecord>, SyncError>;
}

/// Bulk invoice upload collaborator. Opaque: takes the orders to upload plus
/// routing metadata and a credential pair, builds the spreadsheet payload
/// itself, and either succeeds or fails as a whole.
#[async_trait]
pub trait InvoiceUploader: Send + Sync {
    async fn upload(
        &self,
        orders: &[Order],
        routing: &RoutingInfo,
        credential: &Credential,
    ) -> Result<(), SyncError>;
}
