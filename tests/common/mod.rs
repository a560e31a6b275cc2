//! In-memory fakes of the carrier, registry, upload and persistence seams,
//! shared by the orchestrator and pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use fleetsync::domain::batch::BatchSnapshot;
use fleetsync::domain::cancellation::CancellationToken;
use fleetsync::domain::error::SyncError;
use fleetsync::domain::order::Order;
use fleetsync::domain::partner::PartnerRecord;
use fleetsync::domain::repositories::{
    CredentialRepository, OrderRepository, PartnerMirrorRepository, RoutingRepository,
};
use fleetsync::domain::services::{
    AssignDriverRequest, AssignmentReceipt, BankDetail, CarrierApi, Credential, DriverProfile,
    GenerateOutcome, InvoiceUploader, RegistryApi, RegistryRecord, RemoteOrder, RosterEntry,
    RoutingInfo,
};

/// Scripted carrier platform. Shared state is mutated by the fakes to model
/// carrier-side effects (ingestion, assignment application).
#[derive(Default)]
pub struct FakeCarrier {
    pub remote_orders: Mutex<HashMap<String, RemoteOrder>>,
    pub batches: Mutex<HashMap<i64, BatchSnapshot>>,
    pub roster_pages: Mutex<Vec<Vec<RosterEntry>>>,
    /// When set, every roster page returns this same full page (misbehaving
    /// remote; exercises the hard page ceiling).
    pub roster_loops: Mutex<Option<Vec<RosterEntry>>>,
    /// Assign calls fail while this is > 0.
    pub assign_failures_remaining: AtomicU32,
    /// On the given (1-based) assign call, apply the assignment on the
    /// carrier side even though the response is an error.
    pub apply_despite_error_on_call: Mutex<Option<u32>>,
    pub requested_assignments: Mutex<Vec<(i64, i64)>>,
    pub last_login: Mutex<Option<String>>,
    pub search_calls: AtomicU32,
    pub roster_calls: AtomicU32,
    pub generate_calls: AtomicU32,
    pub assign_calls: AtomicU32,
    pub batch_detail_calls: AtomicU32,
}

impl FakeCarrier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_batch(&self, batch_id: i64, snapshot: BatchSnapshot) {
        self.batches.lock().unwrap().insert(batch_id, snapshot);
    }

    pub fn put_remote_order(&self, merchant_order_id: &str, remote: RemoteOrder) {
        self.remote_orders
            .lock()
            .unwrap()
            .insert(merchant_order_id.to_string(), remote);
    }

    pub fn set_roster(&self, entries: Vec<RosterEntry>, page_size: usize) {
        let pages = entries
            .chunks(page_size.max(1))
            .map(<[RosterEntry]>::to_vec)
            .collect();
        *self.roster_pages.lock().unwrap() = pages;
    }
}

#[async_trait]
impl CarrierApi for FakeCarrier {
    async fn authenticate(&self, credential: &Credential) -> Result<String, SyncError> {
        *self.last_login.lock().unwrap() = Some(credential.username.clone());
        Ok("token-1".to_string())
    }

    async fn search_order(
        &self,
        _access_token: &str,
        merchant_order_id: &str,
    ) -> Result<Option<RemoteOrder>, SyncError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .remote_orders
            .lock()
            .unwrap()
            .get(merchant_order_id)
            .cloned())
    }

    async fn batch_details(
        &self,
        _access_token: &str,
        batch_id: i64,
    ) -> Result<BatchSnapshot, SyncError> {
        self.batch_detail_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .batches
            .lock()
            .unwrap()
            .get(&batch_id)
            .cloned()
            .unwrap_or_else(BatchSnapshot::missing))
    }

    async fn generate_batch(
        &self,
        _access_token: &str,
        _batch_id: i64,
    ) -> Result<GenerateOutcome, SyncError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(GenerateOutcome::Generated)
    }

    async fn assign_driver(
        &self,
        _access_token: &str,
        request: &AssignDriverRequest,
    ) -> Result<AssignmentReceipt, SyncError> {
        let call = self.assign_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requested_assignments
            .lock()
            .unwrap()
            .push((request.batch_id, request.driver_id));

        if self.assign_failures_remaining.load(Ordering::SeqCst) > 0 {
            self.assign_failures_remaining.fetch_sub(1, Ordering::SeqCst);
            if *self.apply_despite_error_on_call.lock().unwrap() == Some(call) {
                // The carrier applied the assignment but still answered
                // with an error.
                if let Some(batch) = self.batches.lock().unwrap().get_mut(&request.batch_id) {
                    batch.driver_id = request.driver_id;
                    batch.assignment_id = 9001;
                }
            }
            return Err(SyncError::TransientUpstream {
                message: "Cannot assign driver to batch".into(),
            });
        }

        if let Some(batch) = self.batches.lock().unwrap().get_mut(&request.batch_id) {
            batch.driver_id = request.driver_id;
            batch.assignment_id = 9001;
        }
        Ok(AssignmentReceipt {
            driver_id: request.driver_id,
            assignment_id: 9001,
        })
    }

    async fn roster_page(
        &self,
        page: u32,
        _page_size: u32,
    ) -> Result<Vec<RosterEntry>, SyncError> {
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(looping) = self.roster_loops.lock().unwrap().clone() {
            return Ok(looping);
        }
        let pages = self.roster_pages.lock().unwrap();
        Ok(pages.get((page - 1) as usize).cloned().unwrap_or_default())
    }

    async fn driver_profile(
        &self,
        driver_id: i64,
        _user_id: i64,
    ) -> Result<Option<DriverProfile>, SyncError> {
        Ok(Some(DriverProfile {
            driver_id,
            national_id: format!("NID-{driver_id}"),
            ..DriverProfile::default()
        }))
    }

    async fn bank_detail(&self, user_id: i64) -> Result<Option<BankDetail>, SyncError> {
        Ok(Some(BankDetail {
            bank_name: "BCA".into(),
            account_number: format!("ACC-{user_id}"),
            account_holder: "Holder".into(),
        }))
    }
}

/// Upload fake. When `materialize_batch_id` is set, uploaded orders become
/// visible on the carrier side with that batch id - modeling asynchronous
/// ingestion that has finished by the time of the re-check.
pub struct FakeUploader {
    pub carrier: Arc<FakeCarrier>,
    pub materialize_batch_id: Option<i64>,
    pub upload_calls: AtomicU32,
}

impl FakeUploader {
    pub fn new(carrier: Arc<FakeCarrier>, materialize_batch_id: Option<i64>) -> Arc<Self> {
        Arc::new(Self {
            carrier,
            materialize_batch_id,
            upload_calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl InvoiceUploader for FakeUploader {
    async fn upload(
        &self,
        orders: &[Order],
        _routing: &RoutingInfo,
        _credential: &Credential,
    ) -> Result<(), SyncError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(batch_id) = self.materialize_batch_id {
            for order in orders {
                self.carrier.put_remote_order(
                    &order.merchant_order_id,
                    RemoteOrder {
                        order_id: format!("CO-{}", order.merchant_order_id),
                        awb_number: format!("AWB-{}", order.merchant_order_id),
                        status: "created".into(),
                        batch_id: Some(batch_id),
                    },
                );
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOrderRepo {
    pub orders: Mutex<HashMap<String, Order>>,
}

impl FakeOrderRepo {
    pub fn with_orders(orders: Vec<Order>) -> Arc<Self> {
        let repo = Self::default();
        {
            let mut map = repo.orders.lock().unwrap();
            for order in orders {
                map.insert(order.id.clone(), order);
            }
        }
        Arc::new(repo)
    }

    pub fn batch_id_of(&self, id: &str) -> Option<i64> {
        self.orders.lock().unwrap().get(id).and_then(|o| o.batch_id)
    }
}

#[async_trait]
impl OrderRepository for FakeOrderRepo {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Order>> {
        let map = self.orders.lock().unwrap();
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn link_batch(
        &self,
        ids: &[String],
        batch_id: i64,
        assignment_status: &str,
    ) -> Result<u64> {
        let mut map = self.orders.lock().unwrap();
        let mut updated = 0;
        for id in ids {
            if let Some(order) = map.get_mut(id) {
                order.batch_id = Some(batch_id);
                order.assignment_status = assignment_status.to_string();
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn clear_batch(&self, ids: &[String]) -> Result<u64> {
        let mut map = self.orders.lock().unwrap();
        let mut updated = 0;
        for id in ids {
            if let Some(order) = map.get_mut(id) {
                order.batch_id = None;
                order.assignment_status = "assigned".to_string();
                updated += 1;
            }
        }
        Ok(updated)
    }
}

pub struct FakeRouting {
    pub map: HashMap<String, RoutingInfo>,
}

impl FakeRouting {
    pub fn for_senders(senders: &[&str]) -> Arc<Self> {
        let map = senders
            .iter()
            .map(|s| {
                (
                    (*s).to_string(),
                    RoutingInfo {
                        business: 12,
                        city: 9,
                        service_type: 2,
                        hub: 59,
                    },
                )
            })
            .collect();
        Arc::new(Self { map })
    }
}

#[async_trait]
impl RoutingRepository for FakeRouting {
    async fn routing_for_senders(
        &self,
        senders: &[String],
    ) -> Result<HashMap<String, RoutingInfo>> {
        Ok(senders
            .iter()
            .filter_map(|s| self.map.get(s).map(|r| (s.clone(), *r)))
            .collect())
    }
}

pub struct FakeCredentials {
    pub credential: Option<Credential>,
}

impl FakeCredentials {
    pub fn active() -> Arc<Self> {
        Arc::new(Self {
            credential: Some(Credential {
                username: "svc-account".into(),
                password: "secret".into(),
            }),
        })
    }
}

#[async_trait]
impl CredentialRepository for FakeCredentials {
    async fn active_credential(&self) -> Result<Option<Credential>> {
        Ok(self.credential.clone())
    }
}

/// Mirror fake. Optionally cancels a token after the first upsert batch to
/// exercise the partial-save contract.
#[derive(Default)]
pub struct FakeMirror {
    pub records: Mutex<Vec<PartnerRecord>>,
    pub delete_calls: AtomicU32,
    pub upsert_calls: AtomicU32,
    pub cancel_after_first_upsert: Mutex<Option<CancellationToken>>,
}

impl FakeMirror {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl PartnerMirrorRepository for FakeMirror {
    async fn delete_all(&self) -> Result<u64> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        let deleted = records.len() as u64;
        records.clear();
        Ok(deleted)
    }

    async fn upsert_batch(&self, batch: &[PartnerRecord]) -> Result<u64> {
        let calls = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.records.lock().unwrap().extend_from_slice(batch);
        if calls == 1 {
            if let Some(token) = self.cancel_after_first_upsert.lock().unwrap().as_ref() {
                token.cancel("operator cancelled mid-run");
            }
        }
        Ok(batch.len() as u64)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.lock().unwrap().len() as u64)
    }
}

pub struct FakeRegistry {
    pub records: Vec<RegistryRecord>,
}

impl FakeRegistry {
    pub fn with_ids(national_ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            records: national_ids
                .iter()
                .map(|id| RegistryRecord {
                    national_id: (*id).to_string(),
                    plate_number: format!("B {id} XYZ"),
                    unit_brand: "Honda".into(),
                    status: "ACTIVE".into(),
                    ..RegistryRecord::default()
                })
                .collect(),
        })
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn fetch_export(&self) -> Result<Vec<RegistryRecord>, SyncError> {
        Ok(self.records.clone())
    }
}

/// Roster entries 1..=count with matching user ids.
pub fn roster_of(count: usize) -> Vec<RosterEntry> {
    (1..=count as i64)
        .map(|driver_id| RosterEntry {
            driver_id,
            user_id: driver_id + 1000,
            name: format!("Partner {driver_id}"),
            raw_status: "active".into(),
            ..RosterEntry::default()
        })
        .collect()
}

/// Orders INV-1..=INV-n from the same sender.
pub fn orders_of(count: usize, sender: &str) -> Vec<Order> {
    (1..=count)
        .map(|n| {
            let mut order = Order::new(n.to_string(), format!("INV-{n}"));
            order.sender_name = sender.to_string();
            order
        })
        .collect()
}

/// A live unassigned batch holding `orders_count` orders.
pub fn unassigned_batch(orders_count: u32) -> BatchSnapshot {
    BatchSnapshot {
        found: true,
        status: "created".into(),
        orders_count,
        ..BatchSnapshot::default()
    }
}
