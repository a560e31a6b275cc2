//! Batch assignment orchestrator.
//!
//! Reconciles a set of local orders and a target driver against the
//! carrier's batch concept: verify every order exists upstream, bulk-upload
//! the ones that don't, wait out ingestion lag, resolve or join the batch,
//! and assign the driver with a bounded retry ladder. Every remote mutation
//! here is safe to re-run: verification, status checks and assign attempts
//! are all idempotent on the carrier side.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::domain::batch::BatchDisposition;
use crate::domain::error::SyncError;
use crate::domain::order::Order;
use crate::domain::repositories::{CredentialRepository, OrderRepository, RoutingRepository};
use crate::domain::services::{
    AssignDriverRequest, AssignmentReceipt, CarrierApi, Credential, GenerateOutcome,
    InvoiceUploader, RemoteOrder, RoutingInfo,
};
use crate::infrastructure::config::AssignmentConfig;

/// One assignment request: which orders, which driver.
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub order_ids: Vec<String>,
    pub driver_id: i64,
    pub driver_name: String,
    pub driver_lat: Option<f64>,
    pub driver_lon: Option<f64>,
    /// Explicit carrier credential; falls back to the active service
    /// account when absent.
    pub credential: Option<Credential>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AssignmentOutcome {
    pub batch_id: i64,
    pub driver_id: i64,
    pub assignment_id: i64,
    pub assigned_count: usize,
    /// True when the batch was already assigned to this driver and nothing
    /// had to be mutated.
    pub already_assigned: bool,
}

struct InvoiceCheck {
    existing: Vec<(Order, RemoteOrder)>,
    missing: Vec<Order>,
}

pub struct BatchAssignmentService<C, O, R, U, K> {
    carrier: Arc<C>,
    orders: Arc<O>,
    routing: Arc<R>,
    uploader: Arc<U>,
    credentials: Arc<K>,
    config: AssignmentConfig,
}

impl<C, O, R, U, K> BatchAssignmentService<C, O, R, U, K>
where
    C: CarrierApi + Send + Sync,
    O: OrderRepository + Send + Sync,
    R: RoutingRepository + Send + Sync,
    U: InvoiceUploader + Send + Sync,
    K: CredentialRepository + Send + Sync,
{
    pub fn new(
        carrier: Arc<C>,
        orders: Arc<O>,
        routing: Arc<R>,
        uploader: Arc<U>,
        credentials: Arc<K>,
        config: AssignmentConfig,
    ) -> Self {
        Self {
            carrier,
            orders,
            routing,
            uploader,
            credentials,
            config,
        }
    }

    /// Full pipeline: verify/upload invoices, resolve the target batch and
    /// assign the driver.
    pub async fn assign_orders(
        &self,
        request: &AssignmentRequest,
    ) -> Result<AssignmentOutcome, SyncError> {
        info!(
            driver_id = request.driver_id,
            driver_name = %request.driver_name,
            orders = request.order_ids.len(),
            "starting batch assignment"
        );

        let credential = self.resolve_credential(request.credential.clone()).await?;
        let access_token = self.carrier.authenticate(&credential).await?;

        let orders = self.orders.find_by_ids(&request.order_ids).await?;
        if orders.is_empty() {
            return Err(SyncError::NotFoundLocal);
        }

        let routing_map = self.load_routing(&orders).await?;

        // First pass tells us what the carrier already knows about.
        let check = self.check_invoices(&access_token, &orders).await;
        info!(
            existing = check.existing.len(),
            missing = check.missing.len(),
            "invoice verification finished"
        );

        if !check.missing.is_empty() {
            let first_sender = &check.missing[0].sender_name;
            let routing = routing_map
                .get(first_sender)
                .ok_or_else(|| SyncError::MissingRouting {
                    senders: vec![first_sender.clone()],
                })?;

            info!(count = check.missing.len(), "uploading missing invoices");
            self.uploader
                .upload(&check.missing, routing, &credential)
                .await?;

            // The carrier ingests uploads asynchronously; give it time
            // before the first re-verification.
            tokio::time::sleep(Duration::from_millis(self.config.upload_settle_delay_ms)).await;
        }

        // Re-verify everything; ingestion can lag past the settle delay, so
        // a bounded number of passes with a fixed gap.
        let mut verified = self.check_invoices(&access_token, &orders).await;
        let mut passes = 1;
        while !verified.missing.is_empty() && passes < self.config.verification_passes {
            debug!(
                pass = passes,
                missing = verified.missing.len(),
                "orders still missing, waiting for propagation"
            );
            tokio::time::sleep(Duration::from_millis(self.config.verify_retry_delay_ms)).await;
            verified = self.check_invoices(&access_token, &orders).await;
            passes += 1;
        }
        if !verified.missing.is_empty() {
            return Err(SyncError::NotFoundUpstream {
                order_ids: verified
                    .missing
                    .iter()
                    .map(|o| o.merchant_order_id.clone())
                    .collect(),
            });
        }
        info!("all invoices verified upstream");

        // Prefer joining an existing batch over creating a duplicate: take
        // the first non-null carrier batch id.
        let mut batch_ids = collect_batch_ids(&verified.existing);
        if batch_ids.is_empty() {
            warn!("no batch id visible yet, waiting and rechecking");
            tokio::time::sleep(Duration::from_millis(self.config.batch_recheck_delay_ms)).await;
            let final_check = self.check_invoices(&access_token, &orders).await;
            batch_ids = collect_batch_ids(&final_check.existing);
            if batch_ids.is_empty() {
                return Err(SyncError::Internal(anyhow!(
                    "invoices uploaded but no batch id assigned yet; check the carrier console"
                )));
            }
        }
        let batch_id = batch_ids[0];
        debug!(batch_id, candidates = batch_ids.len(), "resolved target batch");

        self.finish_assignment(&access_token, batch_id, request, orders.len())
            .await
    }

    /// Assigns a driver to a batch that already exists, e.g. from a retry
    /// after a stale-state reset or an operator-driven reassign.
    pub async fn assign_driver_to_batch(
        &self,
        batch_id: i64,
        driver_id: i64,
        order_ids: &[String],
        credential: Option<Credential>,
    ) -> Result<AssignmentOutcome, SyncError> {
        info!(batch_id, driver_id, "assigning driver to existing batch");

        let credential = self.resolve_credential(credential).await?;
        let access_token = self.carrier.authenticate(&credential).await?;

        let request = AssignmentRequest {
            order_ids: order_ids.to_vec(),
            driver_id,
            driver_name: String::new(),
            driver_lat: None,
            driver_lon: None,
            credential: None,
        };
        self.finish_assignment(&access_token, batch_id, &request, order_ids.len())
            .await
    }

    /// Status check, disposition handling, generate and the assign retry
    /// ladder. Batch state is fetched fresh here, never carried over from an
    /// earlier step.
    async fn finish_assignment(
        &self,
        access_token: &str,
        batch_id: i64,
        request: &AssignmentRequest,
        assigned_count: usize,
    ) -> Result<AssignmentOutcome, SyncError> {
        let snapshot = self.carrier.batch_details(access_token, batch_id).await?;
        debug!(
            batch_id,
            status = %snapshot.status,
            orders = snapshot.orders_count,
            driver = snapshot.driver_id,
            "current batch state"
        );

        match snapshot.disposition(request.driver_id) {
            BatchDisposition::DeletedOrEmpty => {
                // Reset local linkage so the next assignment builds a fresh
                // batch, and report it as its own failure class - the
                // caller's recovery (reassign) differs from a plain error.
                if !request.order_ids.is_empty() {
                    let cleared = self.orders.clear_batch(&request.order_ids).await?;
                    info!(batch_id, cleared, "cleared stale batch linkage");
                }
                Err(SyncError::StaleState {
                    batch_id,
                    status: if snapshot.is_empty() {
                        "empty".to_string()
                    } else if snapshot.found {
                        snapshot.status.clone()
                    } else {
                        "missing".to_string()
                    },
                })
            }
            BatchDisposition::AssignedSame {
                driver_id,
                assignment_id,
            } => {
                info!(batch_id, driver_id, "batch already assigned to this driver");
                self.orders
                    .link_batch(&request.order_ids, batch_id, "in_progress")
                    .await?;
                Ok(AssignmentOutcome {
                    batch_id,
                    driver_id,
                    assignment_id,
                    assigned_count,
                    already_assigned: true,
                })
            }
            BatchDisposition::AssignedOther {
                driver_id,
                driver_name,
            } => Err(SyncError::Conflict {
                batch_id,
                current_driver_id: driver_id,
                current_driver_name: driver_name,
                requested_driver_id: request.driver_id,
            }),
            BatchDisposition::Unassigned => {
                let outcome = self.carrier.generate_batch(access_token, batch_id).await?;
                if outcome == GenerateOutcome::Generated {
                    debug!(batch_id, "batch generated, waiting for settle");
                    tokio::time::sleep(Duration::from_millis(
                        self.config.generate_settle_delay_ms,
                    ))
                    .await;
                }

                let receipt = self
                    .assign_with_retries(access_token, batch_id, request)
                    .await?;

                self.orders
                    .link_batch(&request.order_ids, batch_id, "in_progress")
                    .await?;
                Ok(AssignmentOutcome {
                    batch_id,
                    driver_id: receipt.driver_id,
                    assignment_id: receipt.assignment_id,
                    assigned_count,
                    already_assigned: false,
                })
            }
        }
    }

    /// Fixed-count assign ladder, then one more status fetch: the carrier
    /// sometimes applies the assignment despite returning an error response,
    /// so the extra re-check rescues those runs. Do not remove it.
    async fn assign_with_retries(
        &self,
        access_token: &str,
        batch_id: i64,
        request: &AssignmentRequest,
    ) -> Result<AssignmentReceipt, SyncError> {
        let assign_request = AssignDriverRequest::new(
            batch_id,
            request.driver_id,
            request.driver_lat.unwrap_or(self.config.hub_lat),
            request.driver_lon.unwrap_or(self.config.hub_lon),
            self.config.assign_radius.clone(),
        );

        let mut last_error = String::from("assignment failed");
        for attempt in 1..=self.config.max_assign_attempts {
            debug!(batch_id, attempt, max = self.config.max_assign_attempts, "assign attempt");
            match self.carrier.assign_driver(access_token, &assign_request).await {
                Ok(receipt) => {
                    info!(batch_id, attempt, driver_id = receipt.driver_id, "driver assigned");
                    return Ok(receipt);
                }
                Err(err) => {
                    last_error = err.to_string();
                    warn!(batch_id, attempt, error = %last_error, "assign attempt failed");
                    if attempt < self.config.max_assign_attempts {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.assign_retry_delay_ms,
                        ))
                        .await;
                    }
                }
            }
        }

        let final_state = self.carrier.batch_details(access_token, batch_id).await?;
        if final_state.is_assigned() && final_state.driver_id == request.driver_id {
            info!(batch_id, "assignment verified successful despite error responses");
            return Ok(AssignmentReceipt {
                driver_id: final_state.driver_id,
                assignment_id: final_state.assignment_id,
            });
        }

        Err(SyncError::ExhaustedRetries {
            suggestion: suggestion_for(&last_error),
            console_url: format!(
                "{}/batch-list/{batch_id}/batch-details",
                self.config.console_url.trim_end_matches('/')
            ),
            last_error,
        })
    }

    /// Checks each order against the carrier. A failed lookup counts as
    /// missing - verification is re-run anyway, and a transient error must
    /// not fail the batch.
    async fn check_invoices(&self, access_token: &str, orders: &[Order]) -> InvoiceCheck {
        let mut existing = Vec::new();
        let mut missing = Vec::new();

        for order in orders {
            match self
                .carrier
                .search_order(access_token, &order.merchant_order_id)
                .await
            {
                Ok(Some(remote)) => {
                    debug!(merchant_order_id = %order.merchant_order_id, order_id = %remote.order_id, "invoice exists");
                    existing.push((order.clone(), remote));
                }
                Ok(None) => {
                    debug!(merchant_order_id = %order.merchant_order_id, "invoice not found");
                    missing.push(order.clone());
                }
                Err(err) => {
                    warn!(merchant_order_id = %order.merchant_order_id, error = %err, "invoice check failed, treating as missing");
                    missing.push(order.clone());
                }
            }
            tokio::time::sleep(Duration::from_millis(self.config.invoice_check_delay_ms)).await;
        }

        InvoiceCheck { existing, missing }
    }

    async fn resolve_credential(
        &self,
        explicit: Option<Credential>,
    ) -> Result<Credential, SyncError> {
        if let Some(credential) = explicit {
            return Ok(credential);
        }
        self.credentials
            .active_credential()
            .await?
            .ok_or_else(|| SyncError::Internal(anyhow!("no active carrier credential found")))
    }

    /// Loads routing metadata for every sender; any sender without a routing
    /// record aborts the request before anything is uploaded.
    async fn load_routing(
        &self,
        orders: &[Order],
    ) -> Result<HashMap<String, RoutingInfo>, SyncError> {
        let mut senders: Vec<String> = orders
            .iter()
            .map(|o| o.sender_name.clone())
            .filter(|s| !s.is_empty())
            .collect();
        senders.sort();
        senders.dedup();

        let routing_map = self.routing.routing_for_senders(&senders).await?;
        let unregistered: Vec<String> = senders
            .into_iter()
            .filter(|s| !routing_map.contains_key(s))
            .collect();
        if !unregistered.is_empty() {
            return Err(SyncError::MissingRouting {
                senders: unregistered,
            });
        }
        Ok(routing_map)
    }
}

fn collect_batch_ids(existing: &[(Order, RemoteOrder)]) -> Vec<i64> {
    let mut ids: Vec<i64> = existing
        .iter()
        .filter_map(|(_, remote)| remote.batch_id)
        .filter(|id| *id > 0)
        .collect();
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    ids
}

/// Maps the carrier's assign failure to the operator-facing recovery hint.
fn suggestion_for(last_error: &str) -> String {
    if last_error.contains("Cannot assign driver") {
        "Likely causes: the driver is offline in the carrier app, the batch is in a \
         non-assignable state, or the driver already has another active batch. Check the \
         driver's status in the carrier app or assign manually in the admin console."
            .to_string()
    } else {
        "Check the carrier admin console and assign the driver manually.".to_string()
    }
}
