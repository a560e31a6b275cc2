//! Partner sync pipeline.
//!
//! Pages through the carrier's driver roster, enriches every entry with the
//! per-driver profile and bank detail under a fixed concurrency window,
//! matches national ids against the identity-registry export, and replaces
//! the local mirror. The mirror is deleted before the first write, so a
//! cancelled run leaves an empty or partially populated mirror - never a mix
//! of old and new rows. Downstream read caches must be refreshed after every
//! run, successful or not.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use crate::application::executor::run_windowed;
use crate::domain::error::SyncError;
use crate::domain::events::{SyncEvent, SyncStage};
use crate::domain::partner::{display_status, format_date_time, format_id_name_map, PartnerRecord};
use crate::domain::repositories::PartnerMirrorRepository;
use crate::domain::services::{BankDetail, CarrierApi, DriverProfile, RegistryApi, RegistryRecord, RosterEntry};
use crate::domain::sync_job::{SyncJob, SyncJobRegistry};
use crate::infrastructure::config::SyncConfig;

/// Channel end the pipeline pushes progress events into. A gone receiver
/// never stops the run; events are simply dropped.
pub type ProgressSink = mpsc::UnboundedSender<SyncEvent>;

/// Outcome of a completed sync run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncSummary {
    pub total_fetched: usize,
    pub total_saved: u64,
    pub registry_matches: u64,
    pub duration_ms: u64,
}

pub struct PartnerSyncService<C, G, M> {
    carrier: Arc<C>,
    registry: Arc<G>,
    mirror: Arc<M>,
    config: SyncConfig,
}

impl<C, G, M> PartnerSyncService<C, G, M>
where
    C: CarrierApi + Send + Sync + 'static,
    G: RegistryApi + Send + Sync,
    M: PartnerMirrorRepository + Send + Sync,
{
    pub fn new(carrier: Arc<C>, registry: Arc<G>, mirror: Arc<M>, config: SyncConfig) -> Self {
        Self {
            carrier,
            registry,
            mirror,
            config,
        }
    }

    /// Runs one full sync. On cancellation the error carries the number of
    /// records already committed - reported honestly, not hidden.
    pub async fn run(&self, job: &SyncJob, sink: &ProgressSink) -> Result<SyncSummary, SyncError> {
        let started = Instant::now();
        info!(sync_id = %job.sync_id, "starting partner sync");

        match self.run_inner(job, sink, started).await {
            Ok(summary) => {
                info!(
                    sync_id = %job.sync_id,
                    saved = summary.total_saved,
                    fetched = summary.total_fetched,
                    registry_matches = summary.registry_matches,
                    duration_ms = summary.duration_ms,
                    "partner sync completed"
                );
                Ok(summary)
            }
            Err(err) => {
                let err = err.with_saved_count(job.saved_count());
                if err.is_cancelled() {
                    warn!(sync_id = %job.sync_id, saved = job.saved_count(), "partner sync cancelled");
                } else {
                    error!(sync_id = %job.sync_id, error = %err, "partner sync failed");
                }
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        job: &SyncJob,
        sink: &ProgressSink,
        started: Instant,
    ) -> Result<SyncSummary, SyncError> {
        job.token.check()?;
        emit(
            sink,
            SyncEvent::progress(&job.sync_id, SyncStage::Init, "Initializing sync process...", 0),
        );

        let roster = self.fetch_roster(job, sink).await?;
        job.token.check()?;
        info!(total = roster.len(), "roster fetched from the carrier");

        emit(
            sink,
            SyncEvent::progress(
                &job.sync_id,
                SyncStage::RegistryFetch,
                "Fetching identity-registry export...",
                20,
            ),
        );
        let export = self.registry.fetch_export().await?;
        job.token.check()?;
        info!(records = export.len(), "registry export fetched");

        emit(
            sink,
            SyncEvent::progress(
                &job.sync_id,
                SyncStage::Validation,
                "Validating and transforming data...",
                30,
            ),
        );
        let total = roster.len();

        // Deletion strictly precedes any new write; from here on the mirror
        // is incomplete until this run reports completion.
        job.token.check()?;
        self.mirror.delete_all().await?;
        info!("cleared existing partner mirror");

        emit(
            sink,
            SyncEvent::progress(
                &job.sync_id,
                SyncStage::Processing,
                "Processing partner profiles...",
                35,
            ),
        );

        let batch_size = self.config.batch_size.max(1);
        let mut processed = 0usize;
        let mut registry_matches = 0u64;

        for (index, chunk) in roster.chunks(batch_size).enumerate() {
            job.token.check()?;
            debug!(batch = index + 1, size = chunk.len(), "enriching batch");

            let enriched = self.enrich_batch(job, chunk).await;
            job.token.check()?;

            let mut records: Vec<PartnerRecord> =
                enriched.into_iter().flatten().flatten().collect();
            for record in &mut records {
                if apply_registry_match(record, &export) {
                    registry_matches += 1;
                }
            }

            if !records.is_empty() {
                match self.mirror.upsert_batch(&records).await {
                    Ok(written) => {
                        let saved = job.record_saved(written);
                        debug!(batch = index + 1, written, saved, "mirror batch saved");
                    }
                    // A failed batch write skips that batch, it does not
                    // abort the run.
                    Err(err) => error!(batch = index + 1, error = %err, "mirror batch save failed"),
                }
            }

            processed += chunk.len();
            let percentage =
                (35.0 + (processed as f64 / total.max(1) as f64) * 60.0).round() as u8;
            emit(
                sink,
                SyncEvent::saving(
                    &job.sync_id,
                    format!("Saving data: {processed}/{total} records processed..."),
                    percentage,
                    job.saved_count(),
                ),
            );

            if processed < total {
                tokio::time::sleep(Duration::from_millis(self.config.inter_batch_delay_ms)).await;
            }
        }

        job.token.check()?;
        emit(
            sink,
            SyncEvent::progress(
                &job.sync_id,
                SyncStage::Finalizing,
                "Finalizing sync process...",
                95,
            ),
        );

        Ok(SyncSummary {
            total_fetched: total,
            total_saved: job.saved_count(),
            registry_matches,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Pages through the roster until a short/empty page, the hard page
    /// ceiling, a page failure (partial results are kept) or cancellation.
    async fn fetch_roster(
        &self,
        job: &SyncJob,
        sink: &ProgressSink,
    ) -> Result<Vec<RosterEntry>, SyncError> {
        job.token.check()?;
        emit(
            sink,
            SyncEvent::progress(
                &job.sync_id,
                SyncStage::RosterFetch,
                "Fetching partner roster from the carrier...",
                5,
            ),
        );

        let mut all = Vec::new();
        let page_size = self.config.page_size;
        let mut page = 1u32;

        while page <= self.config.max_pages {
            if job.token.is_cancelled() {
                warn!(page, "roster pagination stopped by cancellation");
                break;
            }

            match self.carrier.roster_page(page, page_size).await {
                Ok(entries) => {
                    if entries.is_empty() {
                        break;
                    }
                    let short_page = (entries.len() as u32) < page_size;
                    all.extend(entries);

                    let percentage = (5 + page / 2).min(15) as u8;
                    emit(
                        sink,
                        SyncEvent::progress(
                            &job.sync_id,
                            SyncStage::RosterFetch,
                            format!("Fetched {} partners from the carrier...", all.len()),
                            percentage,
                        ),
                    );

                    if short_page {
                        break;
                    }
                    page += 1;
                    tokio::time::sleep(Duration::from_millis(self.config.inter_page_delay_ms))
                        .await;
                }
                Err(err) => {
                    warn!(page, error = %err, "roster page failed, keeping partial results");
                    break;
                }
            }
        }

        Ok(all)
    }

    /// Fetches profile + bank detail for one mirror batch under the
    /// concurrency window. Entries whose profile is unavailable produce no
    /// record.
    async fn enrich_batch(
        &self,
        job: &SyncJob,
        chunk: &[RosterEntry],
    ) -> Vec<Option<Option<PartnerRecord>>> {
        let carrier = Arc::clone(&self.carrier);
        run_windowed(
            chunk.to_vec(),
            self.config.concurrent_requests,
            &job.token,
            move |entry| {
                let carrier = Arc::clone(&carrier);
                async move {
                    let Some(profile) =
                        carrier.driver_profile(entry.driver_id, entry.user_id).await?
                    else {
                        return Ok(None);
                    };
                    // A missing bank block is not an error; the record just
                    // stays blank there.
                    let bank = carrier.bank_detail(entry.user_id).await.unwrap_or_default();
                    Ok(Some(build_partner_record(&entry, &profile, bank.as_ref())))
                }
            },
        )
        .await
    }
}

fn emit(sink: &ProgressSink, event: SyncEvent) {
    // The subscriber may have disconnected; the run continues regardless.
    let _ = sink.send(event);
}

fn build_partner_record(
    entry: &RosterEntry,
    profile: &DriverProfile,
    bank: Option<&BankDetail>,
) -> PartnerRecord {
    PartnerRecord {
        partner_id: entry.driver_id.to_string(),
        name: entry.name.clone(),
        phone_number: entry.phone_number.clone(),
        city: entry.city.clone(),
        status: display_status(&entry.raw_status),
        attendance: entry.attendance.clone(),
        bank_info_provided: entry.bank_info_provided,
        app_version: entry.app_version.clone(),
        last_active: format_date_time(entry.last_active),
        registered_at: format_date_time(entry.registered_at),
        hubs: format_id_name_map(&profile.hub_data),
        businesses: format_id_name_map(&profile.business_data),
        reason: entry.reason.clone(),
        current_lat: profile.current_lat,
        current_lon: profile.current_lon,
        national_id: profile.national_id.clone(),
        license_number: profile.license_number.clone(),
        license_expiry: profile.license_expiry.clone(),
        bank_name: bank.map(|b| b.bank_name.clone()).unwrap_or_default(),
        bank_account_holder: bank.map(|b| b.account_holder.clone()).unwrap_or_default(),
        bank_account_number: bank.map(|b| b.account_number.clone()).unwrap_or_default(),
        updated_at: Utc::now(),
        ..PartnerRecord::default()
    }
}

/// Copies the registry lifecycle block onto the record when its national id
/// has an exact (trimmed) match in the export. No match is not an error.
fn apply_registry_match(record: &mut PartnerRecord, export: &[RegistryRecord]) -> bool {
    let national_id = record.national_id.trim();
    if national_id.is_empty() || national_id == "-" {
        return false;
    }
    let Some(matched) = export
        .iter()
        .find(|row| row.national_id.trim() == national_id)
    else {
        return false;
    };

    record.registry_status = matched.status.clone();
    record.registry_plate_number = matched.plate_number.clone();
    record.registry_unit_brand = matched.unit_brand.clone();
    record.registry_address = matched.address.clone();
    record.registry_unit_out_date = matched.unit_out_date.clone();
    record.registry_unit_return_date = matched.unit_return_date.clone();
    record.registry_usage_duration = matched.usage_duration.clone();
    record.registry_matched_at = Some(Utc::now());
    true
}

/// Owns the job registry and spawns sync runs, handing the caller the event
/// stream to drain. The stream closes after the terminal event because the
/// sender is dropped with the finished task.
pub struct SyncCoordinator<C, G, M> {
    service: Arc<PartnerSyncService<C, G, M>>,
    registry: SyncJobRegistry,
}

impl<C, G, M> SyncCoordinator<C, G, M>
where
    C: CarrierApi + Send + Sync + 'static,
    G: RegistryApi + Send + Sync + 'static,
    M: PartnerMirrorRepository + Send + Sync + 'static,
{
    pub fn new(service: PartnerSyncService<C, G, M>, registry: SyncJobRegistry) -> Self {
        Self {
            service: Arc::new(service),
            registry,
        }
    }

    pub fn registry(&self) -> &SyncJobRegistry {
        &self.registry
    }

    /// Starts a sync in the background and returns its id plus the event
    /// stream.
    pub async fn start(&self) -> (String, UnboundedReceiverStream<SyncEvent>) {
        let job = SyncJob::new();
        let sync_id = job.sync_id.clone();
        self.registry.register(&job).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let service = Arc::clone(&self.service);
        let registry = self.registry.clone();

        tokio::spawn(async move {
            match service.run(&job, &tx).await {
                Ok(summary) => {
                    let _ = tx.send(SyncEvent::complete(
                        &job.sync_id,
                        format!(
                            "Sync completed: {}/{} records saved",
                            summary.total_saved, summary.total_fetched
                        ),
                    ));
                }
                Err(SyncError::Cancelled {
                    reason,
                    saved_count,
                }) => {
                    let _ = tx.send(SyncEvent::cancelled(&job.sync_id, &reason, saved_count));
                }
                Err(err) => {
                    let _ = tx.send(SyncEvent::error(&job.sync_id, err.to_string()));
                }
            }
            registry.deregister(&job.sync_id).await;
        });

        (sync_id, UnboundedReceiverStream::new(rx))
    }

    /// Cancels one run by id.
    pub async fn cancel(&self, sync_id: &str, reason: &str) -> bool {
        self.registry.cancel(sync_id, reason).await
    }

    /// Cancels every live run, returning how many were cancelled.
    pub async fn cancel_all(&self, reason: &str) -> usize {
        self.registry.cancel_all(reason).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(driver_id: i64) -> RosterEntry {
        RosterEntry {
            driver_id,
            user_id: driver_id + 1000,
            name: "Partner".into(),
            raw_status: "active".into(),
            ..RosterEntry::default()
        }
    }

    fn profile(national_id: &str) -> DriverProfile {
        DriverProfile {
            driver_id: 1,
            national_id: national_id.into(),
            hub_data: HashMap::from([("5".to_string(), "North Hub".to_string())]),
            ..DriverProfile::default()
        }
    }

    #[test]
    fn record_merges_roster_profile_and_bank() {
        let bank = BankDetail {
            bank_name: "BCA".into(),
            account_number: "123".into(),
            account_holder: "Partner".into(),
        };
        let record = build_partner_record(&entry(7), &profile(" 317301 "), Some(&bank));

        assert_eq!(record.partner_id, "7");
        assert_eq!(record.status, "Active");
        assert_eq!(record.hubs, "North Hub (5)");
        assert_eq!(record.bank_name, "BCA");
        assert_eq!(record.registry_status, "");
        assert!(record.registry_matched_at.is_none());
    }

    #[test]
    fn registry_match_copies_lifecycle_block() {
        let mut record = build_partner_record(&entry(7), &profile(" 317301 "), None);
        let export = vec![RegistryRecord {
            national_id: "317301".into(),
            plate_number: "B 1234 XYZ".into(),
            unit_brand: "Honda".into(),
            status: "ACTIVE".into(),
            ..RegistryRecord::default()
        }];

        assert!(apply_registry_match(&mut record, &export));
        assert_eq!(record.registry_plate_number, "B 1234 XYZ");
        assert_eq!(record.registry_status, "ACTIVE");
        assert!(record.registry_matched_at.is_some());
    }

    #[test]
    fn blank_or_dash_national_id_never_matches() {
        let export = vec![RegistryRecord {
            national_id: "".into(),
            ..RegistryRecord::default()
        }];

        let mut blank = build_partner_record(&entry(1), &profile(""), None);
        assert!(!apply_registry_match(&mut blank, &export));

        let mut dash = build_partner_record(&entry(2), &profile("-"), None);
        assert!(!apply_registry_match(&mut dash, &export));
    }

    #[test]
    fn unmatched_id_leaves_block_blank() {
        let mut record = build_partner_record(&entry(1), &profile("999"), None);
        let export = vec![RegistryRecord {
            national_id: "111".into(),
            ..RegistryRecord::default()
        }];

        assert!(!apply_registry_match(&mut record, &export));
        assert_eq!(record.registry_plate_number, "");
        assert!(record.registry_matched_at.is_none());
    }
}
