//! Configuration for the sync subsystem.
//!
//! Every retry/settle/poll delay the pipelines use is a config field rather
//! than a literal; the defaults are the values observed in production.
//! Loaded from a JSON file when one is provided, otherwise defaults apply.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Complete subsystem configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub carrier: CarrierConfig,
    pub sync: SyncConfig,
    pub assignment: AssignmentConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Carrier platform endpoints and HTTP client behavior. The platform spreads
/// its surface across several hosts; each endpoint is configured as a full
/// URL prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    pub auth_url: String,
    pub orders_url: String,
    pub batch_details_url: String,
    pub generate_batch_url: String,
    pub assign_driver_url: String,
    pub roster_url: String,
    pub profile_url: String,
    pub bank_detail_url: String,
    pub upload_url: String,
    pub registry_export_url: String,
    /// Standing panel token for the roster/profile/bank endpoints.
    pub panel_token: String,
    /// Bearer token for the identity-registry export.
    pub registry_token: String,
    pub request_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub max_requests_per_second: u32,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://driver-api.example-carrier.test/panel/login".into(),
            orders_url: "https://adminapis.example-carrier.test/api/v1/orders".into(),
            batch_details_url: "https://bmc.example-carrier.test/v1/batches/details".into(),
            generate_batch_url: "https://bmc.example-carrier.test/v1/generate/batch".into(),
            assign_driver_url: "https://amc.example-carrier.test/v1/batch/assign/driver".into(),
            roster_url: "https://driver-api.example-carrier.test/v2/panel/driver-list".into(),
            profile_url: "https://driver-api.example-carrier.test/panel/driver-profile".into(),
            bank_detail_url: "https://user.example-carrier.test/v1/app/users/bank_detail/drivers"
                .into(),
            upload_url: "https://adminpanel.example-carrier.test/v1/orders/upload".into(),
            registry_export_url: "https://registry.example.test/v1/units/export".into(),
            panel_token: String::new(),
            registry_token: String::new(),
            request_timeout_secs: 30,
            upload_timeout_secs: 120,
            max_requests_per_second: 5,
        }
    }
}

/// Partner sync pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Roster page size; a shorter page ends pagination.
    pub page_size: u32,
    /// Hard ceiling on page requests, guarding against a looping remote.
    pub max_pages: u32,
    /// Mirror upsert batch size.
    pub batch_size: usize,
    /// Enrichment fetch window (concurrent profile requests).
    pub concurrent_requests: usize,
    pub inter_page_delay_ms: u64,
    pub inter_batch_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 100,
            batch_size: 200,
            concurrent_requests: 5,
            inter_page_delay_ms: 300,
            inter_batch_delay_ms: 300,
        }
    }
}

/// Batch assignment orchestrator tuning. Delays are fixed, not exponential;
/// the carrier's ingestion and assignment paths are eventually consistent
/// and these values are tuned against observed propagation lag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    pub max_assign_attempts: u32,
    pub assign_retry_delay_ms: u64,
    /// Wait after a fresh generate before the first assign attempt.
    pub generate_settle_delay_ms: u64,
    /// Wait after the bulk upload returns before re-verifying.
    pub upload_settle_delay_ms: u64,
    /// Verification passes after upload before giving up on missing orders.
    pub verification_passes: u32,
    pub verify_retry_delay_ms: u64,
    /// Delay between per-order existence checks.
    pub invoice_check_delay_ms: u64,
    /// Extra wait before the final batch-id recheck when none was visible.
    pub batch_recheck_delay_ms: u64,
    /// Fallback assignment coordinates (the hub) when the caller has none.
    pub hub_lat: f64,
    pub hub_lon: f64,
    pub assign_radius: String,
    /// Deep-link base for the carrier's manual-assignment console, used in
    /// exhausted-retries errors.
    pub console_url: String,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            max_assign_attempts: 3,
            assign_retry_delay_ms: 1500,
            generate_settle_delay_ms: 2000,
            upload_settle_delay_ms: 5000,
            verification_passes: 2,
            verify_retry_delay_ms: 3000,
            invoice_check_delay_ms: 200,
            batch_recheck_delay_ms: 3000,
            hub_lat: -6.2093097,
            hub_lon: 106.9151781,
            assign_radius: "20km".into(),
            console_url: "https://admin-manage.example-carrier.test".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Poll interval while waiting for another caller's warm to finish.
    pub warm_poll_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            warm_poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/fleetsync.db".into(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing env-filter directive, e.g. "info" or "fleetsync=debug".
    pub level: String,
    pub log_to_file: bool,
    pub file_dir: Option<String>,
    pub file_name_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            log_to_file: false,
            file_dir: None,
            file_name_prefix: "fleetsync".into(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a JSON file, filling omitted sections with
    /// defaults.
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_constants() {
        let config = AppConfig::default();
        assert_eq!(config.sync.page_size, 100);
        assert_eq!(config.sync.max_pages, 100);
        assert_eq!(config.sync.batch_size, 200);
        assert_eq!(config.sync.concurrent_requests, 5);
        assert_eq!(config.assignment.max_assign_attempts, 3);
        assert_eq!(config.assignment.assign_retry_delay_ms, 1500);
        assert_eq!(config.assignment.generate_settle_delay_ms, 2000);
        assert_eq!(config.assignment.upload_settle_delay_ms, 5000);
        assert_eq!(config.cache.warm_poll_interval_ms, 500);
    }

    #[tokio::test]
    async fn file_roundtrip_and_partial_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.sync.page_size = 50;
        config.save_to_file(&path).await.expect("save");

        let loaded = AppConfig::load_from_file(&path).await.expect("load");
        assert_eq!(loaded.sync.page_size, 50);

        // A file with only one section still loads; the rest defaults.
        tokio::fs::write(&path, r#"{"sync": {"max_pages": 7}}"#)
            .await
            .expect("write partial");
        let partial = AppConfig::load_from_file(&path).await.expect("load partial");
        assert_eq!(partial.sync.max_pages, 7);
        assert_eq!(partial.sync.page_size, 100);
        assert_eq!(partial.assignment.max_assign_attempts, 3);
    }
}
