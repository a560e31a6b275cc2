//! Client for the external identity-registry export.
//!
//! The registry tracks which national id currently holds which fleet unit.
//! One export is fetched per sync run and matched in memory; national ids
//! are trimmed at ingestion so the pipeline can match on exact strings.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::domain::error::SyncError;
use crate::domain::services::{RegistryApi, RegistryRecord};
use crate::infrastructure::config::CarrierConfig;

#[derive(Debug, Deserialize)]
struct ExportBody {
    #[serde(default)]
    records: Vec<ExportRow>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportRow {
    #[serde(default)]
    national_id: String,
    #[serde(default)]
    plate_number: String,
    #[serde(default)]
    unit_brand: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    unit_out_date: String,
    #[serde(default)]
    unit_return_date: String,
    #[serde(default)]
    usage_duration: String,
    #[serde(default)]
    status: String,
}

pub struct RegistryClient {
    client: Client,
    export_url: Url,
    token: String,
}

impl RegistryClient {
    pub fn new(config: &CarrierConfig) -> anyhow::Result<Self> {
        let export_url = Url::parse(&config.registry_export_url)
            .context("invalid registry export url")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build registry HTTP client")?;

        Ok(Self {
            client,
            export_url,
            token: config.registry_token.clone(),
        })
    }
}

#[async_trait]
impl RegistryApi for RegistryClient {
    async fn fetch_export(&self) -> Result<Vec<RegistryRecord>, SyncError> {
        debug!(url = %self.export_url, "fetching identity-registry export");

        let response = self
            .client
            .get(self.export_url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| SyncError::TransientUpstream {
                message: format!("registry export request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(SyncError::TransientUpstream {
                message: format!("registry export rejected: {}", response.status()),
            });
        }

        let body: ExportBody = response.json().await.map_err(|e| {
            SyncError::TransientUpstream {
                message: format!("registry export response unreadable: {e}"),
            }
        })?;

        let records: Vec<RegistryRecord> = body
            .records
            .into_iter()
            .map(|row| RegistryRecord {
                national_id: row.national_id.trim().to_string(),
                plate_number: row.plate_number,
                unit_brand: row.unit_brand,
                address: row.address,
                unit_out_date: row.unit_out_date,
                unit_return_date: row.unit_return_date,
                usage_duration: row.usage_duration,
                status: row.status,
            })
            .collect();

        info!(count = records.len(), "registry export fetched");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_rows_tolerate_missing_fields() {
        let raw = r#"{"records": [{"national_id": " 317301 ", "status": "ACTIVE"}, {}]}"#;
        let body: ExportBody = serde_json::from_str(raw).expect("parse");
        assert_eq!(body.records.len(), 2);
        assert_eq!(body.records[0].status, "ACTIVE");
    }

    #[test]
    fn invalid_export_url_is_rejected_at_construction() {
        let config = CarrierConfig {
            registry_export_url: "not a url".into(),
            ..CarrierConfig::default()
        };
        assert!(RegistryClient::new(&config).is_err());
    }
}
