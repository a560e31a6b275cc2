//! Typed reqwest client for the carrier platform's REST surface.
//!
//! Wraps authentication, order search, batch details/generate/assign and the
//! paginated roster + per-driver detail endpoints behind the `CarrierApi`
//! trait, with a process-local rate limiter so roster syncs stay polite.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::domain::batch::BatchSnapshot;
use crate::domain::error::SyncError;
use crate::domain::services::{
    AssignDriverRequest, AssignmentReceipt, BankDetail, CarrierApi, Credential, DriverProfile,
    GenerateOutcome, RemoteOrder, RosterEntry,
};
use crate::infrastructure::config::CarrierConfig;

/// Channel discriminator header the batch/assign endpoints require.
const CHANNEL_HEADER: (&str, &str) = ("bt", "2");

/// Response envelope most carrier endpoints use.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderSearchBody {
    #[serde(default)]
    results: Vec<OrderHit>,
}

#[derive(Debug, Deserialize)]
struct OrderHit {
    id: serde_json::Value,
    #[serde(default)]
    awb_number: Option<String>,
    #[serde(default)]
    order_status: Option<String>,
    #[serde(default)]
    batch_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct BatchDetailsData {
    #[serde(default)]
    batch: BatchInfo,
    #[serde(default)]
    driver: PartyInfo,
    #[serde(default)]
    assignment: PartyInfo,
    #[serde(default)]
    orders: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct BatchInfo {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PartyInfo {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mobile: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssignData {
    driver_id: i64,
    assignment_id: i64,
}

#[derive(Debug, Default, Deserialize)]
struct RosterData {
    #[serde(default)]
    driver_list_response: Vec<RosterRow>,
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    #[serde(default)]
    drivers: DriverRow,
    #[serde(default)]
    registered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct DriverRow {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    user_id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    city_name: String,
    #[serde(default)]
    account_state: AccountState,
    #[serde(default)]
    attendance_status: String,
    #[serde(default)]
    bank_info_provided: bool,
    #[serde(default)]
    app_version_name: String,
    #[serde(default)]
    last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct AccountState {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileData {
    #[serde(default)]
    driver_profile: ProfileDocuments,
    // Field name as the carrier sends it.
    #[serde(default, rename = "current_cordinates")]
    current_coordinates: Coordinates,
    #[serde(default)]
    business_hub: BusinessHub,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileDocuments {
    #[serde(default)]
    documents: Vec<ProfileDocument>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileDocument {
    #[serde(default)]
    fields: DocumentFields,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentFields {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: DocumentValue,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentValue {
    #[serde(default)]
    nik: Option<String>,
    #[serde(default)]
    sim: Option<String>,
    #[serde(default)]
    expiry_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Coordinates {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct BusinessHub {
    #[serde(default)]
    hub_data: HashMap<String, String>,
    #[serde(default)]
    business_data: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct BankData {
    #[serde(default)]
    bank: Option<String>,
    #[serde(default)]
    account_number: Option<String>,
    #[serde(default)]
    beneficiary_name: Option<String>,
}

/// Carrier REST client. One instance is shared across jobs; the rate
/// limiter is process-wide by construction.
pub struct CarrierClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: CarrierConfig,
}

impl CarrierClient {
    pub fn new(config: CarrierConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .gzip(true)
            .build()
            .context("failed to build carrier HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second.max(1))
                .context("rate limit must be greater than 0")?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            config,
        })
    }

    fn transient(context: &str, err: impl std::fmt::Display) -> SyncError {
        SyncError::TransientUpstream {
            message: format!("{context}: {err}"),
        }
    }
}

#[async_trait]
impl CarrierApi for CarrierClient {
    async fn authenticate(&self, credential: &Credential) -> Result<String, SyncError> {
        self.rate_limiter.until_ready().await;
        debug!(username = %credential.username, "logging in to the carrier panel");

        let response = self
            .client
            .post(&self.config.auth_url)
            .json(&serde_json::json!({
                "username": credential.username,
                "password": credential.password,
            }))
            .send()
            .await
            .map_err(|e| Self::transient("carrier login request failed", e))?;

        let body: ApiEnvelope<LoginData> = response
            .json()
            .await
            .map_err(|e| Self::transient("carrier login response unreadable", e))?;

        if body.result {
            if let Some(data) = body.data {
                info!("carrier login successful");
                return Ok(data.access_token);
            }
        }
        Err(SyncError::Internal(anyhow::anyhow!(
            "carrier login failed: {}",
            body.message.unwrap_or_else(|| "unknown error".into())
        )))
    }

    async fn search_order(
        &self,
        access_token: &str,
        merchant_order_id: &str,
    ) -> Result<Option<RemoteOrder>, SyncError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&self.config.orders_url)
            .query(&[
                ("sort", "created_at"),
                ("dir", "-1"),
                ("page", "1"),
                ("limit", "100"),
                ("q", merchant_order_id),
            ])
            .header("Authorization", access_token)
            .send()
            .await
            .map_err(|e| Self::transient("order search request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::transient("order search rejected", response.status()));
        }

        let body: OrderSearchBody = response
            .json()
            .await
            .map_err(|e| Self::transient("order search response unreadable", e))?;

        Ok(body.results.into_iter().next().map(|hit| RemoteOrder {
            order_id: match hit.id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
            awb_number: hit.awb_number.unwrap_or_default(),
            status: hit.order_status.unwrap_or_default(),
            batch_id: hit.batch_id,
        }))
    }

    async fn batch_details(
        &self,
        access_token: &str,
        batch_id: i64,
    ) -> Result<BatchSnapshot, SyncError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/{batch_id}", self.config.batch_details_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", access_token)
            .header(CHANNEL_HEADER.0, CHANNEL_HEADER.1)
            .send()
            .await
            .map_err(|e| Self::transient("batch details request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::transient("batch details rejected", response.status()));
        }

        let body: ApiEnvelope<BatchDetailsData> = response
            .json()
            .await
            .map_err(|e| Self::transient("batch details response unreadable", e))?;

        let Some(data) = body.data.filter(|_| body.result) else {
            warn!(batch_id, "batch not found on the carrier side");
            return Ok(BatchSnapshot::missing());
        };

        Ok(BatchSnapshot {
            found: true,
            status: data.batch.status.unwrap_or_default().to_lowercase(),
            orders_count: data.orders.len() as u32,
            driver_id: data.driver.id.unwrap_or(0),
            driver_name: data.driver.name.unwrap_or_default(),
            driver_mobile: data.driver.mobile.unwrap_or_default(),
            assignment_id: data.assignment.id.unwrap_or(0),
        })
    }

    async fn generate_batch(
        &self,
        access_token: &str,
        batch_id: i64,
    ) -> Result<GenerateOutcome, SyncError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/{batch_id}", self.config.generate_batch_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", access_token)
            .header(CHANNEL_HEADER.0, CHANNEL_HEADER.1)
            .send()
            .await
            .map_err(|e| Self::transient("generate batch request failed", e))?;

        // The carrier answers 424 when the batch was generated earlier;
        // that is success for our purposes.
        if response.status() == StatusCode::FAILED_DEPENDENCY {
            info!(batch_id, "batch already generated, proceeding to assign");
            return Ok(GenerateOutcome::AlreadyGenerated);
        }
        if !response.status().is_success() {
            return Err(Self::transient("generate batch rejected", response.status()));
        }

        let body: ApiEnvelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| Self::transient("generate batch response unreadable", e))?;

        if body.result {
            info!(batch_id, "batch generated");
            Ok(GenerateOutcome::Generated)
        } else {
            Err(Self::transient(
                "generate batch returned non-result",
                body.message.unwrap_or_else(|| "unknown error".into()),
            ))
        }
    }

    async fn assign_driver(
        &self,
        access_token: &str,
        request: &AssignDriverRequest,
    ) -> Result<AssignmentReceipt, SyncError> {
        self.rate_limiter.until_ready().await;
        debug!(batch_id = request.batch_id, driver_id = request.driver_id, "assign driver payload sent");

        let response = self
            .client
            .post(&self.config.assign_driver_url)
            .json(request)
            .header("Authorization", access_token)
            .header(CHANNEL_HEADER.0, CHANNEL_HEADER.1)
            .send()
            .await
            .map_err(|e| Self::transient("assign driver request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::transient("assign driver rejected", response.status()));
        }

        let body: ApiEnvelope<AssignData> = response
            .json()
            .await
            .map_err(|e| Self::transient("assign driver response unreadable", e))?;

        match (body.result, body.data) {
            (true, Some(data)) => Ok(AssignmentReceipt {
                driver_id: data.driver_id,
                assignment_id: data.assignment_id,
            }),
            _ => Err(Self::transient(
                "assign driver failed",
                body.message.unwrap_or_else(|| "assignment failed".into()),
            )),
        }
    }

    async fn roster_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<RosterEntry>, SyncError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&self.config.roster_url)
            .query(&[
                ("sort", "-1".to_string()),
                ("page", page.to_string()),
                ("offset", page_size.to_string()),
            ])
            .header("Authorization", &self.config.panel_token)
            .send()
            .await
            .map_err(|e| Self::transient("roster page request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::transient("roster page rejected", response.status()));
        }

        let body: ApiEnvelope<RosterData> = response
            .json()
            .await
            .map_err(|e| Self::transient("roster page response unreadable", e))?;

        let rows = body.data.map(|d| d.driver_list_response).unwrap_or_default();
        debug!(page, count = rows.len(), "roster page fetched");

        Ok(rows
            .into_iter()
            .map(|row| RosterEntry {
                driver_id: row.drivers.id,
                user_id: row.drivers.user_id,
                name: row.drivers.name,
                phone_number: row.drivers.phone_number,
                city: row.drivers.city_name,
                raw_status: row.drivers.account_state.status,
                attendance: row.drivers.attendance_status,
                bank_info_provided: row.drivers.bank_info_provided,
                app_version: row.drivers.app_version_name,
                last_active: row.drivers.last_active,
                registered_at: row.registered_at,
                reason: row.drivers.reason,
            })
            .collect())
    }

    async fn driver_profile(
        &self,
        driver_id: i64,
        _user_id: i64,
    ) -> Result<Option<DriverProfile>, SyncError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/{driver_id}", self.config.profile_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.config.panel_token)
            .send()
            .await
            .map_err(|e| Self::transient("driver profile request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::transient("driver profile rejected", response.status()));
        }

        let body: ApiEnvelope<ProfileData> = response
            .json()
            .await
            .map_err(|e| Self::transient("driver profile response unreadable", e))?;

        let Some(data) = body.data.filter(|_| body.result) else {
            return Ok(None);
        };

        // "ktp" is the national identity card, "sim" the driving license.
        let national_id = data
            .driver_profile
            .documents
            .iter()
            .find(|d| d.fields.key == "ktp")
            .and_then(|d| d.fields.value.nik.clone())
            .unwrap_or_default();
        let license = data
            .driver_profile
            .documents
            .iter()
            .find(|d| d.fields.key == "sim");

        Ok(Some(DriverProfile {
            driver_id,
            current_lat: data.current_coordinates.lat,
            current_lon: data.current_coordinates.lon,
            national_id,
            license_number: license
                .and_then(|d| d.fields.value.sim.clone())
                .unwrap_or_default(),
            license_expiry: license
                .and_then(|d| d.fields.value.expiry_date.clone())
                .unwrap_or_default(),
            hub_data: data.business_hub.hub_data,
            business_data: data.business_hub.business_data,
        }))
    }

    async fn bank_detail(&self, user_id: i64) -> Result<Option<BankDetail>, SyncError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/{user_id}", self.config.bank_detail_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.config.panel_token)
            .send()
            .await
            .map_err(|e| Self::transient("bank detail request failed", e))?;

        if !response.status().is_success() {
            return Err(Self::transient("bank detail rejected", response.status()));
        }

        let body: ApiEnvelope<BankData> = response
            .json()
            .await
            .map_err(|e| Self::transient("bank detail response unreadable", e))?;

        Ok(body.data.filter(|_| body.result).map(|data| BankDetail {
            bank_name: data.bank.unwrap_or_default(),
            account_number: data.account_number.unwrap_or_default(),
            account_holder: data.beneficiary_name.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_from_default_config() {
        let client = CarrierClient::new(CarrierConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn envelope_tolerates_missing_fields() {
        let body: ApiEnvelope<LoginData> =
            serde_json::from_str(r#"{"result": false}"#).expect("parse");
        assert!(!body.result);
        assert!(body.data.is_none());
        assert!(body.message.is_none());
    }

    #[test]
    fn batch_details_payload_parses() {
        let raw = r#"{
            "result": true,
            "data": {
                "batch": {"status": "Created"},
                "driver": {"id": 42, "name": "Budi", "mobile": "0812"},
                "assignment": {"id": 9001},
                "orders": [{}, {}, {}]
            }
        }"#;
        let body: ApiEnvelope<BatchDetailsData> = serde_json::from_str(raw).expect("parse");
        let data = body.data.expect("data");
        assert_eq!(data.batch.status.as_deref(), Some("Created"));
        assert_eq!(data.driver.id, Some(42));
        assert_eq!(data.orders.len(), 3);
    }

    #[test]
    fn profile_documents_parse_with_carrier_spelling() {
        let raw = r#"{
            "result": true,
            "data": {
                "driver_profile": {
                    "documents": [
                        {"fields": {"key": "ktp", "value": {"nik": "317301"}}},
                        {"fields": {"key": "sim", "value": {"sim": "SIM-1", "expiry_date": "2027-01-01"}}}
                    ]
                },
                "current_cordinates": {"lat": -6.2, "lon": 106.9},
                "business_hub": {"hub_data": {"5": "North Hub"}, "business_data": {}}
            }
        }"#;
        let body: ApiEnvelope<ProfileData> = serde_json::from_str(raw).expect("parse");
        let data = body.data.expect("data");
        assert_eq!(data.current_coordinates.lat, Some(-6.2));
        assert_eq!(data.driver_profile.documents.len(), 2);
        assert_eq!(data.business_hub.hub_data["5"], "North Hub");
    }
}
