//! Bulk invoice upload collaborator.
//!
//! Builds the spreadsheet-shaped payload the carrier's admin panel ingests
//! (its column set is a fixed contract; starred headers are mandatory on the
//! panel side) and ships it as one multipart request with the routing
//! metadata. The upload is not idempotent but is safe to retry: the panel
//! deduplicates by merchant order id during ingestion.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::error::SyncError;
use crate::domain::order::Order;
use crate::domain::services::{Credential, InvoiceUploader, RoutingInfo};
use crate::infrastructure::config::CarrierConfig;

/// Column set of the upload sheet, in panel order.
const SHEET_HEADERS: [&str; 22] = [
    "merchant_order_id*",
    "weight*",
    "width",
    "height",
    "length",
    "payment_type*",
    "cod_amount",
    "sender_name*",
    "sender_phone*",
    "pickup_instructions",
    "consignee_name*",
    "consignee_phone*",
    "destination_district",
    "destination_city*",
    "destination_province",
    "destination_postalcode*",
    "destination_address*",
    "dropoff_lat",
    "dropoff_long",
    "dropoff_instructions",
    "item_value*",
    "product_details*",
];

/// Serializes the orders into the CSV sheet the panel accepts.
pub fn build_invoice_sheet(orders: &[Order]) -> Vec<u8> {
    let mut sheet = String::new();
    sheet.push_str(&SHEET_HEADERS.join(","));
    sheet.push('\n');

    for order in orders {
        let row = [
            csv_field(&order.merchant_order_id),
            order.weight.to_string(),
            order.width.to_string(),
            order.height.to_string(),
            order.length.to_string(),
            csv_field(&order.payment_type),
            order.cod_amount.to_string(),
            csv_field(&order.sender_name),
            csv_field(&order.sender_phone),
            csv_field(&order.pickup_instructions),
            csv_field(&order.consignee_name),
            csv_field(&order.consignee_phone),
            csv_field(&order.destination_district),
            csv_field(&order.destination_city),
            csv_field(&order.destination_province),
            csv_field(&order.destination_postalcode),
            csv_field(&order.destination_address),
            order.dropoff_lat.unwrap_or(0.0).to_string(),
            order.dropoff_long.unwrap_or(0.0).to_string(),
            csv_field(&order.dropoff_instructions),
            order.item_value.to_string(),
            csv_field(&order.product_details),
        ];
        sheet.push_str(&row.join(","));
        sheet.push('\n');
    }

    sheet.into_bytes()
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// HTTP implementation of the upload collaborator. Uses a longer timeout
/// than the regular carrier calls; panel ingestion is slow.
pub struct UploadClient {
    client: Client,
    upload_url: String,
}

impl UploadClient {
    pub fn new(config: &CarrierConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.upload_timeout_secs))
            .build()
            .context("failed to build upload HTTP client")?;

        Ok(Self {
            client,
            upload_url: config.upload_url.clone(),
        })
    }
}

#[async_trait]
impl InvoiceUploader for UploadClient {
    async fn upload(
        &self,
        orders: &[Order],
        routing: &RoutingInfo,
        credential: &Credential,
    ) -> Result<(), SyncError> {
        let payload = build_invoice_sheet(orders);
        let file_name = format!("orders_{}.csv", Uuid::new_v4());
        debug!(
            orders = orders.len(),
            bytes = payload.len(),
            business = routing.business,
            hub = routing.hub,
            "uploading invoice sheet"
        );

        let form = Form::new()
            .part(
                "file",
                Part::bytes(payload)
                    .file_name(file_name)
                    .mime_str("text/csv")
                    .map_err(|e| SyncError::Internal(anyhow::anyhow!(e)))?,
            )
            .text("business", routing.business.to_string())
            .text("city", routing.city.to_string())
            .text("service_type", routing.service_type.to_string())
            .text("business_hub", routing.hub.to_string())
            .text("username", credential.username.clone())
            .text("password", credential.password.clone());

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SyncError::TransientUpstream {
                message: format!("invoice upload request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(SyncError::TransientUpstream {
                message: format!("invoice upload rejected: {}", response.status()),
            });
        }

        info!(orders = orders.len(), "invoice upload completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_has_header_and_one_row_per_order() {
        let orders = vec![Order::new("1", "INV-1"), Order::new("2", "INV-2")];
        let sheet = String::from_utf8(build_invoice_sheet(&orders)).expect("utf8");
        let lines: Vec<&str> = sheet.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("merchant_order_id*,weight*"));
        assert_eq!(lines[0].split(',').count(), SHEET_HEADERS.len());
        assert!(lines[1].starts_with("INV-1,"));
        assert!(lines[2].starts_with("INV-2,"));
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let mut order = Order::new("1", "INV-1");
        order.destination_address = "Jl. Sudirman No. 1, Jakarta".into();
        order.product_details = r#"5x "Box""#.into();

        let sheet = String::from_utf8(build_invoice_sheet(&[order])).expect("utf8");
        assert!(sheet.contains(r#""Jl. Sudirman No. 1, Jakarta""#));
        assert!(sheet.contains(r#""5x ""Box""""#));
    }
}
