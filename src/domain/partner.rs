//! Partner (driver) mirror records.
//!
//! The mirror is entirely replaced per sync run and is read-only outside the
//! sync pipeline. `partner_id` is the carrier-assigned identifier and the
//! unique key.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the local partner mirror: roster fields merged with the
/// per-driver profile/bank detail and, when the national id matches, the
/// identity-registry enrichment block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct PartnerRecord {
    pub partner_id: String,
    pub name: String,
    pub phone_number: String,
    pub city: String,
    pub status: String,
    pub attendance: String,
    pub bank_info_provided: bool,
    pub app_version: String,
    pub last_active: String,
    pub registered_at: String,
    pub hubs: String,
    pub businesses: String,
    pub reason: String,
    pub current_lat: Option<f64>,
    pub current_lon: Option<f64>,
    pub national_id: String,
    pub license_number: String,
    pub license_expiry: String,
    pub bank_name: String,
    pub bank_account_holder: String,
    pub bank_account_number: String,
    // Identity-registry enrichment; blank when no record matched.
    pub registry_status: String,
    pub registry_plate_number: String,
    pub registry_unit_brand: String,
    pub registry_address: String,
    pub registry_unit_out_date: String,
    pub registry_unit_return_date: String,
    pub registry_usage_duration: String,
    pub registry_matched_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Maps the carrier's raw account state to the display label the dashboards
/// show. Unknown states pass through unchanged.
pub fn display_status(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "registered" => "Registered".to_string(),
        "active" => "Active".to_string(),
        "pending" => "Pending Verification".to_string(),
        "new" => "New".to_string(),
        "inactive" => "Inactive".to_string(),
        "banned" => "Banned".to_string(),
        "" => "-".to_string(),
        _ => raw.to_string(),
    }
}

/// Formats the carrier's id -> name hub/business maps as a single
/// "Name (id), ..." display string, ordered by id for stable output.
pub fn format_id_name_map(map: &HashMap<String, String>) -> String {
    if map.is_empty() {
        return String::new();
    }
    let mut entries: Vec<(&String, &String)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(id, name)| format!("{name} ({id})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Formats an optional timestamp the way the dashboards expect
/// ("dd/mm/yyyy h:mmAM"); absent values render as "-".
pub fn format_date_time(value: Option<DateTime<Utc>>) -> String {
    match value {
        Some(ts) => ts.format("%d/%m/%Y %l:%M%p").to_string().replace("  ", " "),
        None => "-".to_string(),
    }
}
