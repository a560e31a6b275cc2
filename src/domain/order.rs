//! Local shipment orders and their carrier-side linkage.

use serde::{Deserialize, Serialize};

/// A local order record. The shipment fields are owned by the CRUD layer;
/// the carrier linkage block is mutated by the assignment orchestrator as
/// carrier-side state is discovered or changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: String,
    pub merchant_order_id: String,
    pub sender_name: String,
    pub sender_phone: String,
    pub pickup_instructions: String,
    pub consignee_name: String,
    pub consignee_phone: String,
    pub destination_district: String,
    pub destination_city: String,
    pub destination_province: String,
    pub destination_postalcode: String,
    pub destination_address: String,
    pub dropoff_lat: Option<f64>,
    pub dropoff_long: Option<f64>,
    pub dropoff_instructions: String,
    pub weight: f64,
    pub width: f64,
    pub height: f64,
    pub length: f64,
    pub payment_type: String,
    pub cod_amount: f64,
    pub item_value: f64,
    pub product_details: String,
    // Carrier linkage, discovered/maintained by the orchestrator.
    pub carrier_order_id: Option<String>,
    pub awb_number: Option<String>,
    pub carrier_status: Option<String>,
    pub batch_id: Option<i64>,
    pub assignment_status: String,
}

impl Order {
    /// Minimal constructor used by tests and fixtures; shipment fields
    /// default to empty.
    pub fn new(id: impl Into<String>, merchant_order_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            merchant_order_id: merchant_order_id.into(),
            payment_type: "non_cod".to_string(),
            assignment_status: "assigned".to_string(),
            ..Self::default()
        }
    }
}
