//! Audit record of a single gateway callback delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SOURCE_MPESA: &str = "mpesa";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub source: String,
    pub checkout_reference: Option<String>,
    pub payload: serde_json::Value,
    pub status_code: i32,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
}

#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub transaction_id: Option<Uuid>,
    pub source: String,
    pub checkout_reference: Option<String>,
    pub payload: serde_json::Value,
    pub status_code: i32,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
}
