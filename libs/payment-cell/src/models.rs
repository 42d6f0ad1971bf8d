// libs/payment-cell/src/models.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;

/// State handed to the payment routes: the process-wide config plus the
/// shared notification queue handle.
#[derive(Clone)]
pub struct PaymentCellState {
    pub config: Arc<AppConfig>,
    pub notifications: NotificationDispatcher,
}

// ==============================================================================
// GATEWAY WIRE TYPES
// ==============================================================================

/// Webhook JSON envelope: `{"type": "payment", "data": {"id": ...}}`.
/// The gateway sends `data.id` as either a string or a number.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub action: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub id: Option<Value>,
}

/// Query parameters covering both the newer webhook redirects
/// (`?data.id=123&type=payment`) and the legacy IPN form
/// (`?topic=payment&id=123`).
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
}

/// The slice of `GET /v1/payments/{id}` this backend reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub id: i64,
    pub status: String,
    pub status_detail: Option<String>,
    pub external_reference: Option<String>,
    pub transaction_amount: Option<f64>,
    pub currency_id: Option<String>,
    pub date_approved: Option<String>,
}

impl PaymentInfo {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentSearchResponse {
    pub results: Vec<PaymentInfo>,
}

#[derive(Debug, Serialize)]
pub struct PreferenceItem {
    pub title: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub currency_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferenceResponse {
    pub id: String,
    pub init_point: String,
    pub sandbox_init_point: Option<String>,
}

// ==============================================================================
// LEDGER & OUTCOMES
// ==============================================================================

/// One settled payment. `gateway_payment_id` is unique: inserting a duplicate
/// is how redelivered webhooks are detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub gateway_payment_id: String,
    pub call_session_id: Uuid,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// What processing a payment event amounted to. Everything except
/// `Processed` is an absorbed no-op the gateway still gets a 200 for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Processed,
    AlreadyProcessed,
    IgnoredStatus,
    UnknownReference,
}

impl ConfirmationOutcome {
    pub fn processed(&self) -> bool {
        matches!(self, ConfirmationOutcome::Processed)
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            ConfirmationOutcome::Processed => None,
            ConfirmationOutcome::AlreadyProcessed => Some("already_processed"),
            ConfirmationOutcome::IgnoredStatus => Some("status_not_approved"),
            ConfirmationOutcome::UnknownReference => Some("unknown_reference"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment gateway not configured")]
    NotConfigured,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
