use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Events the rest of the backend hands to the dispatcher. Each variant
/// carries everything a channel needs to render and address the message,
/// so delivery never goes back to the database.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A call entered the waiting queue and is claimable. Addressed to the
    /// on-call team inbox.
    CallWaiting {
        queue_id: Uuid,
        patient_name: String,
        price_tier: String,
    },
    /// A professional claimed the call. Addressed to the patient.
    CallTaken {
        queue_id: Uuid,
        patient_name: String,
        patient_email: String,
        patient_phone: String,
        professional_name: String,
    },
    /// The gateway confirmed the patient's payment. Addressed to the patient.
    PaymentConfirmed {
        session_id: Uuid,
        patient_name: String,
        patient_email: String,
        patient_phone: String,
        amount: f64,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::CallWaiting { .. } => "call_waiting",
            NotificationEvent::CallTaken { .. } => "call_taken",
            NotificationEvent::PaymentConfirmed { .. } => "payment_confirmed",
        }
    }
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Channel not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Delivery rejected: {0}")]
    DeliveryRejected(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Tuning for the outbound queue and its retry policy.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_attempts: 3,
            retry_delay_ms: 2000,
        }
    }
}
