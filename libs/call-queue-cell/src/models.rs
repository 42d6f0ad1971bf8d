use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;

/// State handed to the call routes: process-wide config plus the shared
/// notification queue handle.
#[derive(Clone)]
pub struct CallQueueCellState {
    pub config: Arc<AppConfig>,
    pub notifications: NotificationDispatcher,
}

// ==============================================================================
// CALL QUEUE DOMAIN MODELS
// ==============================================================================

/// One on-demand video consultation attempt, from creation to its terminal
/// outcome. Created in lock-step with a [`QueueEntry`]; the pair shares its
/// lifecycle except for the payment promotion, which touches only the entry
/// side until a professional actually takes the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: Uuid,

    // Identity: an authenticated patient id, or ad-hoc contact details for
    // walk-in requests. At least one of the two exists.
    pub patient_id: Option<String>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,

    pub status: CallSessionStatus,

    /// Opaque token the patient polls status with. Not a credential for
    /// anything beyond reading this one session.
    pub session_token: String,

    // Price tier captured at creation time; the tier never changes after
    // enqueue even if the clock crosses a band boundary while waiting.
    pub price_amount: f64,
    pub price_tier: String,
    pub time_slot: String,

    pub credits_held: f64,
    /// Set only on entry into in_progress, from the verified payment or the
    /// captured tier amount when verification was inconclusive.
    pub credits_charged: Option<f64>,
    pub payment_verified: bool,
    /// Checkout preference id correlating this session to the gateway.
    pub payment_reference: Option<String>,

    pub professional_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    /// Soft TTL; the expiry sweep turns sessions past this into terminal
    /// states.
    pub expires_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl CallSession {
    /// Deterministic, non-secret room label handed to the video collaborator.
    pub fn room_name(&self) -> String {
        let fragment: String = self.session_token.chars().take(12).collect();
        format!("salus-{}", fragment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallSessionStatus {
    #[serde(rename = "awaiting_payment")]
    AwaitingPayment,
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "failed")]
    Failed,
}

impl CallSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallSessionStatus::AwaitingPayment => "awaiting_payment",
            CallSessionStatus::Pending => "pending",
            CallSessionStatus::InProgress => "in_progress",
            CallSessionStatus::Completed => "completed",
            CallSessionStatus::Cancelled => "cancelled",
            CallSessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallSessionStatus::Completed | CallSessionStatus::Cancelled | CallSessionStatus::Failed
        )
    }
}

/// The claimable, orderable unit a professional picks up. Carries a
/// denormalized contact snapshot so the queue listing needs no join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub call_session_id: Uuid,

    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,

    pub status: QueueEntryStatus,

    /// Higher first; `created_at` breaks ties oldest-first.
    pub priority: i32,
    pub created_at: DateTime<Utc>,

    pub assigned_professional_id: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,

    /// Append-only audit log of transfers and cancellations.
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueEntryStatus {
    #[serde(rename = "awaiting_payment")]
    AwaitingPayment,
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "assigned")]
    Assigned,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl QueueEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEntryStatus::AwaitingPayment => "awaiting_payment",
            QueueEntryStatus::Waiting => "waiting",
            QueueEntryStatus::Assigned => "assigned",
            QueueEntryStatus::InProgress => "in_progress",
            QueueEntryStatus::Completed => "completed",
            QueueEntryStatus::Cancelled => "cancelled",
        }
    }
}

/// Professional capacity view. The row is owned elsewhere; this cell only
/// reads it and moves `current_calls` through conditional counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Professional {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub is_active: bool,
    pub is_available: bool,
    pub current_calls: i32,
    pub max_concurrent_calls: i32,
}

impl Professional {
    pub fn has_capacity(&self) -> bool {
        self.current_calls < self.max_concurrent_calls
    }

    pub fn can_take_calls(&self) -> bool {
        self.is_active && self.is_available && self.has_capacity()
    }
}

/// Price tier resolved at enqueue time. `payment_url` appears only on the
/// prepayment flow, pointing the patient at the gateway checkout.
#[derive(Debug, Clone, Serialize)]
pub struct PriceInfo {
    pub amount: f64,
    pub tier_label: String,
    pub time_slot_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

// ==============================================================================
// API REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueCallRequest {
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub requires_prepayment: bool,
    pub priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct TakeCallRequest {
    /// Claim this specific entry, or the oldest waiting one when absent.
    pub queue_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteCallRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferCallRequest {
    pub to_professional_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelCallRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueCallResponse {
    pub session_id: Uuid,
    pub session_token: String,
    pub queue_id: Uuid,
    pub price_info: PriceInfo,
}

#[derive(Debug, Serialize)]
pub struct PatientSnapshot {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentSummary {
    pub amount_charged: f64,
    pub payment_verified: bool,
    pub price_tier: String,
}

#[derive(Debug, Serialize)]
pub struct TakeCallResponse {
    pub queue_id: Uuid,
    pub session_id: Uuid,
    pub patient: PatientSnapshot,
    pub room_name: String,
    pub payment_info: PaymentSummary,
}

#[derive(Debug, Serialize)]
pub struct CallStatusResponse {
    pub status: CallSessionStatus,
    pub payment_confirmed: bool,
    pub professional_joined: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExpireSweepResponse {
    pub expired_awaiting_payment: usize,
    pub expired_pending: usize,
    pub cancelled_entries: usize,
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CallQueueError {
    #[error("Queue entry not found")]
    EntryNotFound,

    #[error("Call session not found")]
    SessionNotFound,

    #[error("Call not available: {reason}")]
    NotAvailable { reason: String },

    #[error("Professional at capacity ({current}/{max})")]
    CapacityExceeded { current: i32, max: i32 },

    #[error("Target professional unavailable: {reason}")]
    TargetUnavailable { reason: String },

    #[error("Missing contact information")]
    MissingIdentity,

    #[error("Payment setup failed: {0}")]
    PaymentSetupFailed(String),

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

impl From<anyhow::Error> for CallQueueError {
    fn from(err: anyhow::Error) -> Self {
        CallQueueError::DatabaseError {
            message: err.to_string(),
        }
    }
}
