// libs/call-queue-cell/src/services/store.rs
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    CallQueueError, CallSession, CallSessionStatus, Professional, QueueEntry, QueueEntryStatus,
};

/// Persistence layer for the paired `call_sessions` / `call_queue` tables and
/// the professional capacity counters.
///
/// Every transition in here is a conditional write: the PostgREST filter
/// doubles as a compare-and-swap, and an empty result set means the guard did
/// not hold (lost race, stale promotion, wrong owner). Callers get that back
/// as `None` or `false` and decide what it means for them.
pub struct CallQueueStore {
    supabase: SupabaseClient,
}

impl CallQueueStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    // ==========================================================================
    // CREATION
    // ==========================================================================

    /// Inserts the session/entry pair through the `create_call_request`
    /// database function, which wraps both inserts in a single transaction so
    /// a session can never exist without its queue entry or vice versa.
    pub async fn create_call(
        &self,
        session: &CallSession,
        entry: &QueueEntry,
    ) -> Result<(), CallQueueError> {
        debug!(
            "Creating call session {} with queue entry {}",
            session.id, entry.id
        );

        let _: Value = self
            .supabase
            .rpc(
                "create_call_request",
                None,
                json!({
                    "session_data": session,
                    "entry_data": entry,
                }),
            )
            .await?;

        Ok(())
    }

    // ==========================================================================
    // LOOKUPS
    // ==========================================================================

    pub async fn get_session(&self, session_id: Uuid) -> Result<Option<CallSession>, CallQueueError> {
        let rows: Vec<CallSession> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/call_sessions?id=eq.{}", session_id),
                None,
                None,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn get_session_by_token(
        &self,
        session_token: &str,
    ) -> Result<Option<CallSession>, CallQueueError> {
        let rows: Vec<CallSession> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/call_sessions?session_token=eq.{}", session_token),
                None,
                None,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn get_entry(&self, queue_id: Uuid) -> Result<Option<QueueEntry>, CallQueueError> {
        let rows: Vec<QueueEntry> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/call_queue?id=eq.{}", queue_id),
                None,
                None,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Next claimable entry: priority first, then age. Creation timestamps
    /// are effectively unique, so no further tie-break is needed.
    pub async fn find_oldest_waiting(&self) -> Result<Option<QueueEntry>, CallQueueError> {
        let rows: Vec<QueueEntry> = self
            .supabase
            .request(
                Method::GET,
                "/rest/v1/call_queue?status=eq.waiting&order=priority.desc,created_at.asc&limit=1",
                None,
                None,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn list_entries(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<QueueEntry>, CallQueueError> {
        let path = match status {
            Some(status) => format!(
                "/rest/v1/call_queue?status=eq.{}&order=priority.desc,created_at.asc",
                status
            ),
            None => "/rest/v1/call_queue?order=priority.desc,created_at.asc".to_string(),
        };

        let rows: Vec<QueueEntry> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows)
    }

    pub async fn count_waiting(&self) -> Result<usize, CallQueueError> {
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                "/rest/v1/call_queue?status=eq.waiting&select=id",
                None,
                None,
            )
            .await?;
        Ok(rows.len())
    }

    pub async fn get_professional(
        &self,
        professional_id: Uuid,
    ) -> Result<Option<Professional>, CallQueueError> {
        let rows: Vec<Professional> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/professionals?id=eq.{}", professional_id),
                None,
                None,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    // ==========================================================================
    // CAPACITY COUNTERS
    // ==========================================================================

    /// Conditional increment via the `claim_call_slot` database function:
    /// `current_calls + 1 WHERE current_calls < max_concurrent_calls`,
    /// returning the number of rows touched. `false` means the professional
    /// is at capacity, no matter what an earlier read said.
    pub async fn claim_professional_slot(
        &self,
        professional_id: Uuid,
    ) -> Result<bool, CallQueueError> {
        let affected: i64 = self
            .supabase
            .rpc(
                "claim_call_slot",
                None,
                json!({ "professional_uuid": professional_id }),
            )
            .await?;
        Ok(affected > 0)
    }

    /// Conditional decrement floored at zero. `false` means the counter was
    /// already at zero; callers log it and move on.
    pub async fn release_professional_slot(
        &self,
        professional_id: Uuid,
    ) -> Result<bool, CallQueueError> {
        let affected: i64 = self
            .supabase
            .rpc(
                "release_call_slot",
                None,
                json!({ "professional_uuid": professional_id }),
            )
            .await?;
        Ok(affected > 0)
    }

    // ==========================================================================
    // CLAIMS AND TRANSITIONS
    // ==========================================================================

    /// The claim compare-and-swap. Only a `waiting` entry can be taken, so
    /// of N professionals racing for the same row exactly one sees it come
    /// back; the rest get `None`.
    pub async fn claim_entry(
        &self,
        queue_id: Uuid,
        professional_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueEntry>, CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_queue?id=eq.{}&status=eq.waiting",
                    queue_id
                ),
                None,
                json!({
                    "status": QueueEntryStatus::Assigned,
                    "assigned_professional_id": professional_id,
                    "assigned_at": now,
                    "answered_at": now,
                }),
            )
            .await?;
        first_row(rows)
    }

    /// Compensating CAS for a claim whose follow-up failed: puts the entry
    /// back into the pool, but only if this professional still holds it.
    pub async fn release_entry_claim(
        &self,
        queue_id: Uuid,
        professional_id: Uuid,
    ) -> Result<(), CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_queue?id=eq.{}&status=eq.assigned&assigned_professional_id=eq.{}",
                    queue_id, professional_id
                ),
                None,
                json!({
                    "status": QueueEntryStatus::Waiting,
                    "assigned_professional_id": null,
                    "assigned_at": null,
                    "answered_at": null,
                }),
            )
            .await?;

        if rows.is_empty() {
            warn!(
                "Queue entry {} moved on before its claim could be released",
                queue_id
            );
        }
        Ok(())
    }

    /// Flips the session into `in_progress`, recording who answered and what
    /// was charged. Guarded so a session cancelled in the claim window stays
    /// cancelled.
    pub async fn start_session(
        &self,
        session_id: Uuid,
        professional_id: Uuid,
        credits_charged: f64,
        payment_verified: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<CallSession>, CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_sessions?id=eq.{}&status=in.(pending,awaiting_payment)",
                    session_id
                ),
                None,
                json!({
                    "status": CallSessionStatus::InProgress,
                    "professional_id": professional_id,
                    "started_at": now,
                    "credits_charged": credits_charged,
                    "payment_verified": payment_verified,
                }),
            )
            .await?;
        first_row(rows)
    }

    /// Completion is owner-guarded: the row must still be assigned to this
    /// professional and not already terminal. `notes`, when given, is the
    /// full replacement text with the audit line already appended.
    pub async fn complete_entry(
        &self,
        queue_id: Uuid,
        professional_id: Uuid,
        notes: Option<&str>,
    ) -> Result<Option<QueueEntry>, CallQueueError> {
        let mut body = json!({ "status": QueueEntryStatus::Completed });
        if let Some(notes) = notes {
            body["notes"] = json!(notes);
        }

        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_queue?id=eq.{}&assigned_professional_id=eq.{}&status=in.(assigned,in_progress)",
                    queue_id, professional_id
                ),
                None,
                body,
            )
            .await?;
        first_row(rows)
    }

    pub async fn complete_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<CallSession>, CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_sessions?id=eq.{}&status=eq.in_progress",
                    session_id
                ),
                None,
                json!({
                    "status": CallSessionStatus::Completed,
                    "completed_at": now,
                }),
            )
            .await?;
        first_row(rows)
    }

    /// Cancellation applies to any non-terminal entry; a second cancel (or a
    /// cancel racing a completion) matches zero rows and is absorbed upstream.
    pub async fn cancel_entry(
        &self,
        queue_id: Uuid,
        notes: &str,
    ) -> Result<Option<QueueEntry>, CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_queue?id=eq.{}&status=in.(awaiting_payment,waiting,assigned,in_progress)",
                    queue_id
                ),
                None,
                json!({
                    "status": QueueEntryStatus::Cancelled,
                    "notes": notes,
                }),
            )
            .await?;
        first_row(rows)
    }

    pub async fn cancel_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<CallSession>, CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_sessions?id=eq.{}&status=in.(awaiting_payment,pending,in_progress)",
                    session_id
                ),
                None,
                json!({
                    "status": CallSessionStatus::Cancelled,
                    "cancelled_at": now,
                }),
            )
            .await?;
        first_row(rows)
    }

    /// Reassigns the entry to another professional without changing its
    /// status. Owner-guarded the same way completion is.
    pub async fn transfer_entry(
        &self,
        queue_id: Uuid,
        from_professional_id: Uuid,
        to_professional_id: Uuid,
        notes: &str,
    ) -> Result<Option<QueueEntry>, CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_queue?id=eq.{}&assigned_professional_id=eq.{}&status=in.(assigned,in_progress)",
                    queue_id, from_professional_id
                ),
                None,
                json!({
                    "assigned_professional_id": to_professional_id,
                    "notes": notes,
                }),
            )
            .await?;
        first_row(rows)
    }

    pub async fn reassign_session(
        &self,
        session_id: Uuid,
        from_professional_id: Uuid,
        to_professional_id: Uuid,
    ) -> Result<Option<CallSession>, CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_sessions?id=eq.{}&professional_id=eq.{}",
                    session_id, from_professional_id
                ),
                None,
                json!({ "professional_id": to_professional_id }),
            )
            .await?;
        first_row(rows)
    }

    // ==========================================================================
    // EXPIRY SWEEP
    // ==========================================================================

    /// Sessions whose payment window lapsed: still `awaiting_payment` past
    /// their TTL. The status filter makes a re-run match nothing.
    pub async fn expire_awaiting_payment(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CallSession>, CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_sessions?status=eq.awaiting_payment&expires_at=lt.{}",
                    pg_timestamp(now)
                ),
                None,
                json!({ "status": CallSessionStatus::Failed }),
            )
            .await?;
        parse_rows(rows)
    }

    /// Sessions nobody ever claimed: still `pending` past their TTL.
    pub async fn expire_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CallSession>, CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_sessions?status=eq.pending&expires_at=lt.{}",
                    pg_timestamp(now)
                ),
                None,
                json!({
                    "status": CallSessionStatus::Cancelled,
                    "cancelled_at": now,
                }),
            )
            .await?;
        parse_rows(rows)
    }

    /// Cancels the queue entry of an expired session. Guarded to unclaimed
    /// entries only; anything a professional already holds is left alone.
    pub async fn cancel_unclaimed_entry(
        &self,
        session_id: Uuid,
        notes: &str,
    ) -> Result<usize, CallQueueError> {
        let rows = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_queue?call_session_id=eq.{}&status=in.(awaiting_payment,waiting)",
                    session_id
                ),
                None,
                json!({
                    "status": QueueEntryStatus::Cancelled,
                    "notes": notes,
                }),
            )
            .await?;
        Ok(rows.len())
    }
}

// PostgREST filter-friendly instant: seconds precision, `Z` suffix.
fn pg_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn first_row<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Option<T>, CallQueueError> {
    match rows.into_iter().next() {
        None => Ok(None),
        Some(row) => serde_json::from_value(row)
            .map(Some)
            .map_err(|e| CallQueueError::DatabaseError {
                message: format!("Failed to parse returned row: {}", e),
            }),
    }
}

fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, CallQueueError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|e| CallQueueError::DatabaseError {
                message: format!("Failed to parse returned row: {}", e),
            })
        })
        .collect()
}
