// libs/call-queue-cell/src/services/engine.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use notification_cell::{NotificationDispatcher, NotificationEvent};
use payment_cell::{CreatePreferenceRequest, MercadoPagoClient, PreferenceItem, PreferenceResponse};
use shared_config::AppConfig;
use shared_models::auth::User;

use crate::models::{
    CallQueueError, CallSession, CallSessionStatus, CallStatusResponse, CompleteCallRequest,
    EnqueueCallRequest, EnqueueCallResponse, ExpireSweepResponse, PatientSnapshot, PaymentSummary,
    PriceInfo, QueueEntry, QueueEntryStatus, TakeCallRequest, TakeCallResponse,
    TransferCallRequest,
};
use crate::services::pricing::price_for_instant;
use crate::services::store::CallQueueStore;

/// How long an unanswered request stays eligible before the expiry sweep
/// collects it.
const SESSION_TTL_MINUTES: i64 = 30;

const LISTABLE_STATUSES: [&str; 6] = [
    "awaiting_payment",
    "waiting",
    "assigned",
    "in_progress",
    "completed",
    "cancelled",
];

/// The call lifecycle state machine.
///
/// All multi-row transitions follow the same shape: the capacity counter is
/// claimed first (the conditional increment is the authoritative check), the
/// queue entry CAS second, and any loss after the increment releases the slot
/// again. Once the entry CAS has committed, the transition is authoritative
/// and follow-up writes that fail are logged rather than unwound.
pub struct CallQueueEngine {
    store: CallQueueStore,
    config: Arc<AppConfig>,
    notifications: NotificationDispatcher,
}

impl CallQueueEngine {
    pub fn new(config: Arc<AppConfig>, notifications: NotificationDispatcher) -> Self {
        Self {
            store: CallQueueStore::new(&config),
            config,
            notifications,
        }
    }

    // ==========================================================================
    // ENQUEUE
    // ==========================================================================

    /// Creates the session/entry pair for an on-demand call request.
    ///
    /// With prepayment the checkout preference is created first: if the
    /// gateway is down the patient could never pay, so nothing is inserted
    /// and the caller gets the gateway error instead of a dead entry. The
    /// pair then starts in `awaiting_payment`, invisible to professionals
    /// until the payment webhook promotes it.
    pub async fn enqueue(
        &self,
        request: EnqueueCallRequest,
        user: Option<&User>,
    ) -> Result<EnqueueCallResponse, CallQueueError> {
        let identity = resolve_identity(&request, user)?;
        let now = Utc::now();
        let mut price = price_for_instant(now);

        let session_id = Uuid::new_v4();
        let session_token = Uuid::new_v4().simple().to_string();

        let mut payment_reference = None;
        if request.requires_prepayment {
            let preference = self.create_checkout_preference(session_id, &price).await?;
            price.payment_url = Some(preference.init_point.clone());
            payment_reference = Some(preference.id);
        }

        let (session_status, entry_status) = if request.requires_prepayment {
            (
                CallSessionStatus::AwaitingPayment,
                QueueEntryStatus::AwaitingPayment,
            )
        } else {
            (CallSessionStatus::Pending, QueueEntryStatus::Waiting)
        };

        let session = CallSession {
            id: session_id,
            patient_id: identity.patient_id,
            contact_name: identity.name.clone(),
            contact_email: identity.email.clone(),
            contact_phone: identity.phone.clone(),
            status: session_status,
            session_token: session_token.clone(),
            price_amount: price.amount,
            price_tier: price.tier_label.clone(),
            time_slot: price.time_slot_label.clone(),
            credits_held: price.amount,
            credits_charged: None,
            payment_verified: false,
            payment_reference,
            professional_id: None,
            created_at: now,
            expires_at: now + Duration::minutes(SESSION_TTL_MINUTES),
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        };

        let entry = QueueEntry {
            id: Uuid::new_v4(),
            call_session_id: session_id,
            patient_name: identity.name.clone(),
            patient_email: identity.email,
            patient_phone: identity.phone,
            status: entry_status,
            priority: request.priority.unwrap_or(0),
            created_at: now,
            assigned_professional_id: None,
            assigned_at: None,
            answered_at: None,
            notes: None,
        };

        self.store.create_call(&session, &entry).await?;
        info!(
            "Enqueued call session {} (entry {}, {}, {} tier)",
            session.id,
            entry.id,
            entry.status.as_str(),
            price.tier_label
        );

        // Prepaid requests announce themselves only after the webhook
        // promotes them to waiting.
        if entry.status == QueueEntryStatus::Waiting {
            self.notifications.dispatch(NotificationEvent::CallWaiting {
                queue_id: entry.id,
                patient_name: identity.name,
                price_tier: session.price_tier.clone(),
            });
        }

        Ok(EnqueueCallResponse {
            session_id,
            session_token,
            queue_id: entry.id,
            price_info: price,
        })
    }

    async fn create_checkout_preference(
        &self,
        session_id: Uuid,
        price: &PriceInfo,
    ) -> Result<PreferenceResponse, CallQueueError> {
        let gateway = MercadoPagoClient::new(&self.config)
            .map_err(|e| CallQueueError::PaymentSetupFailed(e.to_string()))?;

        let request = CreatePreferenceRequest {
            items: vec![PreferenceItem {
                title: format!("Consulta de telemedicina ({})", price.tier_label),
                quantity: 1,
                unit_price: price.amount,
                currency_id: "BRL".to_string(),
            }],
            // The webhook resolves the paid session through this reference.
            external_reference: session_id.to_string(),
            notification_url: None,
        };

        gateway
            .create_preference(request)
            .await
            .map_err(|e| CallQueueError::PaymentSetupFailed(e.to_string()))
    }

    // ==========================================================================
    // TAKE
    // ==========================================================================

    /// Claims a call for a professional: the named entry, or the oldest
    /// waiting one.
    pub async fn take(
        &self,
        user: &User,
        request: TakeCallRequest,
    ) -> Result<TakeCallResponse, CallQueueError> {
        let professional_id = parse_professional_id(user)?;
        let professional = self
            .store
            .get_professional(professional_id)
            .await?
            .ok_or_else(|| CallQueueError::ValidationError {
                message: "No professional profile for this account".to_string(),
            })?;

        // Fast fail on the read; the conditional increment below is the
        // check that actually counts.
        if !professional.has_capacity() {
            return Err(CallQueueError::CapacityExceeded {
                current: professional.current_calls,
                max: professional.max_concurrent_calls,
            });
        }

        let entry = match request.queue_id {
            Some(queue_id) => {
                let entry = self
                    .store
                    .get_entry(queue_id)
                    .await?
                    .ok_or(CallQueueError::EntryNotFound)?;
                match entry.status {
                    QueueEntryStatus::Waiting => entry,
                    QueueEntryStatus::AwaitingPayment => {
                        return Err(CallQueueError::NotAvailable {
                            reason: "Call is awaiting payment confirmation".to_string(),
                        })
                    }
                    QueueEntryStatus::Assigned | QueueEntryStatus::InProgress => {
                        return Err(CallQueueError::NotAvailable {
                            reason: "Call was already taken".to_string(),
                        })
                    }
                    QueueEntryStatus::Completed | QueueEntryStatus::Cancelled => {
                        return Err(CallQueueError::NotAvailable {
                            reason: "Call is no longer available".to_string(),
                        })
                    }
                }
            }
            None => self
                .store
                .find_oldest_waiting()
                .await?
                .ok_or_else(|| CallQueueError::NotAvailable {
                    reason: "No calls are waiting".to_string(),
                })?,
        };

        if !self.store.claim_professional_slot(professional_id).await? {
            return Err(CallQueueError::CapacityExceeded {
                current: professional.max_concurrent_calls,
                max: professional.max_concurrent_calls,
            });
        }

        let claimed = match self
            .store
            .claim_entry(entry.id, professional_id, Utc::now())
            .await
        {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                self.release_slot_quietly(professional_id).await;
                return Err(CallQueueError::NotAvailable {
                    reason: "Call was just taken by another professional".to_string(),
                });
            }
            Err(e) => {
                self.release_slot_quietly(professional_id).await;
                return Err(e);
            }
        };

        let session = match self.store.get_session(claimed.call_session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.unwind_claim(&claimed, professional_id).await;
                return Err(CallQueueError::SessionNotFound);
            }
            Err(e) => {
                self.unwind_claim(&claimed, professional_id).await;
                return Err(e);
            }
        };

        let (credits_charged, payment_verified) = self.verify_payment(&session).await;

        let started = self
            .store
            .start_session(
                session.id,
                professional_id,
                credits_charged,
                payment_verified,
                Utc::now(),
            )
            .await?;
        if started.is_none() {
            // The patient cancelled in the window between claim and start.
            self.unwind_claim(&claimed, professional_id).await;
            return Err(CallQueueError::NotAvailable {
                reason: "Call was cancelled before it could start".to_string(),
            });
        }

        info!(
            "Professional {} took call {} (session {}, verified={})",
            professional_id, claimed.id, session.id, payment_verified
        );

        self.notifications.dispatch(NotificationEvent::CallTaken {
            queue_id: claimed.id,
            patient_name: claimed.patient_name.clone(),
            patient_email: claimed.patient_email.clone(),
            patient_phone: claimed.patient_phone.clone(),
            professional_name: professional.full_name.clone(),
        });

        let room_name = session.room_name();
        Ok(TakeCallResponse {
            queue_id: claimed.id,
            session_id: session.id,
            patient: PatientSnapshot {
                name: claimed.patient_name,
                email: claimed.patient_email,
                phone: claimed.patient_phone,
            },
            room_name,
            payment_info: PaymentSummary {
                amount_charged: credits_charged,
                payment_verified,
                price_tier: session.price_tier,
            },
        })
    }

    /// Best-effort payment check at answer time. The call proceeds either
    /// way; an unverified charge keeps `payment_verified = false` on the
    /// session so reconciliation can pick it up later.
    async fn verify_payment(&self, session: &CallSession) -> (f64, bool) {
        if session.payment_verified {
            return (session.credits_held, true);
        }

        let Some(reference) = session.payment_reference.as_deref() else {
            // Pay-later request, nothing to verify yet.
            debug!("Session {} has no payment reference", session.id);
            return (session.credits_held, false);
        };

        let gateway = match MercadoPagoClient::new(&self.config) {
            Ok(gateway) => gateway,
            Err(e) => {
                warn!(
                    "Payment gateway unavailable for session {} verification: {}",
                    session.id, e
                );
                return (session.credits_held, false);
            }
        };

        match gateway.find_approved_payment(&session.id.to_string()).await {
            Ok(Some(payment)) => (
                payment.transaction_amount.unwrap_or(session.credits_held),
                true,
            ),
            Ok(None) => {
                warn!(
                    "No approved payment found for session {} (reference {}), proceeding unverified",
                    session.id, reference
                );
                (session.credits_held, false)
            }
            Err(e) => {
                warn!(
                    "Payment verification for session {} failed, proceeding unverified: {}",
                    session.id, e
                );
                (session.credits_held, false)
            }
        }
    }

    // ==========================================================================
    // COMPLETE / TRANSFER / CANCEL
    // ==========================================================================

    pub async fn complete(
        &self,
        user: &User,
        queue_id: Uuid,
        request: CompleteCallRequest,
    ) -> Result<(), CallQueueError> {
        let professional_id = parse_professional_id(user)?;
        let entry = self
            .store
            .get_entry(queue_id)
            .await?
            .ok_or(CallQueueError::EntryNotFound)?;

        let now = Utc::now();
        let notes = request.notes.as_deref().map(|notes| {
            append_note(
                entry.notes.as_deref(),
                &audit_line(now, &format!("completed: {}", notes)),
            )
        });

        let completed = self
            .store
            .complete_entry(queue_id, professional_id, notes.as_deref())
            .await?
            .ok_or_else(|| CallQueueError::NotAvailable {
                reason: "Call not found or not assigned to you".to_string(),
            })?;

        match self
            .store
            .complete_session(completed.call_session_id, now)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => warn!(
                "Session {} was not in progress when its entry completed",
                completed.call_session_id
            ),
            Err(e) => error!(
                "Failed to close session {} after its entry completed: {}",
                completed.call_session_id, e
            ),
        }

        self.release_slot_quietly(professional_id).await;
        info!("Professional {} completed call {}", professional_id, queue_id);
        Ok(())
    }

    /// Hands an active call to another professional. The target must be
    /// active, marked available, and under capacity; their slot is claimed
    /// before the entry moves, and the source slot is released after.
    pub async fn transfer(
        &self,
        user: &User,
        queue_id: Uuid,
        request: TransferCallRequest,
    ) -> Result<Uuid, CallQueueError> {
        let from = parse_professional_id(user)?;
        let to = request.to_professional_id;
        if to == from {
            return Err(CallQueueError::ValidationError {
                message: "Cannot transfer a call to yourself".to_string(),
            });
        }

        let entry = self
            .store
            .get_entry(queue_id)
            .await?
            .ok_or(CallQueueError::EntryNotFound)?;
        if entry.assigned_professional_id != Some(from)
            || !matches!(
                entry.status,
                QueueEntryStatus::Assigned | QueueEntryStatus::InProgress
            )
        {
            return Err(CallQueueError::NotAvailable {
                reason: "Call not found or not assigned to you".to_string(),
            });
        }

        let target = self
            .store
            .get_professional(to)
            .await?
            .ok_or_else(|| CallQueueError::TargetUnavailable {
                reason: "Target professional not found".to_string(),
            })?;
        if !target.is_active || !target.is_available {
            return Err(CallQueueError::TargetUnavailable {
                reason: format!("{} is not accepting calls", target.full_name),
            });
        }
        if !target.has_capacity() {
            return Err(CallQueueError::CapacityExceeded {
                current: target.current_calls,
                max: target.max_concurrent_calls,
            });
        }

        if !self.store.claim_professional_slot(to).await? {
            return Err(CallQueueError::CapacityExceeded {
                current: target.max_concurrent_calls,
                max: target.max_concurrent_calls,
            });
        }

        let now = Utc::now();
        let reason = request.reason.as_deref().unwrap_or("unspecified");
        let notes = append_note(
            entry.notes.as_deref(),
            &audit_line(
                now,
                &format!("transferred to {}: {}", target.full_name, reason),
            ),
        );

        let transferred = match self.store.transfer_entry(queue_id, from, to, &notes).await {
            Ok(Some(transferred)) => transferred,
            Ok(None) => {
                self.release_slot_quietly(to).await;
                return Err(CallQueueError::NotAvailable {
                    reason: "Call not found or not assigned to you".to_string(),
                });
            }
            Err(e) => {
                self.release_slot_quietly(to).await;
                return Err(e);
            }
        };

        match self
            .store
            .reassign_session(transferred.call_session_id, from, to)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => warn!(
                "Session {} did not follow its entry to professional {}",
                transferred.call_session_id, to
            ),
            Err(e) => error!(
                "Failed to move session {} to professional {}: {}",
                transferred.call_session_id, to, e
            ),
        }

        self.release_slot_quietly(from).await;
        info!("Call {} transferred from {} to {}", queue_id, from, to);
        Ok(to)
    }

    /// Patient-side cancellation. Deliberately forgiving: unknown or already
    /// terminal entries report success, since from the patient's side the
    /// call is gone either way.
    pub async fn cancel(
        &self,
        queue_id: Uuid,
        reason: Option<String>,
    ) -> Result<(), CallQueueError> {
        let Some(entry) = self.store.get_entry(queue_id).await? else {
            warn!("Cancel requested for unknown queue entry {}", queue_id);
            return Ok(());
        };

        let now = Utc::now();
        let reason = reason.as_deref().unwrap_or("unspecified");
        let notes = append_note(
            entry.notes.as_deref(),
            &audit_line(now, &format!("cancelled: {}", reason)),
        );

        let Some(cancelled) = self.store.cancel_entry(queue_id, &notes).await? else {
            debug!("Queue entry {} was already terminal", queue_id);
            return Ok(());
        };

        match self
            .store
            .cancel_session(cancelled.call_session_id, now)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => debug!(
                "Session {} was already terminal when its entry was cancelled",
                cancelled.call_session_id
            ),
            Err(e) => error!(
                "Failed to cancel session {} after its entry was cancelled: {}",
                cancelled.call_session_id, e
            ),
        }

        // The returned row still carries the assignment, so a call cancelled
        // mid-consultation frees its professional's slot instead of pinning
        // them at phantom capacity.
        if let Some(professional_id) = cancelled.assigned_professional_id {
            self.release_slot_quietly(professional_id).await;
        }

        info!("Cancelled queue entry {}: {}", queue_id, reason);
        Ok(())
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    /// Patient-facing poll, keyed by the opaque session token.
    pub async fn patient_status(
        &self,
        session_token: &str,
    ) -> Result<CallStatusResponse, CallQueueError> {
        let session = self
            .store
            .get_session_by_token(session_token)
            .await?
            .ok_or(CallQueueError::SessionNotFound)?;

        let room_name = (session.status == CallSessionStatus::InProgress)
            .then(|| session.room_name());

        Ok(CallStatusResponse {
            payment_confirmed: session.status != CallSessionStatus::AwaitingPayment,
            professional_joined: session.status == CallSessionStatus::InProgress,
            status: session.status,
            room_name,
        })
    }

    /// Professional dashboard listing. Defaults to the claimable pool;
    /// unpaid entries only show up when asked for by name.
    pub async fn queue_snapshot(
        &self,
        status: Option<&str>,
    ) -> Result<(Vec<QueueEntry>, usize), CallQueueError> {
        let filter = match status {
            None => Some("waiting"),
            Some("all") => None,
            Some(status) if LISTABLE_STATUSES.contains(&status) => Some(status),
            Some(other) => {
                return Err(CallQueueError::ValidationError {
                    message: format!("Unknown status filter: {}", other),
                })
            }
        };

        let entries = self.store.list_entries(filter).await?;
        let waiting_count = match filter {
            Some("waiting") => entries.len(),
            _ => self.store.count_waiting().await?,
        };

        Ok((entries, waiting_count))
    }

    // ==========================================================================
    // EXPIRY SWEEP
    // ==========================================================================

    /// Collects requests that outlived their window: unpaid sessions become
    /// `failed`, unclaimed ones `cancelled`, and their entries leave the
    /// queue with an audit note. Safe to re-run; a second sweep matches
    /// nothing.
    pub async fn expire_stale(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ExpireSweepResponse, CallQueueError> {
        let mut cancelled_entries = 0;

        let lapsed = self.store.expire_awaiting_payment(now).await?;
        for session in &lapsed {
            cancelled_entries += self
                .store
                .cancel_unclaimed_entry(
                    session.id,
                    &audit_line(now, "expired: payment window lapsed"),
                )
                .await?;
        }

        let unclaimed = self.store.expire_pending(now).await?;
        for session in &unclaimed {
            cancelled_entries += self
                .store
                .cancel_unclaimed_entry(
                    session.id,
                    &audit_line(now, "expired: no professional answered in time"),
                )
                .await?;
        }

        if !lapsed.is_empty() || !unclaimed.is_empty() {
            info!(
                "Expiry sweep: {} payment windows lapsed, {} calls never claimed",
                lapsed.len(),
                unclaimed.len()
            );
        }

        Ok(ExpireSweepResponse {
            expired_awaiting_payment: lapsed.len(),
            expired_pending: unclaimed.len(),
            cancelled_entries,
        })
    }

    // ==========================================================================
    // COMPENSATION HELPERS
    // ==========================================================================

    async fn release_slot_quietly(&self, professional_id: Uuid) {
        match self.store.release_professional_slot(professional_id).await {
            Ok(true) => {}
            Ok(false) => warn!(
                "Capacity counter for professional {} was already at zero",
                professional_id
            ),
            Err(e) => error!(
                "Failed to release capacity slot for professional {}: {}",
                professional_id, e
            ),
        }
    }

    async fn unwind_claim(&self, entry: &QueueEntry, professional_id: Uuid) {
        if let Err(e) = self
            .store
            .release_entry_claim(entry.id, professional_id)
            .await
        {
            error!("Failed to return entry {} to the queue: {}", entry.id, e);
        }
        self.release_slot_quietly(professional_id).await;
    }
}

#[derive(Debug)]
struct ResolvedIdentity {
    patient_id: Option<String>,
    name: String,
    email: String,
    phone: String,
}

/// Who is asking for the call: the bearer token when present, otherwise the
/// contact details in the request. Anonymous requests need a name and at
/// least one way to reach the patient.
fn resolve_identity(
    request: &EnqueueCallRequest,
    user: Option<&User>,
) -> Result<ResolvedIdentity, CallQueueError> {
    let name = clean(&request.contact_name);
    let email = clean(&request.contact_email);
    let phone = clean(&request.contact_phone);

    match user {
        Some(user) => {
            let email = email.or_else(|| user.email.clone());
            let name = name
                .or_else(|| user.email.clone())
                .ok_or(CallQueueError::MissingIdentity)?;
            Ok(ResolvedIdentity {
                patient_id: Some(user.id.clone()),
                name,
                email: email.unwrap_or_default(),
                phone: phone.unwrap_or_default(),
            })
        }
        None => {
            let name = name.ok_or(CallQueueError::MissingIdentity)?;
            if email.is_none() && phone.is_none() {
                return Err(CallQueueError::MissingIdentity);
            }
            Ok(ResolvedIdentity {
                patient_id: None,
                name,
                email: email.unwrap_or_default(),
                phone: phone.unwrap_or_default(),
            })
        }
    }
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn parse_professional_id(user: &User) -> Result<Uuid, CallQueueError> {
    Uuid::parse_str(&user.id).map_err(|_| CallQueueError::ValidationError {
        message: "Invalid professional id".to_string(),
    })
}

fn audit_line(now: DateTime<Utc>, text: &str) -> String {
    format!("[{}] {}", now.format("%Y-%m-%d %H:%M UTC"), text)
}

fn append_note(existing: Option<&str>, line: &str) -> String {
    match existing {
        Some(notes) => format!("{}\n{}", notes, line),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn anonymous_request(name: Option<&str>, email: Option<&str>, phone: Option<&str>) -> EnqueueCallRequest {
        EnqueueCallRequest {
            contact_name: name.map(String::from),
            contact_email: email.map(String::from),
            contact_phone: phone.map(String::from),
            requires_prepayment: false,
            priority: None,
        }
    }

    fn logged_in_user() -> User {
        User {
            id: "5f7f9f2a-42c1-4b6a-a0cd-26c1c77e0011".to_string(),
            email: Some("maria@example.com".to_string()),
            role: Some("patient".to_string()),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn test_anonymous_identity_needs_name_and_contact() {
        assert!(resolve_identity(&anonymous_request(None, None, None), None).is_err());
        assert!(resolve_identity(
            &anonymous_request(Some("Maria"), None, None),
            None
        )
        .is_err());
        assert!(resolve_identity(
            &anonymous_request(None, Some("maria@example.com"), None),
            None
        )
        .is_err());

        let identity = resolve_identity(
            &anonymous_request(Some("Maria"), None, Some("+5511999990000")),
            None,
        )
        .unwrap();
        assert_eq!(identity.name, "Maria");
        assert_eq!(identity.phone, "+5511999990000");
        assert!(identity.patient_id.is_none());
    }

    #[test]
    fn test_blank_contact_fields_do_not_count() {
        let result = resolve_identity(&anonymous_request(Some("  "), Some(""), None), None);
        assert_matches!(result.unwrap_err(), CallQueueError::MissingIdentity);
    }

    #[test]
    fn test_logged_in_identity_falls_back_to_account_email() {
        let user = logged_in_user();
        let identity =
            resolve_identity(&anonymous_request(None, None, None), Some(&user)).unwrap();
        assert_eq!(identity.patient_id.as_deref(), Some(user.id.as_str()));
        assert_eq!(identity.name, "maria@example.com");
        assert_eq!(identity.email, "maria@example.com");
    }

    #[test]
    fn test_logged_in_identity_prefers_request_fields() {
        let user = logged_in_user();
        let identity = resolve_identity(
            &anonymous_request(Some("Maria Souza"), Some("other@example.com"), None),
            Some(&user),
        )
        .unwrap();
        assert_eq!(identity.name, "Maria Souza");
        assert_eq!(identity.email, "other@example.com");
    }

    #[test]
    fn test_audit_lines_append_in_order() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 13, 45, 0).unwrap();
        let first = audit_line(now, "transferred to Dra. Ana Lima: overload");
        assert_eq!(
            first,
            "[2024-06-15 13:45 UTC] transferred to Dra. Ana Lima: overload"
        );

        let appended = append_note(Some(&first), &audit_line(now, "cancelled: patient gave up"));
        let lines: Vec<&str> = appended.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("transferred"));
        assert!(lines[1].contains("cancelled"));
    }
}
