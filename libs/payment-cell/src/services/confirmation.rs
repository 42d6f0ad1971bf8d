// libs/payment-cell/src/services/confirmation.rs
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use notification_cell::{NotificationDispatcher, NotificationEvent};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{ConfirmationOutcome, PaymentError};
use crate::services::mercadopago::MercadoPagoClient;

/// The slice of a `call_sessions` row the confirmation flow reads.
#[derive(Debug, Deserialize)]
struct SessionRow {
    id: Uuid,
    contact_name: String,
    contact_email: String,
    contact_phone: String,
    price_tier: String,
    credits_held: f64,
}

/// Consumes asynchronous gateway notifications and promotes the paid
/// session/entry pair exactly once per gateway payment id.
///
/// Delivery is at-least-once and may arrive out of order, so every write in
/// here is conditional: promotions carry a status guard and the ledger insert
/// collides on the gateway payment id. A redelivered event falls through to
/// an absorbed no-op.
pub struct PaymentConfirmationService {
    supabase: SupabaseClient,
    gateway: MercadoPagoClient,
    notifications: NotificationDispatcher,
}

impl PaymentConfirmationService {
    pub fn new(
        config: &AppConfig,
        notifications: NotificationDispatcher,
    ) -> Result<Self, PaymentError> {
        Ok(Self {
            supabase: SupabaseClient::new(config),
            gateway: MercadoPagoClient::new(config)?,
            notifications,
        })
    }

    pub async fn process_payment_event(
        &self,
        payment_id: &str,
    ) -> Result<ConfirmationOutcome, PaymentError> {
        // Step 1: only approved payments progress the flow.
        let payment = self.gateway.get_payment(payment_id).await?;
        if !payment.is_approved() {
            info!("Payment {} is {}, nothing to settle", payment.id, payment.status);
            return Ok(ConfirmationOutcome::IgnoredStatus);
        }
        let gateway_payment_id = payment.id.to_string();

        // Step 2: redelivery guard. A ledger row means this payment already
        // produced its side effects.
        let existing: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/credit_transactions?gateway_payment_id=eq.{}&select=id",
                    gateway_payment_id
                ),
                None,
                None,
            )
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;
        if !existing.is_empty() {
            info!("Payment {} already settled, skipping", gateway_payment_id);
            return Ok(ConfirmationOutcome::AlreadyProcessed);
        }

        // Step 3: resolve the originating session through the correlation id
        // captured when the checkout preference was created.
        let Some(reference) = payment.external_reference.clone() else {
            warn!("Approved payment {} carries no external_reference", gateway_payment_id);
            return Ok(ConfirmationOutcome::UnknownReference);
        };
        let Ok(session_id) = Uuid::parse_str(&reference) else {
            warn!(
                "Payment {} external_reference {:?} is not a session id",
                gateway_payment_id, reference
            );
            return Ok(ConfirmationOutcome::UnknownReference);
        };

        let sessions: Vec<SessionRow> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/call_sessions?id=eq.{}", session_id),
                None,
                None,
            )
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;
        let Some(session) = sessions.into_iter().next() else {
            warn!(
                "Payment {} references unknown session {}",
                gateway_payment_id, session_id
            );
            return Ok(ConfirmationOutcome::UnknownReference);
        };

        let amount = payment.transaction_amount.unwrap_or(session.credits_held);
        if (amount - session.credits_held).abs() > 0.009 {
            warn!(
                "Payment {} settled R$ {:.2} but session {} held R$ {:.2}",
                gateway_payment_id, amount, session.id, session.credits_held
            );
        }

        // Step 4: conditional promotions. The status guard makes a late or
        // duplicate webhook a zero-row no-op instead of re-promoting an
        // already active or finished call.
        let promoted_sessions = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_sessions?id=eq.{}&status=eq.awaiting_payment",
                    session_id
                ),
                None,
                json!({ "status": "pending", "payment_verified": true }),
            )
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        let promoted_entries = self
            .supabase
            .write(
                Method::PATCH,
                &format!(
                    "/rest/v1/call_queue?call_session_id=eq.{}&status=eq.awaiting_payment",
                    session_id
                ),
                None,
                json!({ "status": "waiting" }),
            )
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        if promoted_sessions.is_empty() && promoted_entries.is_empty() {
            info!(
                "Session {} already past awaiting_payment, recording settlement only",
                session_id
            );
        }

        // Step 5: settle the ledger. A concurrent delivery of the same event
        // may have won the insert between the guard above and here.
        let inserted = self
            .supabase
            .insert_once(
                "/rest/v1/credit_transactions?on_conflict=gateway_payment_id",
                None,
                json!({
                    "gateway_payment_id": gateway_payment_id,
                    "call_session_id": session_id,
                    "amount": amount,
                }),
            )
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;
        if inserted.is_empty() {
            info!("Payment {} settled by a concurrent delivery", gateway_payment_id);
            return Ok(ConfirmationOutcome::AlreadyProcessed);
        }

        info!(
            "Payment {} settled: R$ {:.2} for session {}",
            gateway_payment_id, amount, session_id
        );

        // Step 6: best-effort notifications. The call is now visible to the
        // on-call team, and the patient learns the payment went through.
        if let Some(queue_id) = promoted_entries
            .first()
            .and_then(|entry| entry.get("id"))
            .and_then(|id| id.as_str())
            .and_then(|id| Uuid::parse_str(id).ok())
        {
            self.notifications.dispatch(NotificationEvent::CallWaiting {
                queue_id,
                patient_name: session.contact_name.clone(),
                price_tier: session.price_tier.clone(),
            });
        }
        self.notifications.dispatch(NotificationEvent::PaymentConfirmed {
            session_id,
            patient_name: session.contact_name,
            patient_email: session.contact_email,
            patient_phone: session.contact_phone,
            amount,
        });

        Ok(ConfirmationOutcome::Processed)
    }
}
