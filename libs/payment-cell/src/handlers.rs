// libs/payment-cell/src/handlers.rs
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use shared_models::error::AppError;

use crate::models::{PaymentCellState, WebhookEnvelope, WebhookQuery};
use crate::services::confirmation::PaymentConfirmationService;
use crate::services::mercadopago::verify_webhook_signature;

/// Gateway webhook endpoint.
///
/// Accepts both the JSON envelope (`{"type": "payment", "data": {"id": ...}}`)
/// and the legacy IPN query form (`?topic=payment&id=...`). The gateway
/// retries anything that is not a 200, so every outcome after the authenticity
/// check acknowledges: the settlement guard makes redelivery harmless, and a
/// retry storm against a failing endpoint helps nobody.
#[axum::debug_handler]
pub async fn payment_webhook(
    State(state): State<PaymentCellState>,
    Query(params): Query<WebhookQuery>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    if !state.config.is_payment_configured() {
        error!("Webhook received but the payment gateway is not configured");
        return Err(AppError::Internal("Payment gateway not configured".to_string()));
    }

    let envelope: Option<WebhookEnvelope> = if body.trim().is_empty() {
        None
    } else {
        match serde_json::from_str(&body) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!("Webhook body is not valid JSON: {}", e);
                None
            }
        }
    };

    let (event_type, payment_id) = extract_event(&params, envelope.as_ref());

    let Some(event_type) = event_type else {
        error!("Webhook carries neither a JSON envelope nor IPN parameters");
        return Err(AppError::Internal("Unrecognized webhook payload".to_string()));
    };

    if event_type != "payment" {
        debug!("Ignoring {} webhook event", event_type);
        return Ok(Json(json!({
            "received": true,
            "processed": false,
            "reason": "ignored_event_type"
        })));
    }

    let Some(payment_id) = payment_id else {
        error!("Payment webhook without a payment id");
        return Err(AppError::Internal("Payment event missing payment id".to_string()));
    };

    if state.config.is_webhook_signature_configured() {
        let x_signature = headers.get("x-signature").and_then(|v| v.to_str().ok());
        let x_request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let valid = x_signature.is_some_and(|signature| {
            verify_webhook_signature(
                &state.config.mercadopago_webhook_secret,
                signature,
                x_request_id,
                &payment_id,
            )
        });
        if !valid {
            warn!("Rejected webhook for payment {}: invalid signature", payment_id);
            return Err(AppError::Auth("Invalid webhook signature".to_string()));
        }
    } else {
        warn!("MERCADOPAGO_WEBHOOK_SECRET not set, skipping signature verification");
    }

    let service = PaymentConfirmationService::new(&state.config, state.notifications.clone())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    match service.process_payment_event(&payment_id).await {
        Ok(outcome) => {
            let mut response = json!({
                "received": true,
                "processed": outcome.processed()
            });
            if let Some(reason) = outcome.reason() {
                response["reason"] = json!(reason);
            }
            Ok(Json(response))
        }
        Err(e) => {
            error!("Webhook processing failed for payment {}: {}", payment_id, e);
            Ok(Json(json!({
                "received": true,
                "processed": false,
                "reason": "processing_error"
            })))
        }
    }
}

fn extract_event(
    params: &WebhookQuery,
    envelope: Option<&WebhookEnvelope>,
) -> (Option<String>, Option<String>) {
    let event_type = envelope
        .and_then(|e| e.event_type.clone())
        .or_else(|| params.event_type.clone())
        .or_else(|| params.topic.clone());

    let payment_id = envelope
        .and_then(|e| e.data.as_ref())
        .and_then(|data| data.id.as_ref())
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .or_else(|| params.data_id.clone())
        .or_else(|| params.id.clone());

    (event_type, payment_id)
}
