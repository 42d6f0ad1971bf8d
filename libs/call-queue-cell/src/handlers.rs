// libs/call-queue-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::jwt::validate_token;

use crate::models::{
    CallQueueCellState, CallQueueError, CancelCallRequest, CompleteCallRequest,
    EnqueueCallRequest, QueueListQuery, TakeCallRequest, TransferCallRequest,
};
use crate::services::engine::CallQueueEngine;

fn engine_for(state: &CallQueueCellState) -> CallQueueEngine {
    CallQueueEngine::new(Arc::clone(&state.config), state.notifications.clone())
}

fn map_queue_error(err: CallQueueError) -> AppError {
    match err {
        CallQueueError::EntryNotFound => AppError::NotFound("Queue entry not found".to_string()),
        CallQueueError::SessionNotFound => AppError::NotFound("Call session not found".to_string()),
        CallQueueError::NotAvailable { reason } => AppError::NotFound(reason),
        CallQueueError::CapacityExceeded { current, max } => {
            AppError::BadRequest(format!("At capacity ({}/{})", current, max))
        }
        CallQueueError::TargetUnavailable { reason } => AppError::NotFound(reason),
        CallQueueError::MissingIdentity => AppError::BadRequest(
            "Contact information (name plus email or phone) or a signed-in patient is required"
                .to_string(),
        ),
        CallQueueError::PaymentSetupFailed(message) => AppError::ExternalService(message),
        CallQueueError::DatabaseError { message } => AppError::Database(message),
        CallQueueError::ValidationError { message } => AppError::BadRequest(message),
    }
}

fn require_professional(user: &User) -> Result<(), AppError> {
    if user.is_professional() {
        Ok(())
    } else {
        Err(AppError::Auth("Professional role required".to_string()))
    }
}

fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Auth("Admin role required".to_string()))
    }
}

/// Patient-facing enqueue. Public: identity is either the optional bearer
/// token or the contact details in the body.
#[axum::debug_handler]
pub async fn enqueue_call(
    State(state): State<CallQueueCellState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Json(request): Json<EnqueueCallRequest>,
) -> Result<Json<Value>, AppError> {
    let user = match &auth {
        Some(TypedHeader(bearer)) => Some(
            validate_token(bearer.token(), &state.config.supabase_jwt_secret)
                .map_err(AppError::Auth)?,
        ),
        None => None,
    };

    let response = engine_for(&state)
        .enqueue(request, user.as_ref())
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({
        "success": true,
        "session_id": response.session_id,
        "session_token": response.session_token,
        "queue_id": response.queue_id,
        "price_info": response.price_info,
    })))
}

/// Patient polling endpoint, keyed by the opaque session token handed out at
/// enqueue time. No auth: the token itself is the capability.
#[axum::debug_handler]
pub async fn get_call_status(
    State(state): State<CallQueueCellState>,
    Path(session_token): Path<String>,
) -> Result<Json<Value>, AppError> {
    let status = engine_for(&state)
        .patient_status(&session_token)
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({
        "success": true,
        "status": status.status,
        "payment_confirmed": status.payment_confirmed,
        "professional_joined": status.professional_joined,
        "room_name": status.room_name,
    })))
}

#[axum::debug_handler]
pub async fn get_queue(
    State(state): State<CallQueueCellState>,
    Extension(user): Extension<User>,
    Query(query): Query<QueueListQuery>,
) -> Result<Json<Value>, AppError> {
    require_professional(&user)?;

    let (queue, waiting_count) = engine_for(&state)
        .queue_snapshot(query.status.as_deref())
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({
        "success": true,
        "queue": queue,
        "waiting_count": waiting_count,
    })))
}

#[axum::debug_handler]
pub async fn take_call(
    State(state): State<CallQueueCellState>,
    Extension(user): Extension<User>,
    Json(request): Json<TakeCallRequest>,
) -> Result<Json<Value>, AppError> {
    require_professional(&user)?;

    let response = engine_for(&state)
        .take(&user, request)
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({
        "success": true,
        "queue_id": response.queue_id,
        "session_id": response.session_id,
        "patient": response.patient,
        "room_name": response.room_name,
        "payment_info": response.payment_info,
    })))
}

#[axum::debug_handler]
pub async fn complete_call(
    State(state): State<CallQueueCellState>,
    Extension(user): Extension<User>,
    Path(queue_id): Path<Uuid>,
    Json(request): Json<CompleteCallRequest>,
) -> Result<Json<Value>, AppError> {
    require_professional(&user)?;

    engine_for(&state)
        .complete(&user, queue_id, request)
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn transfer_call(
    State(state): State<CallQueueCellState>,
    Extension(user): Extension<User>,
    Path(queue_id): Path<Uuid>,
    Json(request): Json<TransferCallRequest>,
) -> Result<Json<Value>, AppError> {
    require_professional(&user)?;

    let transferred_to = engine_for(&state)
        .transfer(&user, queue_id, request)
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({
        "success": true,
        "transferred_to": transferred_to,
    })))
}

/// Public cancel: patients hold nothing but the queue id from their enqueue
/// response, so no credential is demanded to give up a spot.
#[axum::debug_handler]
pub async fn cancel_call(
    State(state): State<CallQueueCellState>,
    Path(queue_id): Path<Uuid>,
    Json(request): Json<CancelCallRequest>,
) -> Result<Json<Value>, AppError> {
    engine_for(&state)
        .cancel(queue_id, request.reason)
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({ "success": true })))
}

/// Admin-triggered expiry sweep for requests that outlived their window.
#[axum::debug_handler]
pub async fn expire_calls(
    State(state): State<CallQueueCellState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let sweep = engine_for(&state)
        .expire_stale(Utc::now())
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({
        "success": true,
        "expired_awaiting_payment": sweep.expired_awaiting_payment,
        "expired_pending": sweep.expired_pending,
        "cancelled_entries": sweep.cancelled_entries,
    })))
}
