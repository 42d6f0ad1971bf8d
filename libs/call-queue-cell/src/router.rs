// libs/call-queue-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{
    cancel_call, complete_call, enqueue_call, expire_calls, get_call_status, get_queue, take_call,
    transfer_call,
};
use crate::models::CallQueueCellState;

pub fn call_queue_routes(config: Arc<AppConfig>, notifications: NotificationDispatcher) -> Router {
    let state = CallQueueCellState {
        config: config.clone(),
        notifications,
    };

    // Patient-facing surface. Enqueue accepts an optional bearer token;
    // status and cancel are capability-style (session token / queue id).
    let public_routes = Router::new()
        .route("/", post(enqueue_call))
        .route("/status/{session_token}", get(get_call_status))
        .route("/{queue_id}/cancel", post(cancel_call));

    // Professional and admin surface.
    let protected_routes = Router::new()
        .route("/queue", get(get_queue))
        .route("/take", post(take_call))
        .route("/{queue_id}/complete", post(complete_call))
        .route("/{queue_id}/transfer", post(transfer_call))
        .route("/expire", post(expire_calls))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
