// libs/payment-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::post, Router};

use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;

use crate::handlers::payment_webhook;
use crate::models::PaymentCellState;

/// Payment routes. The webhook is public by nature: the gateway authenticates
/// through the x-signature header, not a bearer token.
pub fn payment_routes(config: Arc<AppConfig>, notifications: NotificationDispatcher) -> Router {
    let state = PaymentCellState {
        config,
        notifications,
    };

    Router::new()
        .route("/webhook", post(payment_webhook))
        .with_state(state)
}
