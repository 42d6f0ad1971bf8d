use std::sync::Arc;

use axum::{
    Json,
    Router,
    extract::State,
    routing::get,
};
use serde_json::{Value, json};

use call_queue_cell::call_queue_routes;
use notification_cell::NotificationDispatcher;
use payment_cell::payment_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>, notifications: NotificationDispatcher) -> Router {
    Router::new()
        .route("/", get(|| async { "Salus Clinic API is running!" }))
        .route("/health", get(health_check))
        .with_state(state.clone())
        .nest("/calls", call_queue_routes(state.clone(), notifications.clone()))
        .nest("/payments", payment_routes(state, notifications))
}

/// Deploy readiness summary: reports which integrations have credentials
/// without calling any of them.
async fn health_check(State(config): State<Arc<AppConfig>>) -> Json<Value> {
    let ready = config.is_configured() && config.is_payment_configured();
    Json(json!({
        "status": if ready { "ok" } else { "degraded" },
        "database_configured": config.is_configured(),
        "payments_configured": config.is_payment_configured(),
        "webhook_signature_configured": config.is_webhook_signature_configured(),
        "notifications_configured": config.is_notifications_configured(),
    }))
}
