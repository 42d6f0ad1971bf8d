use std::time::Duration;

use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::models::DispatcherSettings;
use notification_cell::{NotificationDispatcher, NotificationEvent};
use shared_utils::test_utils::TestConfig;

fn fast_settings() -> DispatcherSettings {
    DispatcherSettings {
        queue_capacity: 16,
        max_attempts: 3,
        retry_delay_ms: 10,
    }
}

fn payment_confirmed_event() -> NotificationEvent {
    NotificationEvent::PaymentConfirmed {
        session_id: Uuid::new_v4(),
        patient_name: "Maria Souza".to_string(),
        patient_email: "maria@example.com".to_string(),
        patient_phone: "+5511999990000".to_string(),
        amount: 109.00,
    }
}

async fn wait_for_requests(server: &MockServer, expected: usize) -> usize {
    for _ in 0..100 {
        let count = server.received_requests().await.map_or(0, |r| r.len());
        if count >= expected {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    server.received_requests().await.map_or(0, |r| r.len())
}

#[tokio::test]
async fn test_email_delivery_reaches_api() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("Authorization", "Bearer email-key"))
        .and(body_partial_json(serde_json::json!({
            "to": "maria@example.com",
            "subject": "Pagamento confirmado"
        })))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = TestConfig::default().to_app_config();
    config.notification_email_api_url = server.uri();
    config.notification_email_api_key = "email-key".to_string();

    let dispatcher = NotificationDispatcher::with_settings(&config, fast_settings());
    dispatcher.dispatch(payment_confirmed_event());

    assert_eq!(wait_for_requests(&server, 1).await, 1);
}

#[tokio::test]
async fn test_delivery_retries_after_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = TestConfig::default().to_app_config();
    config.notification_email_api_url = server.uri();
    config.notification_email_api_key = "email-key".to_string();

    let dispatcher = NotificationDispatcher::with_settings(&config, fast_settings());
    dispatcher.dispatch(payment_confirmed_event());

    // First attempt hits the 500, the retry lands on the 200 mock.
    assert_eq!(wait_for_requests(&server, 2).await, 2);
}

#[tokio::test]
async fn test_delivery_gives_up_after_max_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut config = TestConfig::default().to_app_config();
    config.notification_email_api_url = server.uri();
    config.notification_email_api_key = "email-key".to_string();

    let settings = DispatcherSettings {
        max_attempts: 2,
        ..fast_settings()
    };
    let dispatcher = NotificationDispatcher::with_settings(&config, settings);
    dispatcher.dispatch(payment_confirmed_event());

    assert_eq!(wait_for_requests(&server, 2).await, 2);

    // The worker survives a failed event and keeps draining the queue.
    dispatcher.dispatch(payment_confirmed_event());
    assert_eq!(wait_for_requests(&server, 4).await, 4);
}

#[tokio::test]
async fn test_call_waiting_without_oncall_inbox_is_skipped() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = TestConfig::default().to_app_config();
    config.notification_email_api_url = server.uri();
    config.notification_email_api_key = "email-key".to_string();
    // notification_oncall_email left empty: nowhere to send team alerts.

    let dispatcher = NotificationDispatcher::with_settings(&config, fast_settings());
    dispatcher.dispatch(NotificationEvent::CallWaiting {
        queue_id: Uuid::new_v4(),
        patient_name: "Maria Souza".to_string(),
        price_tier: "daytime".to_string(),
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 0);
}

#[tokio::test]
async fn test_call_taken_without_patient_email_skips_the_send() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = TestConfig::default().to_app_config();
    config.notification_email_api_url = server.uri();
    config.notification_email_api_key = "email-key".to_string();

    let dispatcher = NotificationDispatcher::with_settings(&config, fast_settings());
    // Phone-only patient: no address for the email channel to deliver to.
    dispatcher.dispatch(NotificationEvent::CallTaken {
        queue_id: Uuid::new_v4(),
        patient_name: "Maria Souza".to_string(),
        patient_email: String::new(),
        patient_phone: "+5511999990000".to_string(),
        professional_name: "Dra. Ana Lima".to_string(),
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 0);
}

#[tokio::test]
async fn test_payment_confirmed_without_phone_skips_whatsapp() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = TestConfig::default().to_app_config();
    config.whatsapp_api_url = server.uri();
    config.whatsapp_api_token = "wa-token".to_string();

    let dispatcher = NotificationDispatcher::with_settings(&config, fast_settings());
    dispatcher.dispatch(NotificationEvent::PaymentConfirmed {
        session_id: Uuid::new_v4(),
        patient_name: "Maria Souza".to_string(),
        patient_email: "maria@example.com".to_string(),
        patient_phone: String::new(),
        amount: 89.00,
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 0);
}

#[tokio::test]
async fn test_unconfigured_dispatcher_drops_without_error() {
    let config = TestConfig::default().to_app_config();

    let dispatcher = NotificationDispatcher::with_settings(&config, fast_settings());
    dispatcher.dispatch(payment_confirmed_event());
    dispatcher.dispatch(payment_confirmed_event());

    // Nothing to assert beyond "this neither blocks nor panics".
    tokio::time::sleep(Duration::from_millis(50)).await;
}
