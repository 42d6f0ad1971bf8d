use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use call_queue_cell::call_queue_routes;
use notification_cell::NotificationDispatcher;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

struct QueueHarness {
    supabase: MockServer,
    gateway: MockServer,
    config: shared_config::AppConfig,
}

impl QueueHarness {
    async fn new() -> Self {
        let supabase = MockServer::start().await;
        let gateway = MockServer::start().await;

        let mut config = TestConfig::default().to_app_config();
        config.supabase_url = supabase.uri();
        config.mercadopago_base_url = gateway.uri();

        Self { supabase, gateway, config }
    }

    fn router(&self) -> axum::Router {
        let notifications = NotificationDispatcher::new(&self.config);
        call_queue_routes(Arc::new(self.config.clone()), notifications)
    }

    fn token_for(&self, user: &TestUser) -> String {
        JwtTestUtils::create_test_token(user, &self.config.supabase_jwt_secret, Some(1))
    }

    async fn send(
        &self,
        http_method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(http_method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = if bytes.is_empty() {
            json!(null)
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn supabase_patch_body(&self, url_path: &str) -> Value {
        let requests = self.supabase.received_requests().await.unwrap();
        let request = requests
            .iter()
            .find(|r| r.method == "PATCH" && r.url.path() == url_path)
            .unwrap();
        serde_json::from_slice(&request.body).unwrap()
    }
}

fn assigned_entry(queue_id: &str, session_id: &str, professional_id: &str) -> Value {
    let mut entry = MockSupabaseResponses::queue_entry_response(queue_id, session_id, "assigned");
    entry["assigned_professional_id"] = json!(professional_id);
    entry["assigned_at"] = json!("2024-01-01T12:05:00Z");
    entry["answered_at"] = json!("2024-01-01T12:05:00Z");
    entry
}

// ==============================================================================
// COMPLETE
// ==============================================================================

#[tokio::test]
async fn test_complete_call_releases_the_capacity_slot() {
    let harness = QueueHarness::new().await;
    let professional = TestUser::professional("oncall@example.com");
    let token = harness.token_for(&professional);
    let queue_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .and(query_param("id", format!("eq.{}", queue_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assigned_entry(&queue_id, &session_id, &professional.id)
        ])))
        .mount(&harness.supabase)
        .await;

    let mut completed = assigned_entry(&queue_id, &session_id, &professional.id);
    completed["status"] = json!("completed");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .and(query_param("assigned_professional_id", format!("eq.{}", professional.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([completed])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    let mut session =
        MockSupabaseResponses::call_session_response(&session_id, "completed", "e5f6a7b8c9d0e1f2");
    session["completed_at"] = json!("2024-01-01T12:25:00Z");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_sessions"))
        .and(query_param("status", "eq.in_progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([session])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/release_call_slot"))
        .and(body_partial_json(json!({ "professional_uuid": professional.id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send(
            "POST",
            &format!("/{}/complete", queue_id),
            Some(&token),
            Some(json!({ "notes": "resolved" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    // Clinical notes arrive timestamped on the entry's audit trail.
    let patch_body = harness.supabase_patch_body("/rest/v1/call_queue").await;
    assert_eq!(patch_body["status"], json!("completed"));
    assert!(patch_body["notes"].as_str().unwrap().ends_with("completed: resolved"));
}

#[tokio::test]
async fn test_complete_frees_the_slot_even_if_the_session_write_fails() {
    let harness = QueueHarness::new().await;
    let professional = TestUser::professional("oncall@example.com");
    let token = harness.token_for(&professional);
    let queue_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .and(query_param("id", format!("eq.{}", queue_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assigned_entry(&queue_id, &session_id, &professional.id)
        ])))
        .mount(&harness.supabase)
        .await;

    let mut completed = assigned_entry(&queue_id, &session_id, &professional.id);
    completed["status"] = json!("completed");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .and(query_param("assigned_professional_id", format!("eq.{}", professional.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([completed])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    // The entry is already terminal and its CAS can never match again, so
    // the slot release has to happen on this pass.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_sessions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/release_call_slot"))
        .and(body_partial_json(json!({ "professional_uuid": professional.id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send(
            "POST",
            &format!("/{}/complete", queue_id),
            Some(&token),
            Some(json!({ "notes": "resolved" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_complete_refuses_someone_elses_call() {
    let harness = QueueHarness::new().await;
    let professional = TestUser::professional("oncall@example.com");
    let token = harness.token_for(&professional);
    let queue_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assigned_entry(&queue_id, &session_id, &Uuid::new_v4().to_string())
        ])))
        .mount(&harness.supabase)
        .await;

    // The conditional update carries the caller's id, so it matches nothing.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/release_call_slot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(0)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send("POST", &format!("/{}/complete", queue_id), Some(&token), Some(json!({})))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Call not found or not assigned to you"));
}

#[tokio::test]
async fn test_complete_unknown_call_is_not_found() {
    let harness = QueueHarness::new().await;
    let professional = TestUser::professional("oncall@example.com");
    let token = harness.token_for(&professional);

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send(
            "POST",
            &format!("/{}/complete", Uuid::new_v4()),
            Some(&token),
            Some(json!({})),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
}

// ==============================================================================
// TRANSFER
// ==============================================================================

#[tokio::test]
async fn test_transfer_moves_the_call_and_its_capacity() {
    let harness = QueueHarness::new().await;
    let source = TestUser::professional("oncall@example.com");
    let token = harness.token_for(&source);
    let target_id = Uuid::new_v4().to_string();
    let queue_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .and(query_param("id", format!("eq.{}", queue_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assigned_entry(&queue_id, &session_id, &source.id)
        ])))
        .mount(&harness.supabase)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/professionals"))
        .and(query_param("id", format!("eq.{}", target_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::professional_response(&target_id, 0, 2)
        ])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/claim_call_slot"))
        .and(body_partial_json(json!({ "professional_uuid": target_id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    let mut moved = assigned_entry(&queue_id, &session_id, &target_id);
    moved["notes"] = json!("[2024-01-01 12:10 UTC] transferred to Dra. Ana Lima: overload");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .and(query_param("assigned_professional_id", format!("eq.{}", source.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([moved])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_sessions"))
        .and(query_param("professional_id", format!("eq.{}", source.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::call_session_response(&session_id, "in_progress", "f6a7b8c9d0e1f2a3")
        ])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/release_call_slot"))
        .and(body_partial_json(json!({ "professional_uuid": source.id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send(
            "POST",
            &format!("/{}/transfer", queue_id),
            Some(&token),
            Some(json!({ "to_professional_id": target_id, "reason": "overload" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["transferred_to"], json!(target_id));

    let patch_body = harness.supabase_patch_body("/rest/v1/call_queue").await;
    assert_eq!(patch_body["assigned_professional_id"], json!(target_id));
    assert!(patch_body["notes"]
        .as_str()
        .unwrap()
        .contains("transferred to Dra. Ana Lima: overload"));

    // Payment was settled when the call started; a handover never re-verifies.
    assert_eq!(harness.gateway.received_requests().await.map_or(0, |r| r.len()), 0);
}

#[tokio::test]
async fn test_transfer_to_unavailable_target_is_refused() {
    let harness = QueueHarness::new().await;
    let source = TestUser::professional("oncall@example.com");
    let token = harness.token_for(&source);
    let target_id = Uuid::new_v4().to_string();
    let queue_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assigned_entry(&queue_id, &session_id, &source.id)
        ])))
        .mount(&harness.supabase)
        .await;

    let mut target = MockSupabaseResponses::professional_response(&target_id, 0, 2);
    target["is_available"] = json!(false);
    Mock::given(method("GET"))
        .and(path("/rest/v1/professionals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([target])))
        .mount(&harness.supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/claim_call_slot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(0)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send(
            "POST",
            &format!("/{}/transfer", queue_id),
            Some(&token),
            Some(json!({ "to_professional_id": target_id })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Dra. Ana Lima is not accepting calls"));
}

#[tokio::test]
async fn test_transfer_to_full_target_is_refused() {
    let harness = QueueHarness::new().await;
    let source = TestUser::professional("oncall@example.com");
    let token = harness.token_for(&source);
    let target_id = Uuid::new_v4().to_string();
    let queue_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assigned_entry(&queue_id, &session_id, &source.id)
        ])))
        .mount(&harness.supabase)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/professionals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::professional_response(&target_id, 2, 2)
        ])))
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send(
            "POST",
            &format!("/{}/transfer", queue_id),
            Some(&token),
            Some(json!({ "to_professional_id": target_id })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("At capacity (2/2)"));
}

#[tokio::test]
async fn test_transfer_to_self_is_rejected_without_any_lookup() {
    let harness = QueueHarness::new().await;
    let source = TestUser::professional("oncall@example.com");
    let token = harness.token_for(&source);

    let (status, body) = harness
        .send(
            "POST",
            &format!("/{}/transfer", Uuid::new_v4()),
            Some(&token),
            Some(json!({ "to_professional_id": source.id })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Cannot transfer a call to yourself"));
    assert_eq!(harness.supabase.received_requests().await.map_or(0, |r| r.len()), 0);
}

// ==============================================================================
// CANCEL
// ==============================================================================

#[tokio::test]
async fn test_cancel_waiting_call_leaves_capacity_alone() {
    let harness = QueueHarness::new().await;
    let queue_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::queue_entry_response(&queue_id, &session_id, "waiting")
        ])))
        .mount(&harness.supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::queue_entry_response(&queue_id, &session_id, "cancelled")
        ])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::call_session_response(&session_id, "cancelled", "a7b8c9d0e1f2a3b4")
        ])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/release_call_slot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(0)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send(
            "POST",
            &format!("/{}/cancel", queue_id),
            None,
            Some(json!({ "reason": "patient gave up" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let patch_body = harness.supabase_patch_body("/rest/v1/call_queue").await;
    assert!(patch_body["notes"].as_str().unwrap().ends_with("cancelled: patient gave up"));
}

#[tokio::test]
async fn test_cancel_assigned_call_frees_the_slot() {
    let harness = QueueHarness::new().await;
    let professional_id = Uuid::new_v4().to_string();
    let queue_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assigned_entry(&queue_id, &session_id, &professional_id)
        ])))
        .mount(&harness.supabase)
        .await;

    let mut cancelled = assigned_entry(&queue_id, &session_id, &professional_id);
    cancelled["status"] = json!("cancelled");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .mount(&harness.supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::call_session_response(&session_id, "cancelled", "b8c9d0e1f2a3b4c5")
        ])))
        .mount(&harness.supabase)
        .await;

    // Mid-consultation cancellation must hand the slot back.
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/release_call_slot"))
        .and(body_partial_json(json!({ "professional_uuid": professional_id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send("POST", &format!("/{}/cancel", queue_id), None, Some(json!({})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_cancel_frees_the_assigned_slot_even_if_the_session_write_fails() {
    let harness = QueueHarness::new().await;
    let professional_id = Uuid::new_v4().to_string();
    let queue_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assigned_entry(&queue_id, &session_id, &professional_id)
        ])))
        .mount(&harness.supabase)
        .await;

    let mut cancelled = assigned_entry(&queue_id, &session_id, &professional_id);
    cancelled["status"] = json!("cancelled");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    // A retry would take the forgiving already-terminal path without ever
    // seeing the assignment, so the release has to happen on this pass.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_sessions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/release_call_slot"))
        .and(body_partial_json(json!({ "professional_uuid": professional_id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send("POST", &format!("/{}/cancel", queue_id), None, Some(json!({})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_cancel_unknown_call_still_reports_success() {
    let harness = QueueHarness::new().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&harness.supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send("POST", &format!("/{}/cancel", Uuid::new_v4()), None, Some(json!({})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_cancel_finished_call_is_a_noop() {
    let harness = QueueHarness::new().await;
    let queue_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::queue_entry_response(&queue_id, &session_id, "completed")
        ])))
        .mount(&harness.supabase)
        .await;

    // The status guard on the update filters the terminal row out.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness
        .send("POST", &format!("/{}/cancel", queue_id), None, Some(json!({})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

// ==============================================================================
// EXPIRY SWEEP
// ==============================================================================

#[tokio::test]
async fn test_expire_sweep_requires_admin_role() {
    let harness = QueueHarness::new().await;
    let professional = TestUser::professional("oncall@example.com");
    let token = harness.token_for(&professional);

    let (status, body) = harness.send("POST", "/expire", Some(&token), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("Admin role required"));
    assert_eq!(harness.supabase.received_requests().await.map_or(0, |r| r.len()), 0);
}

#[tokio::test]
async fn test_expire_sweep_counts_each_category() {
    let harness = QueueHarness::new().await;
    let admin = TestUser::admin("ops@example.com");
    let token = harness.token_for(&admin);
    let unpaid_session = Uuid::new_v4().to_string();
    let unclaimed_session = Uuid::new_v4().to_string();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_sessions"))
        .and(query_param("status", "eq.awaiting_payment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::call_session_response(&unpaid_session, "failed", "c9d0e1f2a3b4c5d6")
        ])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_sessions"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::call_session_response(&unclaimed_session, "cancelled", "d0e1f2a3b4c5d6e7")
        ])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .and(query_param("call_session_id", format!("eq.{}", unpaid_session)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::queue_entry_response(
                &Uuid::new_v4().to_string(),
                &unpaid_session,
                "cancelled"
            )
        ])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .and(query_param("call_session_id", format!("eq.{}", unclaimed_session)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::queue_entry_response(
                &Uuid::new_v4().to_string(),
                &unclaimed_session,
                "cancelled"
            )
        ])))
        .expect(1)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness.send("POST", "/expire", Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["expired_awaiting_payment"], json!(1));
    assert_eq!(body["expired_pending"], json!(1));
    assert_eq!(body["cancelled_entries"], json!(2));
}

#[tokio::test]
async fn test_expire_sweep_rerun_matches_nothing() {
    let harness = QueueHarness::new().await;
    let admin = TestUser::admin("ops@example.com");
    let token = harness.token_for(&admin);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&harness.supabase)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/call_queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&harness.supabase)
        .await;

    let (status, body) = harness.send("POST", "/expire", Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired_awaiting_payment"], json!(0));
    assert_eq!(body["expired_pending"], json!(0));
    assert_eq!(body["cancelled_entries"], json!(0));
}

// ==============================================================================
// PATH VALIDATION
// ==============================================================================

#[tokio::test]
async fn test_lifecycle_routes_reject_malformed_ids() {
    let harness = QueueHarness::new().await;
    let professional = TestUser::professional("oncall@example.com");
    let token = harness.token_for(&professional);

    let response = harness
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/not-a-uuid/complete")
                .header("Authorization", format!("Bearer {}", token))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.supabase.received_requests().await.map_or(0, |r| r.len()), 0);
}
