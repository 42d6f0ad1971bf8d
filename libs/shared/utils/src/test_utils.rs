use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub mercadopago_base_url: String,
    pub mercadopago_access_token: String,
    pub mercadopago_webhook_secret: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            mercadopago_base_url: "http://localhost:9000".to_string(),
            mercadopago_access_token: "TEST-access-token".to_string(),
            mercadopago_webhook_secret: String::new(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            mercadopago_base_url: self.mercadopago_base_url.clone(),
            mercadopago_access_token: self.mercadopago_access_token.clone(),
            mercadopago_webhook_secret: self.mercadopago_webhook_secret.clone(),
            notification_email_api_url: String::new(),
            notification_email_api_key: String::new(),
            notification_email_from: "atendimento@salusclinic.com.br".to_string(),
            notification_oncall_email: String::new(),
            whatsapp_api_url: String::new(),
            whatsapp_api_token: String::new(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn professional(email: &str) -> Self {
        Self::new(email, "professional")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST/gateway rows for wiremock-backed tests. Fields mirror the
/// production tables; tests overwrite what they need on the returned Value.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn call_session_response(id: &str, status: &str, session_token: &str) -> serde_json::Value {
        json!({
            "id": id,
            "patient_id": null,
            "contact_name": "Maria Souza",
            "contact_email": "maria@example.com",
            "contact_phone": "+5511999990000",
            "status": status,
            "session_token": session_token,
            "price_amount": 89.00,
            "price_tier": "daytime",
            "time_slot": "07:00-12:59",
            "credits_held": 89.00,
            "credits_charged": null,
            "payment_verified": false,
            "payment_reference": null,
            "professional_id": null,
            "created_at": "2024-01-01T12:00:00Z",
            "expires_at": "2024-01-01T12:30:00Z",
            "started_at": null,
            "completed_at": null,
            "cancelled_at": null
        })
    }

    pub fn queue_entry_response(id: &str, session_id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "call_session_id": session_id,
            "patient_name": "Maria Souza",
            "patient_email": "maria@example.com",
            "patient_phone": "+5511999990000",
            "status": status,
            "priority": 0,
            "created_at": "2024-01-01T12:00:00Z",
            "assigned_professional_id": null,
            "assigned_at": null,
            "answered_at": null,
            "notes": null
        })
    }

    pub fn professional_response(id: &str, current_calls: i32, max_concurrent_calls: i32) -> serde_json::Value {
        json!({
            "id": id,
            "full_name": "Dra. Ana Lima",
            "email": "ana.lima@salusclinic.com.br",
            "is_active": true,
            "is_available": true,
            "current_calls": current_calls,
            "max_concurrent_calls": max_concurrent_calls
        })
    }

    pub fn credit_transaction_response(gateway_payment_id: &str, session_id: &str, amount: f64) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "gateway_payment_id": gateway_payment_id,
            "call_session_id": session_id,
            "amount": amount,
            "created_at": "2024-01-01T12:05:00Z"
        })
    }

    pub fn mercadopago_payment_response(payment_id: &str, status: &str, external_reference: &str, amount: f64) -> serde_json::Value {
        json!({
            "id": payment_id.parse::<i64>().unwrap_or(0),
            "status": status,
            "status_detail": if status == "approved" { "accredited" } else { "pending_contingency" },
            "external_reference": external_reference,
            "transaction_amount": amount,
            "currency_id": "BRL",
            "date_approved": if status == "approved" { json!("2024-01-01T12:05:00.000-03:00") } else { json!(null) }
        })
    }

    pub fn mercadopago_preference_response(preference_id: &str) -> serde_json::Value {
        json!({
            "id": preference_id,
            "init_point": format!("https://www.mercadopago.com.br/checkout/v1/redirect?pref_id={}", preference_id),
            "sandbox_init_point": format!("https://sandbox.mercadopago.com.br/checkout/v1/redirect?pref_id={}", preference_id)
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "error": {
                "message": message,
                "code": code
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert!(app_config.is_payment_configured());
        assert!(!app_config.is_webhook_signature_configured());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::professional("oncall@example.com");
        assert_eq!(user.email, "oncall@example.com");
        assert_eq!(user.role, "professional");

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, Some(user.role.clone()));
        assert_eq!(user_model.id, user.id);
        assert!(user_model.is_professional());
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let secret = "test-secret";
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        assert!(token.contains('.'));
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_mock_rows_link_session_and_entry() {
        let session_id = Uuid::new_v4().to_string();
        let entry = MockSupabaseResponses::queue_entry_response(
            &Uuid::new_v4().to_string(),
            &session_id,
            "waiting",
        );
        assert_eq!(entry["call_session_id"], json!(session_id));
        assert_eq!(entry["status"], json!("waiting"));
    }
}
