// libs/payment-cell/src/services/mercadopago.rs
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::{
    CreatePreferenceRequest, PaymentError, PaymentInfo, PaymentSearchResponse, PreferenceResponse,
};

type HmacSha256 = Hmac<Sha256>;

/// Mercado Pago REST client, narrowed to what the call flow needs: payment
/// lookup, payment search by correlation id, and checkout preference creation.
pub struct MercadoPagoClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl MercadoPagoClient {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        if !config.is_payment_configured() {
            return Err(PaymentError::NotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            base_url: config.mercadopago_base_url.clone(),
            access_token: config.mercadopago_access_token.clone(),
        })
    }

    /// GET /v1/payments/{id}
    pub async fn get_payment(&self, payment_id: &str) -> Result<PaymentInfo, PaymentError> {
        let url = format!("{}/v1/payments/{}", self.base_url, payment_id);
        debug!("Fetching payment {} from gateway", payment_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Payment lookup failed for {}: {} - {}", payment_id, status, response_text);
            return Err(PaymentError::GatewayError(format!(
                "HTTP {}: {}",
                status, response_text
            )));
        }

        let payment: PaymentInfo = serde_json::from_str(&response_text)?;
        info!(
            "Payment {} status={} external_reference={:?}",
            payment.id, payment.status, payment.external_reference
        );
        Ok(payment)
    }

    /// GET /v1/payments/search?external_reference={reference}
    ///
    /// Returns the first approved payment correlated to the reference, or
    /// `None` when nothing approved exists yet. Transport and gateway errors
    /// surface as `Err` so callers can tell "no payment" from "could not ask".
    pub async fn find_approved_payment(
        &self,
        external_reference: &str,
    ) -> Result<Option<PaymentInfo>, PaymentError> {
        let url = format!(
            "{}/v1/payments/search?external_reference={}",
            self.base_url, external_reference
        );
        debug!("Searching approved payment for reference {}", external_reference);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!(
                "Payment search failed for {}: {} - {}",
                external_reference, status, response_text
            );
            return Err(PaymentError::GatewayError(format!(
                "HTTP {}: {}",
                status, response_text
            )));
        }

        let search: PaymentSearchResponse = serde_json::from_str(&response_text)?;
        Ok(search.results.into_iter().find(|p| p.is_approved()))
    }

    /// POST /checkout/preferences
    pub async fn create_preference(
        &self,
        request: CreatePreferenceRequest,
    ) -> Result<PreferenceResponse, PaymentError> {
        let url = format!("{}/checkout/preferences", self.base_url);
        info!(
            "Creating checkout preference for reference {}",
            request.external_reference
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Preference creation failed: {} - {}", status, response_text);
            return Err(PaymentError::GatewayError(format!(
                "HTTP {}: {}",
                status, response_text
            )));
        }

        let preference: PreferenceResponse = serde_json::from_str(&response_text)?;
        info!("Created checkout preference {}", preference.id);
        Ok(preference)
    }
}

/// Validates the gateway's `x-signature` header.
///
/// The header carries `ts=...,v1=...` pairs; `v1` is the hex HMAC-SHA256 of
/// the manifest `id:{data.id};request-id:{x-request-id};ts:{ts};` keyed with
/// the webhook secret. The gateway lowercases alphanumeric ids in the
/// manifest, so we do too.
pub fn verify_webhook_signature(
    secret: &str,
    x_signature: &str,
    x_request_id: &str,
    data_id: &str,
) -> bool {
    let mut ts = None;
    let mut v1 = None;

    for part in x_signature.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim().to_string()),
            Some(("v1", value)) => v1 = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let (Some(ts), Some(v1)) = (ts, v1) else {
        warn!("x-signature header missing ts or v1 component");
        return false;
    };

    let manifest = format!(
        "id:{};request-id:{};ts:{};",
        data_id.to_lowercase(),
        x_request_id,
        ts
    );

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(manifest.as_bytes());

    let computed: String = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    computed == v1.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "webhook-secret";

    fn sign(manifest: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(manifest.as_bytes());
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    #[test]
    fn test_valid_signature_accepted() {
        let v1 = sign("id:12345;request-id:req-abc;ts:1704908010;");
        let header = format!("ts=1704908010,v1={}", v1);

        assert!(verify_webhook_signature(SECRET, &header, "req-abc", "12345"));
    }

    #[test]
    fn test_id_is_lowercased_in_manifest() {
        let v1 = sign("id:abc123;request-id:req-abc;ts:1704908010;");
        let header = format!("ts=1704908010,v1={}", v1);

        assert!(verify_webhook_signature(SECRET, &header, "req-abc", "ABC123"));
    }

    #[test]
    fn test_tampered_payment_id_rejected() {
        let v1 = sign("id:12345;request-id:req-abc;ts:1704908010;");
        let header = format!("ts=1704908010,v1={}", v1);

        assert!(!verify_webhook_signature(SECRET, &header, "req-abc", "99999"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let v1 = sign("id:12345;request-id:req-abc;ts:1704908010;");
        let header = format!("ts=1704908010,v1={}", v1);

        assert!(!verify_webhook_signature("other-secret", &header, "req-abc", "12345"));
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(!verify_webhook_signature(SECRET, "garbage", "req-abc", "12345"));
        assert!(!verify_webhook_signature(SECRET, "ts=1704908010", "req-abc", "12345"));
        assert!(!verify_webhook_signature(SECRET, "", "req-abc", "12345"));
    }
}
