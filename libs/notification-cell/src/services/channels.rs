use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{NotificationError, NotificationEvent};

/// A delivery transport. Channels render the event themselves; an event a
/// channel cannot address (no recipient for that transport) is skipped, not
/// an error.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}

struct EmailMessage {
    to: String,
    subject: String,
    body: String,
}

/// Transactional email over a simple JSON HTTP API.
pub struct EmailChannel {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
    oncall: String,
}

impl EmailChannel {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        if !config.is_email_configured() {
            return Err(NotificationError::NotConfigured("email"));
        }

        Ok(Self {
            client: Client::new(),
            api_url: config.notification_email_api_url.clone(),
            api_key: config.notification_email_api_key.clone(),
            from: config.notification_email_from.clone(),
            oncall: config.notification_oncall_email.clone(),
        })
    }

    fn render(&self, event: &NotificationEvent) -> Option<EmailMessage> {
        match event {
            NotificationEvent::CallWaiting { queue_id, patient_name, price_tier } => {
                if self.oncall.is_empty() {
                    return None;
                }
                Some(EmailMessage {
                    to: self.oncall.clone(),
                    subject: "New on-demand call waiting".to_string(),
                    body: format!(
                        "Patient {} is waiting for an on-demand call (tier: {}, queue entry {}).",
                        patient_name, price_tier, queue_id
                    ),
                })
            }
            // Patients may enqueue with a phone number only.
            NotificationEvent::CallTaken { patient_name, patient_email, professional_name, .. } => {
                if patient_email.is_empty() {
                    return None;
                }
                Some(EmailMessage {
                    to: patient_email.clone(),
                    subject: "Sua consulta vai começar".to_string(),
                    body: format!(
                        "Olá {}, o(a) profissional {} está entrando na sua chamada. Mantenha a página aberta.",
                        patient_name, professional_name
                    ),
                })
            }
            NotificationEvent::PaymentConfirmed { patient_name, patient_email, amount, .. } => {
                if patient_email.is_empty() {
                    return None;
                }
                Some(EmailMessage {
                    to: patient_email.clone(),
                    subject: "Pagamento confirmado".to_string(),
                    body: format!(
                        "Olá {}, recebemos seu pagamento de R$ {:.2}. Você entrou na fila de atendimento e será chamado(a) em instantes.",
                        patient_name, amount
                    ),
                })
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        let Some(message) = self.render(event) else {
            debug!("Email channel has no recipient for {} event, skipping", event.kind());
            return Ok(());
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&json!({
                "from": self.from,
                "to": message.to,
                "subject": message.subject,
                "text": message.body,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let response_text = response.text().await?;
            error!("Email API rejected {} event: {} - {}", event.kind(), status, response_text);
            return Err(NotificationError::DeliveryRejected(format!(
                "HTTP {}: {}",
                status, response_text
            )));
        }

        debug!("Email for {} event sent to {}", event.kind(), message.to);
        Ok(())
    }
}

/// WhatsApp text messages over the business API gateway.
pub struct WhatsAppChannel {
    client: Client,
    api_url: String,
    api_token: String,
}

impl WhatsAppChannel {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        if !config.is_whatsapp_configured() {
            return Err(NotificationError::NotConfigured("whatsapp"));
        }

        Ok(Self {
            client: Client::new(),
            api_url: config.whatsapp_api_url.clone(),
            api_token: config.whatsapp_api_token.clone(),
        })
    }

    fn render(&self, event: &NotificationEvent) -> Option<(String, String)> {
        match event {
            // On-call alerts go out by email only.
            NotificationEvent::CallWaiting { .. } => None,
            // Patients may enqueue with an email address only.
            NotificationEvent::CallTaken { patient_name, patient_phone, professional_name, .. } => {
                if patient_phone.is_empty() {
                    return None;
                }
                Some((
                    patient_phone.clone(),
                    format!(
                        "Olá {}! O(a) profissional {} está entrando na sua chamada agora.",
                        patient_name, professional_name
                    ),
                ))
            }
            NotificationEvent::PaymentConfirmed { patient_name, patient_phone, amount, .. } => {
                if patient_phone.is_empty() {
                    return None;
                }
                Some((
                    patient_phone.clone(),
                    format!(
                        "Olá {}! Pagamento de R$ {:.2} confirmado. Você já está na fila de atendimento.",
                        patient_name, amount
                    ),
                ))
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        let Some((to, body)) = self.render(event) else {
            debug!("WhatsApp channel has no recipient for {} event, skipping", event.kind());
            return Ok(());
        };

        let response = self
            .client
            .post(format!("{}/messages", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Content-Type", "application/json")
            .json(&json!({
                "to": to,
                "type": "text",
                "text": { "body": body },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let response_text = response.text().await?;
            error!("WhatsApp API rejected {} event: {} - {}", event.kind(), status, response_text);
            return Err(NotificationError::DeliveryRejected(format!(
                "HTTP {}: {}",
                status, response_text
            )));
        }

        debug!("WhatsApp message for {} event sent to {}", event.kind(), to);
        Ok(())
    }
}
