use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub mercadopago_base_url: String,
    pub mercadopago_access_token: String,
    pub mercadopago_webhook_secret: String,
    pub notification_email_api_url: String,
    pub notification_email_api_key: String,
    pub notification_email_from: String,
    pub notification_oncall_email: String,
    pub whatsapp_api_url: String,
    pub whatsapp_api_token: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            mercadopago_base_url: env::var("MERCADOPAGO_BASE_URL")
                .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            mercadopago_access_token: env::var("MERCADOPAGO_ACCESS_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("MERCADOPAGO_ACCESS_TOKEN not set, using empty value");
                    String::new()
                }),
            mercadopago_webhook_secret: env::var("MERCADOPAGO_WEBHOOK_SECRET")
                .unwrap_or_else(|_| String::new()),
            notification_email_api_url: env::var("NOTIFICATION_EMAIL_API_URL")
                .unwrap_or_else(|_| String::new()),
            notification_email_api_key: env::var("NOTIFICATION_EMAIL_API_KEY")
                .unwrap_or_else(|_| String::new()),
            notification_email_from: env::var("NOTIFICATION_EMAIL_FROM")
                .unwrap_or_else(|_| "atendimento@salusclinic.com.br".to_string()),
            notification_oncall_email: env::var("NOTIFICATION_ONCALL_EMAIL")
                .unwrap_or_else(|_| String::new()),
            whatsapp_api_url: env::var("WHATSAPP_API_URL")
                .unwrap_or_else(|_| String::new()),
            whatsapp_api_token: env::var("WHATSAPP_API_TOKEN")
                .unwrap_or_else(|_| String::new()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_payment_configured(&self) -> bool {
        !self.mercadopago_base_url.is_empty()
            && !self.mercadopago_access_token.is_empty()
    }

    pub fn is_webhook_signature_configured(&self) -> bool {
        !self.mercadopago_webhook_secret.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.notification_email_api_url.is_empty()
            && !self.notification_email_api_key.is_empty()
    }

    pub fn is_whatsapp_configured(&self) -> bool {
        !self.whatsapp_api_url.is_empty()
            && !self.whatsapp_api_token.is_empty()
    }

    pub fn is_notifications_configured(&self) -> bool {
        self.is_email_configured() || self.is_whatsapp_configured()
    }
}
