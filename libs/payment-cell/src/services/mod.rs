// libs/payment-cell/src/services/mod.rs

pub mod confirmation;
pub mod mercadopago;

pub use confirmation::PaymentConfirmationService;
pub use mercadopago::{verify_webhook_signature, MercadoPagoClient};
