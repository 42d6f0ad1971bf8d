// libs/payment-cell/src/lib.rs
//! # Payment Cell
//!
//! Narrow Mercado Pago integration for the on-demand call flow: checkout
//! preference creation at enqueue time, webhook-driven payment confirmation,
//! and the credit ledger that makes confirmation exactly-once.
//!
//! The webhook handler promotes a paid session/entry pair from
//! `awaiting_payment` to claimable, guarded two ways:
//!
//! - promotions are conditional updates (`WHERE status = 'awaiting_payment'`),
//!   so late or duplicate deliveries cannot re-promote a live call;
//! - settlements insert into `credit_transactions` keyed by the gateway
//!   payment id, so each payment produces at most one credit.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    ConfirmationOutcome, CreatePreferenceRequest, CreditTransaction, PaymentCellState,
    PaymentError, PaymentInfo, PreferenceItem, PreferenceResponse,
};
pub use services::{verify_webhook_signature, MercadoPagoClient, PaymentConfirmationService};
pub use router::payment_routes;
