// libs/call-queue-cell/src/lib.rs
//! # Call Queue Cell
//!
//! On-demand telemedicine call requests: patients enqueue a call, pay when
//! prepayment is required, and poll an opaque session token while on-call
//! professionals claim work from the shared queue.
//!
//! The lifecycle lives in two paired rows created together: a `call_sessions`
//! row (payment and room state) and a `call_queue` row (the claimable unit).
//! Three rules keep the pair honest under concurrency:
//!
//! - prepaid requests are born `awaiting_payment` and stay invisible to
//!   professionals until the payment webhook promotes them to `waiting`;
//! - claiming is a conditional update on `status = 'waiting'`, so of N
//!   professionals racing for one call exactly one wins;
//! - per-professional capacity is a counter moved only by conditional
//!   increments and floored decrements, claimed before an entry and released
//!   on every exit path (complete, transfer, cancel, lost race).

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    CallQueueCellState, CallQueueError, CallSession, CallSessionStatus, PriceInfo, Professional,
    QueueEntry, QueueEntryStatus,
};
pub use router::call_queue_routes;
pub use services::{price_for_instant, CallQueueEngine, CallQueueStore};
