// libs/call-queue-cell/src/services/mod.rs

pub mod engine;
pub mod pricing;
pub mod store;

pub use engine::CallQueueEngine;
pub use pricing::price_for_instant;
pub use store::CallQueueStore;
