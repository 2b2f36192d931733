//! HTTP route handlers.

pub mod batches;
pub mod events;
pub mod health;
pub mod labels;
pub mod lookup;
pub mod metrics;
