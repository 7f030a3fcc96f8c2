//! Contextual enrichment of segments.
//!
//! - `governor`: per (credential, model) minimum call spacing
//! - `failover`: credential/model routing state machine
//! - `retry`: attempt budget and backoff shared by both passes
//! - `engine`: `ContextEnricher`
//! - `reconcile`: patch-map second pass over failed segments

pub mod engine;
pub mod failover;
pub mod governor;
pub mod prompt;
pub mod reconcile;
pub mod retry;

#[cfg(test)]
mod tests;

pub use engine::{ContextEnricher, EnrichmentConfig, EnrichmentReport};
pub use failover::{FailoverPolicy, Route, Transition};
pub use governor::RateGovernor;
pub use retry::RetryPolicy;
