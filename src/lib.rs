//! Remedy Queue Library
//!
//! Strategy-based admission queues for an API gateway: per (remedy, strategy)
//! quota windows, priority-ordered waiting, TTL expiry, Prometheus metrics and
//! the HTTP surface that exposes them.

pub mod clock;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod remedy;
pub mod server;
