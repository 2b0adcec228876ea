//! Remedies
//!
//! A remedy inspects an inbound request and tells the gateway whether to
//! forward it or answer early. The strategy-based queue remedy holds each
//! request until its (remedy, strategy) queue admits it, or rejects it once
//! its TTL passes.

pub mod action;
pub mod error;
pub mod plugin;

pub use action::{EarlyResponse, RemedyAction};
pub use error::RemedyError;
pub use plugin::{extract_priority, OnRequest, StrategyBasedQueuePlugin};
