//! Strategy-Based Admission Queues
//!
//! Per-key, priority-aware, window-aligned queues deciding for each inbound
//! request whether it proceeds now, waits for a later window, or is
//! rejected once its TTL passes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Queue Registry                          │
//! │        (remedy name, strategy)  ──►  Admission Queue         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────────────┐   ┌───────────────────────────────┐  │
//! │  │ Window accounting │   │ Wait list                     │  │
//! │  │ index, admitted   │   │ (priority, arrival, seq)      │  │
//! │  └───────────────────┘   └───────────────────────────────┘  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Rollover driver: wakes at window boundaries, promotes       │
//! │  waiters into the fresh quota                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod admission;
pub mod registry;
pub mod request;
pub mod strategy;
mod wait_list;

pub use admission::{AdmissionQueue, QueueSnapshot};
pub use registry::{QueueRegistry, RegisteredQueue};
pub use request::{Priority, Request, DEFAULT_PRIORITY};
pub use strategy::{AdmissionKey, Strategy};
