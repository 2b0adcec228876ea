//! Actions a remedy asks the gateway to take for a request

use serde::{Deserialize, Serialize};

pub const TOO_MANY_REQUESTS_BODY: &str = "Too many requests";
pub const PLAIN_TEXT: &str = "text/plain";

/// Response sent in place of forwarding the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarlyResponse {
    pub status: u16,
    pub body: String,
    pub content_type: String,
}

/// Outcome of running a remedy against a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RemedyAction {
    /// Let the request through untouched
    NoOp,
    /// Answer the request directly
    EarlyResponse(EarlyResponse),
}

impl RemedyAction {
    /// Plain-text rejection with the given status
    pub fn too_many_requests(status: u16) -> Self {
        RemedyAction::EarlyResponse(EarlyResponse {
            status,
            body: TOO_MANY_REQUESTS_BODY.to_string(),
            content_type: PLAIN_TEXT.to_string(),
        })
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self, RemedyAction::NoOp)
    }
}
