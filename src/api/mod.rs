//! REST queries backing the cached views.

mod client;
mod types;

use std::time::Duration;

pub use client::ApiClient;
pub use types::{Charge, ChargeStatus, Debt, DebtStatus, Stats};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("credential rejected (HTTP {0})")]
    Unauthorized(u16),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            return Self::Decode(value.to_string());
        }
        Self::Request(value.to_string())
    }
}
