//! Event channel transports.
//!
//! This module provides the transport layer used by a [`Connection`](crate::connector::Connection):
//! - `HttpEventSource`: SSE stream with an HTTP long-polling fallback
//! - `SseDecoder`: incremental `text/event-stream` parsing
//!
//! A transport only knows how to open an authenticated stream of
//! [`Envelope`]s. Reconnection, backoff and dispatch live in the connector.

pub mod http;
pub mod sse;

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

pub use http::HttpEventSource;
pub use sse::{SseDecoder, SseEvent};

// ============================================================================
// Transport Kind
// ============================================================================

/// The concrete wire transport carrying events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Server-Sent Events over a single long-lived response. Preferred.
    Stream,
    /// Repeated HTTP long-poll requests. Fallback.
    Polling,
}

impl TransportKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Polling => "polling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stream" | "sse" => Ok(Self::Stream),
            "polling" | "poll" => Ok(Self::Polling),
            _ => Err(format!("unsupported transport: {value}")),
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A named event with its raw JSON payload, as delivered by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("unauthorized (HTTP {0})")]
    Unauthorized(u16),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    pub fn connection<E: fmt::Display>(err: E) -> Self {
        TransportError::Connection(err.to_string())
    }

    /// Auth rejections are final; everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Unauthorized(_) | TransportError::Closed)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        Self::Connection(value.to_string())
    }
}

// ============================================================================
// Event Source
// ============================================================================

/// A stream of envelopes. Ends (returns `None`) when the server closes it.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Envelope, TransportError>> + Send>>;

/// Opens authenticated event streams over a given transport.
///
/// Implementations must not retry internally; the connection task owns the
/// retry policy.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self, kind: TransportKind, credential: &str) -> Result<EventStream, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_parses_aliases() {
        assert_eq!("sse".parse::<TransportKind>().unwrap(), TransportKind::Stream);
        assert_eq!(" Polling ".parse::<TransportKind>().unwrap(), TransportKind::Polling);
        assert!("websocket".parse::<TransportKind>().is_err());
    }

    #[test]
    fn unauthorized_is_not_retryable() {
        assert!(TransportError::Connection("reset".into()).is_retryable());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!TransportError::Unauthorized(401).is_retryable());
        assert!(!TransportError::Closed.is_retryable());
    }

    #[test]
    fn envelope_payload_defaults_to_null() {
        let envelope: Envelope = serde_json::from_str(r#"{"event":"debt.updated"}"#).unwrap();
        assert_eq!(envelope.event, "debt.updated");
        assert!(envelope.payload.is_null());
    }
}
