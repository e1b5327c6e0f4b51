//! Inbound event kinds and payloads.
//!
//! The server names events with dotted strings. Every name this client
//! understands maps to one `EventKind`, and every payload decodes into one
//! `InboundEvent` variant, so consumers match exhaustively instead of
//! comparing strings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::DataScope;

pub const EVENT_NOTIFICATION: &str = "notification";
pub const EVENT_DEBT_CREATED: &str = "debt.created";
pub const EVENT_DEBT_UPDATED: &str = "debt.updated";
pub const EVENT_PAYMENT_RECEIVED: &str = "payment.received";
pub const EVENT_DISPUTE_CREATED: &str = "dispute.created";
pub const EVENT_DATA_UPDATED: &str = "data.updated";
pub const EVENT_ADMIN_AUDIT_LOG: &str = "admin.audit-log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Notification,
    DebtCreated,
    DebtUpdated,
    PaymentReceived,
    DisputeCreated,
    DataUpdated,
    AdminAuditLog,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => EVENT_NOTIFICATION,
            Self::DebtCreated => EVENT_DEBT_CREATED,
            Self::DebtUpdated => EVENT_DEBT_UPDATED,
            Self::PaymentReceived => EVENT_PAYMENT_RECEIVED,
            Self::DisputeCreated => EVENT_DISPUTE_CREATED,
            Self::DataUpdated => EVENT_DATA_UPDATED,
            Self::AdminAuditLog => EVENT_ADMIN_AUDIT_LOG,
        }
    }

    pub const fn all() -> &'static [EventKind] {
        &[
            EventKind::Notification,
            EventKind::DebtCreated,
            EventKind::DebtUpdated,
            EventKind::PaymentReceived,
            EventKind::DisputeCreated,
            EventKind::DataUpdated,
            EventKind::AdminAuditLog,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EventKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| DecodeError::UnknownEvent(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("invalid payload for {event}: {message}")]
    Payload { event: EventKind, message: String },
}

// ----------------------------------------------------------------------------
// Payloads
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericNotice {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtCreated {
    pub debt_id: Option<String>,
    pub debtor_name: Option<String>,
    pub debtor_email: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtUpdated {
    pub debt_id: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceived {
    pub debt_id: Option<String>,
    pub debtor_name: Option<String>,
    pub debtor_email: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeCreated {
    pub debt_id: Option<String>,
    pub dispute_id: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataUpdated {
    #[serde(rename = "type", default)]
    pub tag: String,
    pub timestamp: Option<Value>,
}

impl DataUpdated {
    pub fn scope(&self) -> DataScope {
        DataScope::from_tag(&self.tag)
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds.
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
    #[serde(other)]
    Other,
}

impl AuditLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Other => "other",
        }
    }
}

fn default_level() -> AuditLevel {
    AuditLevel::Info
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogRecord {
    #[serde(default)]
    pub id: String,
    pub action: String,
    #[serde(default = "default_level")]
    pub level: AuditLevel,
    #[serde(default, alias = "userEmail")]
    pub actor: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "entity")]
    pub resource: Option<String>,
    #[serde(alias = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

// ----------------------------------------------------------------------------
// InboundEvent
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Notification(GenericNotice),
    DebtCreated(DebtCreated),
    DebtUpdated(DebtUpdated),
    PaymentReceived(PaymentReceived),
    DisputeCreated(DisputeCreated),
    DataUpdated(DataUpdated),
    AdminAuditLog(AuditLogRecord),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Notification(_) => EventKind::Notification,
            Self::DebtCreated(_) => EventKind::DebtCreated,
            Self::DebtUpdated(_) => EventKind::DebtUpdated,
            Self::PaymentReceived(_) => EventKind::PaymentReceived,
            Self::DisputeCreated(_) => EventKind::DisputeCreated,
            Self::DataUpdated(_) => EventKind::DataUpdated,
            Self::AdminAuditLog(_) => EventKind::AdminAuditLog,
        }
    }

    pub fn decode(name: &str, payload: &Value) -> Result<Self, DecodeError> {
        let kind: EventKind = name.parse()?;
        Self::decode_kind(kind, payload)
    }

    pub fn decode_kind(kind: EventKind, payload: &Value) -> Result<Self, DecodeError> {
        Ok(match kind {
            EventKind::Notification => Self::Notification(parse(kind, payload)?),
            EventKind::DebtCreated => Self::DebtCreated(parse(kind, payload)?),
            EventKind::DebtUpdated => Self::DebtUpdated(parse(kind, payload)?),
            EventKind::PaymentReceived => Self::PaymentReceived(parse(kind, payload)?),
            EventKind::DisputeCreated => Self::DisputeCreated(parse(kind, payload)?),
            EventKind::DataUpdated => Self::DataUpdated(parse(kind, payload)?),
            EventKind::AdminAuditLog => Self::AdminAuditLog(parse(kind, payload)?),
        })
    }
}

fn parse<T: DeserializeOwned>(kind: EventKind, payload: &Value) -> Result<T, DecodeError> {
    T::deserialize(payload).map_err(|e| DecodeError::Payload {
        event: kind,
        message: e.to_string(),
    })
}
