//! Real-time client library for the ledgerline finance tracker.
//!
//! Keeps a client's view of debts, charges and notifications current while a
//! user session is active.
//!
//! # Architecture
//!
//! - `transport`: event sources (SSE stream, long-polling fallback)
//! - `connector`: the session's single connection, reconnects and handler registry
//! - `events`: inbound event kinds and typed payloads
//! - `notifications`: per-session notification store and templates
//! - `cache`: query cache, observers and the invalidation bridge
//! - `api`: REST queries the cache refetches
//! - `views`: bell badge, activity feed, admin audit log
//! - `realtime`: session lifecycle wiring
//! - `session`, `config`, `logging`: ambient plumbing

pub mod api;
pub mod cache;
pub mod config;
pub mod connector;
pub mod events;
pub mod logging;
pub mod notifications;
pub mod realtime;
pub mod session;
pub mod transport;
pub mod views;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError};
pub use cache::{CacheGroup, CacheInvalidationBridge, DataScope, QueryCache, QueryKey, QueryObserver, QueryState};
pub use config::{ConfigError, RealtimeConfig};
pub use connector::{Connection, ConnectionState, Connector, ReconnectPolicy};
pub use events::{DecodeError, EventKind, InboundEvent};
pub use notifications::{InitOutcome, NewNotification, Notification, NotificationStore};
pub use realtime::{RealtimeClient, SessionScope};
pub use session::{Credential, Session, SessionInfo};
pub use transport::{Envelope, EventSource, HttpEventSource, TransportError, TransportKind};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
