//! A single authenticated event-channel connection.
//!
//! The handle is cheap to clone. A background task owns the transport stream,
//! reconnects with a fixed delay up to a bounded number of attempts, and
//! dispatches every envelope to the handler registered for its event name.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RealtimeConfig;
use crate::session::Credential;
use crate::transport::{Envelope, EventSource, EventStream, TransportError, TransportKind};

// ============================================================================
// Identity and state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First attempt in progress.
    Connecting,
    Connected { transport: TransportKind },
    /// Waiting for or running reconnection attempt `attempt` (1-based).
    Reconnecting { attempt: u32 },
    /// Retries exhausted or credential rejected. No further attempts.
    Failed,
    /// Closed by the owner.
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected { transport } => write!(f, "connected ({transport})"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Retry policy for the connection task.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub transports: Vec<TransportKind>,
}

impl From<&RealtimeConfig> for ReconnectPolicy {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            max_attempts: config.reconnect_attempts,
            delay: config.reconnect_delay,
            transports: config.transports.clone(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one registration, so an owner can remove only its own handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    handler: EventHandler,
}

// ============================================================================
// Connection
// ============================================================================

struct ConnectionInner {
    id: ConnectionId,
    credential: Credential,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
    handlers: RwLock<HashMap<String, Registration>>,
    next_handler: AtomicU64,
}

#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl Connection {
    /// Create the handle and spawn its connection task. Must be called
    /// from within a Tokio runtime. Returns immediately in `Connecting`.
    pub(crate) fn open(
        source: Arc<dyn EventSource>,
        credential: Credential,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(ConnectionInner {
            id: ConnectionId::new(),
            credential,
            state,
            shutdown,
            handlers: RwLock::new(HashMap::new()),
            next_handler: AtomicU64::new(1),
        });

        debug!(connection = %inner.id, "spawning connection task");
        tokio::spawn(run_connection(
            Arc::downgrade(&inner),
            source,
            policy,
            shutdown_rx,
        ));

        Self { inner }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn credential(&self) -> &Credential {
        &self.inner.credential
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Not closed and not failed.
    pub fn is_live(&self) -> bool {
        !self.state().is_terminal()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Wait until connected. Returns `false` on timeout or if the
    /// connection reaches a terminal state first.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.state.subscribe();
        let wait = rx.wait_for(|state| state.is_connected() || state.is_terminal());
        let connected = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(state)) => state.is_connected(),
            _ => false,
        };
        connected
    }

    /// Register `handler` for `event`, replacing any existing handler for
    /// that name.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_handler.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.inner.handlers.write().expect("handler registry poisoned");
        if handlers
            .insert(
                event.to_string(),
                Registration {
                    id,
                    handler: Arc::new(handler),
                },
            )
            .is_some()
        {
            debug!(connection = %self.inner.id, event, "replaced existing handler");
        }
        id
    }

    pub fn off(&self, event: &str) -> bool {
        let mut handlers = self.inner.handlers.write().expect("handler registry poisoned");
        handlers.remove(event).is_some()
    }

    /// Remove the handler for `event` only if it is still registration `id`.
    pub fn off_if(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.write().expect("handler registry poisoned");
        match handlers.get(event) {
            Some(registration) if registration.id == id => {
                handlers.remove(event);
                true
            }
            _ => false,
        }
    }

    pub fn has_handler(&self, event: &str) -> bool {
        let handlers = self.inner.handlers.read().expect("handler registry poisoned");
        handlers.contains_key(event)
    }

    /// Deliver an envelope to its handler. Returns `false` if none is registered.
    pub fn dispatch(&self, envelope: &Envelope) -> bool {
        let handler = {
            let handlers = self.inner.handlers.read().expect("handler registry poisoned");
            handlers.get(&envelope.event).map(|r| r.handler.clone())
        };
        match handler {
            Some(handler) => {
                handler(&envelope.payload);
                true
            }
            None => {
                debug!(connection = %self.inner.id, event = %envelope.event, "no handler registered");
                false
            }
        }
    }

    /// Stop the connection task. Safe to call repeatedly.
    pub fn close(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        self.inner.state.send_replace(ConnectionState::Closed);
        self.inner.handlers.write().expect("handler registry poisoned").clear();
        info!(connection = %self.inner.id, "connection closed");
    }
}

// ============================================================================
// Connection task
// ============================================================================

/// `Closed` is sticky: the task never overwrites a close issued by the owner.
fn set_state(inner: &Weak<ConnectionInner>, state: ConnectionState) -> bool {
    let Some(inner) = inner.upgrade() else {
        return false;
    };
    let mut applied = false;
    inner.state.send_if_modified(|current| {
        if *current == ConnectionState::Closed {
            return false;
        }
        *current = state;
        applied = true;
        true
    });
    applied
}

async fn open_any(
    source: &dyn EventSource,
    transports: &[TransportKind],
    credential: &str,
) -> Result<(TransportKind, EventStream), TransportError> {
    let mut last_error = None;
    for &kind in transports {
        match source.open(kind, credential).await {
            Ok(stream) => return Ok((kind, stream)),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                debug!("{kind} transport unavailable: {e}");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| TransportError::Connection("no transports configured".to_string())))
}

async fn run_connection(
    inner: Weak<ConnectionInner>,
    source: Arc<dyn EventSource>,
    policy: ReconnectPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let Some(credential) = inner.upgrade().map(|i| i.credential.clone()) else {
        return;
    };
    let mut attempt: u32 = 0;

    loop {
        let state = if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        };
        if !set_state(&inner, state) {
            return;
        }

        let opened = tokio::select! {
            _ = shutdown.changed() => return,
            result = open_any(source.as_ref(), &policy.transports, credential.expose()) => result,
        };

        match opened {
            Ok((kind, mut stream)) => {
                if !set_state(&inner, ConnectionState::Connected { transport: kind }) {
                    return;
                }
                info!("event channel connected via {kind}");

                loop {
                    let item = tokio::select! {
                        _ = shutdown.changed() => return,
                        item = stream.next() => item,
                    };
                    match item {
                        Some(Ok(envelope)) => {
                            let Some(inner) = inner.upgrade() else { return };
                            Connection { inner }.dispatch(&envelope);
                        }
                        Some(Err(e)) => {
                            warn!("event channel error: {e}");
                            break;
                        }
                        None => {
                            warn!("event channel closed by server");
                            break;
                        }
                    }
                }
                attempt = 1;
            }
            Err(e) if !e.is_retryable() => {
                warn!("event channel rejected: {e}; real-time updates disabled");
                set_state(&inner, ConnectionState::Failed);
                return;
            }
            Err(e) => {
                if attempt >= policy.max_attempts {
                    warn!(
                        "event channel unavailable after {} attempts: {e}; real-time updates disabled",
                        attempt + 1
                    );
                    set_state(&inner, ConnectionState::Failed);
                    return;
                }
                attempt += 1;
                warn!("event channel connect failed: {e}; retrying in {:?}", policy.delay);
                if !set_state(&inner, ConnectionState::Reconnecting { attempt }) {
                    return;
                }
            }
        }

        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(policy.delay) => {}
        }
    }
}
