//! Session presence, observed by the connector and lifecycle wiring.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Bearer credential for the current session. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub credential: Credential,
    pub is_admin: bool,
}

/// Shared handle to the active session, if any.
///
/// Cloning shares the same underlying state.
#[derive(Clone)]
pub struct Session {
    tx: Arc<watch::Sender<Option<SessionInfo>>>,
}

impl Session {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn start(&self, info: SessionInfo) {
        self.tx.send_replace(Some(info));
    }

    /// Logout or credential loss.
    pub fn end(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    pub fn current(&self) -> Option<SessionInfo> {
        self.tx.borrow().clone()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.tx.borrow().as_ref().map(|info| info.credential.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionInfo>> {
        self.tx.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
