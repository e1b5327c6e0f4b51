//! Transport connector: owns the session's single live connection.

mod connection;

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

pub use connection::{
    Connection, ConnectionId, ConnectionState, EventHandler, HandlerId, ReconnectPolicy,
};

use crate::session::Session;
use crate::transport::EventSource;

pub struct Connector {
    source: Arc<dyn EventSource>,
    session: Session,
    policy: ReconnectPolicy,
    current: Mutex<Option<Connection>>,
}

impl Connector {
    pub fn new(source: Arc<dyn EventSource>, session: Session, policy: ReconnectPolicy) -> Self {
        Self {
            source,
            session,
            policy,
            current: Mutex::new(None),
        }
    }

    /// Return the live connection, creating one with the session credential
    /// if needed. `None` when no session is active.
    ///
    /// Never blocks on the network: a new handle starts in `Connecting`.
    pub fn connect(&self) -> Option<Connection> {
        let mut current = self.current.lock().expect("connector mutex poisoned");

        if let Some(connection) = current.as_ref() {
            if connection.is_live() {
                return Some(connection.clone());
            }
            debug!(connection = %connection.id(), state = %connection.state(), "replacing dead connection");
            connection.close();
        }

        let Some(credential) = self.session.credential() else {
            warn!("connect requested without an active session; real-time updates unavailable");
            *current = None;
            return None;
        };

        let connection = Connection::open(self.source.clone(), credential, self.policy.clone());
        *current = Some(connection.clone());
        Some(connection)
    }

    /// Close and forget the current connection. No-op when there is none.
    pub fn disconnect(&self) {
        let taken = self.current.lock().expect("connector mutex poisoned").take();
        if let Some(connection) = taken {
            connection.close();
        }
    }

    pub fn current(&self) -> Option<Connection> {
        self.current.lock().expect("connector mutex poisoned").clone()
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::{Credential, SessionInfo};
    use crate::testing::ScriptedSource;
    use crate::transport::{TransportError, TransportKind};

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 0,
            delay: Duration::from_millis(10),
            transports: vec![TransportKind::Stream],
        }
    }

    fn active_session() -> Session {
        let session = Session::new();
        session.start(SessionInfo {
            credential: Credential::new("token"),
            is_admin: false,
        });
        session
    }

    #[tokio::test]
    async fn connect_without_session_returns_none() {
        let source = Arc::new(ScriptedSource::new());
        let connector = Connector::new(source.clone(), Session::new(), policy());

        assert!(connector.connect().is_none());
        assert!(connector.current().is_none());
        tokio::task::yield_now().await;
        assert_eq!(source.open_count(), 0);
    }

    #[tokio::test]
    async fn connect_is_idempotent_while_live() {
        let source = Arc::new(ScriptedSource::new());
        let _feed = source.push_stream();
        let connector = Connector::new(source, active_session(), policy());

        let first = connector.connect().unwrap();
        let second = connector.connect().unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(connector.current().unwrap().id(), first.id());
    }

    #[tokio::test]
    async fn connect_replaces_failed_connection() {
        let source = Arc::new(ScriptedSource::new());
        source.push_failure(TransportError::Unauthorized(401));
        let _feed = source.push_stream();
        let connector = Connector::new(source, active_session(), policy());

        let first = connector.connect().unwrap();
        assert!(!first.wait_connected(Duration::from_secs(1)).await);

        let second = connector.connect().unwrap();
        assert_ne!(first.id(), second.id());
        assert!(second.wait_connected(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn disconnect_closes_and_clears() {
        let source = Arc::new(ScriptedSource::new());
        let _feed = source.push_stream();
        let connector = Connector::new(source, active_session(), policy());

        connector.disconnect();

        let connection = connector.connect().unwrap();
        connector.disconnect();
        assert!(connector.current().is_none());
        assert_eq!(connection.state(), ConnectionState::Closed);
    }
}
