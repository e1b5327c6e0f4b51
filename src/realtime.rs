//! Session lifecycle wiring.
//!
//! `RealtimeClient` follows the `Session` watch channel. Each active session
//! gets one `SessionScope`: the connection, a fresh notification store, the
//! cache bridge and, for admins, the audit log. Ending the session or
//! swapping its credential drops the scope and closes the connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{BridgeGuard, CacheInvalidationBridge, QueryCache};
use crate::config::RealtimeConfig;
use crate::connector::{Connection, Connector, ReconnectPolicy};
use crate::notifications::{InitOutcome, NotificationStore};
use crate::session::{Session, SessionInfo};
use crate::transport::{EventSource, HttpEventSource};
use crate::views::{AuditLogBuffer, AuditLogGuard, BellView};

pub struct SessionScope {
    info: SessionInfo,
    connection: Connection,
    store: Arc<NotificationStore>,
    audit_log: Option<Arc<AuditLogBuffer>>,
    init_task: JoinHandle<()>,
    _bridge: BridgeGuard,
    _audit_guard: Option<AuditLogGuard>,
}

impl SessionScope {
    fn open(
        info: SessionInfo,
        connector: Arc<Connector>,
        cache: Arc<QueryCache>,
        connect_timeout: Duration,
    ) -> Option<Self> {
        let connection = connector.connect()?;
        let store = Arc::new(NotificationStore::new());
        let bridge = CacheInvalidationBridge::mount(&connection, cache);

        let (audit_log, audit_guard) = if info.is_admin {
            let buffer = Arc::new(AuditLogBuffer::new());
            let guard = buffer.attach(&connection);
            (Some(buffer), Some(guard))
        } else {
            (None, None)
        };

        let init_task = tokio::spawn(initialize_on_connect(
            connector,
            connection.clone(),
            store.clone(),
            connect_timeout,
        ));

        info!(connection = %connection.id(), admin = info.is_admin, "session scope opened");
        Some(Self {
            info,
            connection,
            store,
            audit_log,
            init_task,
            _bridge: bridge,
            _audit_guard: audit_guard,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    /// Present only in admin sessions.
    pub fn audit_log(&self) -> Option<&Arc<AuditLogBuffer>> {
        self.audit_log.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.info.is_admin
    }

    pub fn bell(&self) -> BellView {
        BellView::from_snapshot(&self.store.snapshot())
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        self.init_task.abort();
        debug!(connection = %self.connection.id(), "session scope dropped");
    }
}

/// Register the store's handlers every time the connection comes up.
async fn initialize_on_connect(
    connector: Arc<Connector>,
    connection: Connection,
    store: Arc<NotificationStore>,
    timeout: Duration,
) {
    let mut states = connection.subscribe_state();
    let mut was_connected = false;

    loop {
        let state = *states.borrow_and_update();
        if state.is_terminal() {
            debug!(connection = %connection.id(), %state, "connection ended, stopping initializer");
            return;
        }

        let connected = state.is_connected();
        if connected && !was_connected {
            match store.initialize(&connector, timeout).await {
                InitOutcome::Unavailable => warn!("notification store could not attach to the connection"),
                outcome => debug!(?outcome, "notification store initialized"),
            }
        }
        was_connected = connected;

        if states.changed().await.is_err() {
            return;
        }
    }
}

struct Shared {
    connector: Arc<Connector>,
    cache: Arc<QueryCache>,
    connect_timeout: Duration,
    scope: watch::Sender<Option<Arc<SessionScope>>>,
}

impl Shared {
    fn apply(&self, info: Option<SessionInfo>) {
        let unchanged = match (self.scope.borrow().as_ref(), info.as_ref()) {
            (Some(scope), Some(info)) => scope.info == *info,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if self.scope.send_replace(None).is_some() {
            self.connector.disconnect();
            info!("session scope closed");
        }

        if let Some(info) = info {
            match SessionScope::open(info, self.connector.clone(), self.cache.clone(), self.connect_timeout) {
                Some(scope) => {
                    self.scope.send_replace(Some(Arc::new(scope)));
                }
                None => warn!("session active but connection unavailable; real-time updates disabled"),
            }
        }
    }
}

/// Owns the connector and keeps one scope per active session.
pub struct RealtimeClient {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl RealtimeClient {
    /// Start following `session`. Must be called from within a Tokio runtime.
    pub fn spawn(
        source: Arc<dyn EventSource>,
        session: Session,
        policy: ReconnectPolicy,
        cache: Arc<QueryCache>,
        connect_timeout: Duration,
    ) -> Self {
        let sessions = session.subscribe();
        let (scope, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            connector: Arc::new(Connector::new(source, session, policy)),
            cache,
            connect_timeout,
            scope,
        });

        let task = tokio::spawn(follow_session(shared.clone(), sessions));
        Self { shared, task }
    }

    /// Spawn against the HTTP event endpoints described by `config`.
    pub fn from_config(
        config: &RealtimeConfig,
        session: Session,
        cache: Arc<QueryCache>,
    ) -> Result<Self, crate::Error> {
        let source = Arc::new(HttpEventSource::new(config)?);
        Ok(Self::spawn(
            source,
            session,
            ReconnectPolicy::from(config),
            cache,
            config.connect_timeout,
        ))
    }

    /// The active session's scope, if any.
    pub fn scope(&self) -> Option<Arc<SessionScope>> {
        self.shared.scope.borrow().clone()
    }

    pub fn subscribe_scope(&self) -> watch::Receiver<Option<Arc<SessionScope>>> {
        self.shared.scope.subscribe()
    }

    /// Wait for a scope to exist, up to `timeout`.
    pub async fn wait_scope(&self, timeout: Duration) -> Option<Arc<SessionScope>> {
        let mut rx = self.subscribe_scope();
        let wait = rx.wait_for(Option::is_some);
        let scope = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(scope)) => scope.clone(),
            _ => None,
        };
        scope
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.shared.cache
    }

    pub fn connector(&self) -> &Connector {
        &self.shared.connector
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.task.abort();
        self.shared.scope.send_replace(None);
        self.shared.connector.disconnect();
    }
}

async fn follow_session(shared: Arc<Shared>, mut sessions: watch::Receiver<Option<SessionInfo>>) {
    loop {
        let info = sessions.borrow_and_update().clone();
        shared.apply(info);
        if sessions.changed().await.is_err() {
            debug!("session handle dropped, stopping lifecycle task");
            shared.apply(None);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::{CacheGroup, QueryKey};
    use crate::connector::ConnectionState;
    use crate::session::Credential;
    use crate::testing::ScriptedSource;
    use crate::transport::{Envelope, TransportKind};

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 0,
            delay: Duration::from_millis(10),
            transports: vec![TransportKind::Stream],
        }
    }

    fn info(token: &str, is_admin: bool) -> SessionInfo {
        SessionInfo {
            credential: Credential::new(token),
            is_admin,
        }
    }

    async fn wait_registered(scope: &SessionScope) {
        for _ in 0..100 {
            if scope.connection().has_handler("debt.created") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("store handlers never registered");
    }

    #[tokio::test]
    async fn scope_follows_session_lifecycle() {
        let source = Arc::new(ScriptedSource::new());
        let feed = source.push_stream();
        let session = Session::new();
        let cache = Arc::new(QueryCache::new());
        cache.put(QueryKey::group(CacheGroup::Debts), json!([]));

        let client = RealtimeClient::spawn(source, session.clone(), policy(), cache.clone(), Duration::from_secs(1));
        assert!(client.scope().is_none());

        session.start(info("token", false));
        let scope = client.wait_scope(Duration::from_secs(1)).await.unwrap();
        assert!(!scope.is_admin());
        assert!(scope.audit_log().is_none());
        wait_registered(&scope).await;

        feed.send(Ok(Envelope::new("debt.created", json!({ "debtId": "d1" })))).unwrap();
        feed.send(Ok(Envelope::new("data.updated", json!({ "type": "debts" })))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scope.store().len(), 1);
        assert_eq!(scope.bell().badge.as_deref(), Some("1"));
        assert_eq!(cache.is_stale(&QueryKey::group(CacheGroup::Debts)), Some(true));

        session.end();
        let mut rx = client.subscribe_scope();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(Option::is_none))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scope.connection().state(), ConnectionState::Closed);
        assert!(client.connector().current().is_none());
    }

    #[tokio::test]
    async fn admin_sessions_get_audit_log() {
        let source = Arc::new(ScriptedSource::new());
        let feed = source.push_stream();
        let session = Session::new();
        session.start(info("admin-token", true));

        let client = RealtimeClient::spawn(
            source,
            session,
            policy(),
            Arc::new(QueryCache::new()),
            Duration::from_secs(1),
        );
        let scope = client.wait_scope(Duration::from_secs(1)).await.unwrap();
        assert!(scope.is_admin());
        wait_registered(&scope).await;

        feed.send(Ok(Envelope::new(
            "admin.audit-log",
            json!({ "id": "a1", "action": "user.login", "level": "info" }),
        )))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let audit = scope.audit_log().unwrap();
        assert_eq!(audit.len(), 1);
        assert!(scope.store().is_empty());
    }

    #[tokio::test]
    async fn credential_change_replaces_scope() {
        let source = Arc::new(ScriptedSource::new());
        let _first = source.push_stream();
        let _second = source.push_stream();
        let session = Session::new();
        session.start(info("one", false));

        let client = RealtimeClient::spawn(
            source.clone(),
            session.clone(),
            policy(),
            Arc::new(QueryCache::new()),
            Duration::from_secs(1),
        );
        let old = client.wait_scope(Duration::from_secs(1)).await.unwrap();
        let old_id = old.connection().id();

        session.start(info("two", false));
        let mut rx = client.subscribe_scope();
        let new = tokio::time::timeout(
            Duration::from_secs(1),
            rx.wait_for(|scope| scope.as_ref().is_some_and(|s| s.connection().id() != old_id)),
        )
        .await
        .unwrap()
        .unwrap()
        .clone()
        .unwrap();

        assert_eq!(new.connection().credential().expose(), "two");
        assert_eq!(old.connection().state(), ConnectionState::Closed);
    }
}
