use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::templates;
use super::{NewNotification, Notification, NotificationSnapshot};
use crate::connector::{Connection, ConnectionId, Connector};
use crate::events::{EventKind, InboundEvent};

/// Events the store turns into notifications.
pub const NOTIFICATION_EVENTS: [EventKind; 5] = [
    EventKind::Notification,
    EventKind::DebtCreated,
    EventKind::DebtUpdated,
    EventKind::PaymentReceived,
    EventKind::DisputeCreated,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Handlers were registered on this connection.
    Registered,
    /// This connection already carries the store's handlers.
    AlreadyRegistered,
    /// No session, or the connection did not come up in time.
    Unavailable,
}

/// The session's notification list, newest first.
///
/// Every mutation happens under one lock and republishes a snapshot when
/// it changed something.
pub struct NotificationStore {
    list: Mutex<Vec<Notification>>,
    snapshots: watch::Sender<NotificationSnapshot>,
    registered: Mutex<Option<ConnectionId>>,
}

impl NotificationStore {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(NotificationSnapshot::default());
        Self {
            list: Mutex::new(Vec::new()),
            snapshots,
            registered: Mutex::new(None),
        }
    }

    fn mutate<R>(&self, op: impl FnOnce(&mut Vec<Notification>) -> (R, bool)) -> R {
        let mut list = self.list.lock().expect("notification list poisoned");
        let (result, changed) = op(&mut list);
        if changed {
            self.snapshots.send_replace(NotificationSnapshot {
                notifications: list.clone(),
                unread_count: count_unread(&list),
            });
        }
        result
    }

    pub fn add(&self, input: NewNotification) -> Notification {
        let record = input.into_record(Uuid::new_v4().to_string());
        debug!(id = %record.id, category = %record.category, "notification added");
        self.mutate(|list| {
            list.insert(0, record.clone());
            (record, true)
        })
    }

    /// Returns `true` if the record went from unread to read.
    pub fn mark_read(&self, id: &str) -> bool {
        self.mutate(|list| {
            match list.iter_mut().find(|n| n.id == id && !n.is_read) {
                Some(record) => {
                    record.is_read = true;
                    (true, true)
                }
                None => (false, false),
            }
        })
    }

    pub fn mark_all_read(&self) {
        self.mutate(|list| {
            let mut changed = false;
            for record in list.iter_mut().filter(|n| !n.is_read) {
                record.is_read = true;
                changed = true;
            }
            ((), changed)
        })
    }

    pub fn clear_all(&self) {
        self.mutate(|list| {
            let changed = !list.is_empty();
            list.clear();
            ((), changed)
        })
    }

    pub fn delete(&self, id: &str) -> Option<Notification> {
        self.mutate(|list| match list.iter().position(|n| n.id == id) {
            Some(index) => (Some(list.remove(index)), true),
            None => (None, false),
        })
    }

    pub fn unread_count(&self) -> usize {
        count_unread(&self.list.lock().expect("notification list poisoned"))
    }

    pub fn len(&self) -> usize {
        self.list.lock().expect("notification list poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self) -> Vec<Notification> {
        self.list.lock().expect("notification list poisoned").clone()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        let list = self.list.lock().expect("notification list poisoned");
        list.iter().find(|n| n.id == id).cloned()
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationSnapshot> {
        self.snapshots.subscribe()
    }

    /// Record an inbound event. Events without a template are ignored.
    pub fn handle(&self, event: &InboundEvent) -> Option<Notification> {
        templates::render(event).map(|draft| self.add(draft))
    }

    fn handle_raw(&self, kind: EventKind, payload: &Value) {
        match InboundEvent::decode_kind(kind, payload) {
            Ok(event) => {
                self.handle(&event);
            }
            Err(e) => warn!("dropping malformed {kind} event: {e}"),
        }
    }

    /// Obtain the session connection, wait until it is up, and register the
    /// store's handlers on it once.
    ///
    /// Never fails: an unavailable connection is logged and reported as
    /// `InitOutcome::Unavailable`.
    pub async fn initialize(self: &Arc<Self>, connector: &Connector, timeout: Duration) -> InitOutcome {
        let Some(connection) = connector.connect() else {
            warn!("notification store not initialized: no active session");
            return InitOutcome::Unavailable;
        };

        if !connection.is_connected() && !connection.wait_connected(timeout).await {
            warn!(
                connection = %connection.id(),
                state = %connection.state(),
                "notification store not initialized: connection not established"
            );
            return InitOutcome::Unavailable;
        }

        self.register(&connection)
    }

    /// Register handlers on `connection` unless this store already did.
    pub fn register(self: &Arc<Self>, connection: &Connection) -> InitOutcome {
        let mut registered = self.registered.lock().expect("registration mutex poisoned");
        let current = connection.id();

        let intact = NOTIFICATION_EVENTS
            .iter()
            .all(|kind| connection.has_handler(kind.as_str()));
        if *registered == Some(current) && intact {
            debug!(connection = %current, "notification handlers already registered");
            return InitOutcome::AlreadyRegistered;
        }

        for kind in NOTIFICATION_EVENTS {
            let store: Weak<Self> = Arc::downgrade(self);
            connection.on(kind.as_str(), move |payload| {
                if let Some(store) = store.upgrade() {
                    store.handle_raw(kind, payload);
                }
            });
        }
        *registered = Some(current);
        info!(connection = %current, "notification handlers registered");
        InitOutcome::Registered
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn count_unread(list: &[Notification]) -> usize {
    list.iter().filter(|n| !n.is_read).count()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::connector::ReconnectPolicy;
    use crate::session::{Credential, Session, SessionInfo};
    use crate::testing::ScriptedSource;
    use crate::transport::{Envelope, TransportKind};

    fn draft(title: &str) -> NewNotification {
        NewNotification::new("general", title, "")
    }

    fn assert_consistent(store: &NotificationStore) {
        let list = store.list();
        assert_eq!(store.unread_count(), list.iter().filter(|n| !n.is_read).count());
        assert_eq!(store.snapshot().unread_count, store.unread_count());
        assert_eq!(store.snapshot().notifications, list);
    }

    fn connector_with_stream(source: &Arc<ScriptedSource>) -> Connector {
        let session = Session::new();
        session.start(SessionInfo {
            credential: Credential::new("token"),
            is_admin: false,
        });
        Connector::new(
            source.clone(),
            session,
            ReconnectPolicy {
                max_attempts: 0,
                delay: Duration::from_millis(10),
                transports: vec![TransportKind::Stream],
            },
        )
    }

    #[test]
    fn add_prepends_unread_records_with_unique_ids() {
        let store = NotificationStore::new();
        let first = store.add(draft("one"));
        let second = store.add(draft("two"));

        assert_ne!(first.id, second.id);
        assert!(!second.is_read);
        let titles: Vec<_> = store.list().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["two", "one"]);
        assert_eq!(store.unread_count(), 2);
        assert_consistent(&store);
    }

    #[test]
    fn unread_count_holds_across_every_operation() {
        let store = NotificationStore::new();
        let ids: Vec<_> = (0..5).map(|i| store.add(draft(&i.to_string())).id).collect();
        assert_consistent(&store);

        assert!(store.mark_read(&ids[0]));
        assert_consistent(&store);
        assert!(store.delete(&ids[1]).is_some());
        assert_consistent(&store);
        store.mark_all_read();
        assert_consistent(&store);
        store.add(draft("late"));
        assert_consistent(&store);
        store.clear_all();
        assert_consistent(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn mark_read_on_read_or_missing_is_noop() {
        let store = NotificationStore::new();
        let id = store.add(draft("a")).id;
        assert!(store.mark_read(&id));

        let before = store.snapshot();
        let rx = store.subscribe();

        assert!(!store.mark_read(&id));
        assert!(!store.mark_read("missing"));
        assert_eq!(store.snapshot(), before);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn mark_all_read_is_idempotent() {
        let store = NotificationStore::new();
        store.add(draft("a"));
        store.add(draft("b"));

        store.mark_all_read();
        let once = store.snapshot();
        store.mark_all_read();
        assert_eq!(store.snapshot(), once);
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn delete_adjusts_unread_only_for_unread_records() {
        let store = NotificationStore::new();
        let read = store.add(draft("read")).id;
        let unread = store.add(draft("unread")).id;
        store.mark_read(&read);

        store.delete(&read);
        assert_eq!((store.len(), store.unread_count()), (1, 1));

        store.delete(&unread);
        assert_eq!((store.len(), store.unread_count()), (0, 0));
        assert!(store.delete("missing").is_none());
    }

    #[test]
    fn debt_created_event_produces_one_linked_record() {
        let store = NotificationStore::new();
        let event =
            InboundEvent::decode("debt.created", &json!({ "debtId": "d1", "debtorName": "Alice" })).unwrap();

        let record = store.handle(&event).unwrap();
        assert!(record.link.as_deref().unwrap().ends_with("/debts/d1"));
        assert!(!record.is_read);
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
    }

    #[tokio::test]
    async fn initialize_twice_delivers_each_event_once() {
        let source = Arc::new(ScriptedSource::new());
        let _feed = source.push_stream();
        let connector = connector_with_stream(&source);
        let store = Arc::new(NotificationStore::new());

        let timeout = Duration::from_secs(1);
        assert_eq!(store.initialize(&connector, timeout).await, InitOutcome::Registered);
        assert_eq!(store.initialize(&connector, timeout).await, InitOutcome::AlreadyRegistered);

        let connection = connector.current().unwrap();
        connection.dispatch(&Envelope::new("debt.updated", json!({ "debtId": "d7" })));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn initialize_without_session_registers_nothing() {
        let source = Arc::new(ScriptedSource::new());
        let connector = Connector::new(
            source,
            Session::new(),
            ReconnectPolicy {
                max_attempts: 0,
                delay: Duration::from_millis(10),
                transports: vec![TransportKind::Stream],
            },
        );
        let store = Arc::new(NotificationStore::new());

        assert_eq!(
            store.initialize(&connector, Duration::from_millis(50)).await,
            InitOutcome::Unavailable
        );
        assert!(connector.current().is_none());
    }

    #[tokio::test]
    async fn events_without_resource_id_are_recorded_unlinked() {
        let source = Arc::new(ScriptedSource::new());
        let _feed = source.push_stream();
        let connector = connector_with_stream(&source);
        let store = Arc::new(NotificationStore::new());
        store.initialize(&connector, Duration::from_secs(1)).await;

        let connection = connector.current().unwrap();
        connection.dispatch(&Envelope::new(
            "debt.created",
            json!({ "debtorName": "Alice", "message": "Registered" }),
        ));
        connection.dispatch(&Envelope::new("payment.received", json!({ "debtorName": "Bob" })));
        connection.dispatch(&Envelope::new(
            "dispute.created",
            json!({ "debtId": "d1", "message": "Contested" }),
        ));

        let records = store.list();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|n| n.link.is_none() && n.action_label.is_none()));
        assert_eq!(store.unread_count(), 3);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let source = Arc::new(ScriptedSource::new());
        let _feed = source.push_stream();
        let connector = connector_with_stream(&source);
        let store = Arc::new(NotificationStore::new());
        store.initialize(&connector, Duration::from_secs(1)).await;

        let connection = connector.current().unwrap();
        connection.dispatch(&Envelope::new("dispute.created", json!("not an object")));
        assert!(store.is_empty());
    }
}
