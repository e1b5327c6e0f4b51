use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::connector::{Connection, HandlerId};
use crate::events::{AuditLevel, AuditLogRecord, EventKind, InboundEvent, EVENT_ADMIN_AUDIT_LOG};

pub const AUDIT_LOG_CAPACITY: usize = 500;

/// Client-side filter over the live log. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditLogFilter {
    pub action: Option<String>,
    pub level: Option<AuditLevel>,
    pub search: Option<String>,
}

impl AuditLogFilter {
    pub fn matches(&self, record: &AuditLogRecord) -> bool {
        if let Some(action) = self.action.as_deref().filter(|a| !a.is_empty()) {
            if !record.action.eq_ignore_ascii_case(action) {
                return false;
            }
        }
        if let Some(level) = self.level {
            if record.level != level {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                [
                    Some(record.action.as_str()),
                    Some(record.message.as_str()),
                    record.actor.as_deref(),
                    record.resource.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            }
        }
    }
}

/// The admin live log: most recent [`AUDIT_LOG_CAPACITY`] records, newest first.
pub struct AuditLogBuffer {
    records: Mutex<VecDeque<AuditLogRecord>>,
    changes: watch::Sender<usize>,
}

impl AuditLogBuffer {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            records: Mutex::new(VecDeque::with_capacity(AUDIT_LOG_CAPACITY)),
            changes,
        }
    }

    pub fn push(&self, record: AuditLogRecord) {
        let len = {
            let mut records = self.records.lock().expect("audit log poisoned");
            records.push_front(record);
            records.truncate(AUDIT_LOG_CAPACITY);
            records.len()
        };
        self.changes.send_replace(len);
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("audit log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<AuditLogRecord> {
        self.records.lock().expect("audit log poisoned").iter().cloned().collect()
    }

    pub fn filter(&self, filter: &AuditLogFilter) -> Vec<AuditLogRecord> {
        let records = self.records.lock().expect("audit log poisoned");
        records.iter().filter(|r| filter.matches(r)).cloned().collect()
    }

    /// Distinct actions currently in the buffer, for the filter picker.
    pub fn actions(&self) -> Vec<String> {
        let records = self.records.lock().expect("audit log poisoned");
        let mut actions: Vec<String> = records.iter().map(|r| r.action.clone()).collect();
        actions.sort();
        actions.dedup();
        actions
    }

    pub fn clear(&self) {
        self.records.lock().expect("audit log poisoned").clear();
        self.changes.send_replace(0);
    }

    /// Fires with the buffer length after every change.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.changes.subscribe()
    }

    /// Feed this buffer from `admin.audit-log` events on `connection`.
    pub fn attach(self: &Arc<Self>, connection: &Connection) -> AuditLogGuard {
        let buffer = Arc::downgrade(self);
        let handler = connection.on(EVENT_ADMIN_AUDIT_LOG, move |payload| {
            let Some(buffer) = buffer.upgrade() else { return };
            match InboundEvent::decode_kind(EventKind::AdminAuditLog, payload) {
                Ok(InboundEvent::AdminAuditLog(record)) => buffer.push(record),
                Ok(other) => debug!(kind = %other.kind(), "ignoring non-audit event"),
                Err(e) => warn!("dropping malformed audit record: {e}"),
            }
        });
        AuditLogGuard {
            connection: connection.clone(),
            handler,
        }
    }
}

impl Default for AuditLogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "dropping the guard detaches the audit log"]
pub struct AuditLogGuard {
    connection: Connection,
    handler: HandlerId,
}

impl Drop for AuditLogGuard {
    fn drop(&mut self) {
        self.connection.off_if(EVENT_ADMIN_AUDIT_LOG, self.handler);
    }
}
