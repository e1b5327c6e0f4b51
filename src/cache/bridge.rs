use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{DataScope, QueryCache};
use crate::connector::{Connection, HandlerId};
use crate::events::{EventKind, InboundEvent, EVENT_DATA_UPDATED};

/// Routes `data.updated` events from a connection into the query cache.
pub struct CacheInvalidationBridge;

impl CacheInvalidationBridge {
    /// Register the `data.updated` handler on `connection`.
    ///
    /// The returned guard removes the handler when dropped, provided it is
    /// still the registered one. The connection itself stays open.
    pub fn mount(connection: &Connection, cache: Arc<QueryCache>) -> BridgeGuard {
        let handler_cache = cache.clone();
        let handler = connection.on(EVENT_DATA_UPDATED, move |payload: &Value| {
            let scope = match InboundEvent::decode_kind(EventKind::DataUpdated, payload) {
                Ok(InboundEvent::DataUpdated(update)) => update.scope(),
                Ok(other) => {
                    warn!(kind = %other.kind(), "unexpected event on data.updated");
                    DataScope::All
                }
                Err(e) => {
                    warn!("undecodable data.updated, invalidating everything: {e}");
                    DataScope::All
                }
            };
            Self::apply(&handler_cache, scope);
        });
        debug!(connection = %connection.id(), "cache invalidation bridge mounted");

        BridgeGuard {
            connection: connection.clone(),
            handler,
        }
    }

    /// Invalidate every group affected by `scope`. Returns the number of
    /// cached entries marked stale.
    pub fn apply(cache: &QueryCache, scope: DataScope) -> usize {
        scope
            .targets()
            .iter()
            .map(|group| cache.invalidate(*group))
            .sum()
    }
}

/// Keeps the bridge's handler registered while alive.
#[must_use = "dropping the guard unmounts the bridge"]
pub struct BridgeGuard {
    connection: Connection,
    handler: HandlerId,
}

impl BridgeGuard {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl Drop for BridgeGuard {
    fn drop(&mut self) {
        if self.connection.off_if(EVENT_DATA_UPDATED, self.handler) {
            debug!(connection = %self.connection.id(), "cache invalidation bridge unmounted");
        }
    }
}
