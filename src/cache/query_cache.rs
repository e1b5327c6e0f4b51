use std::fmt;
use std::future::Future;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::CacheGroup;

const INVALIDATION_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub group: CacheGroup,
    /// Distinguishes queries within a group, e.g. `status=pending`.
    pub params: String,
}

impl QueryKey {
    pub fn new(group: CacheGroup, params: impl Into<String>) -> Self {
        Self {
            group,
            params: params.into(),
        }
    }

    pub fn group(group: CacheGroup) -> Self {
        Self::new(group, "")
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.group)
        } else {
            write!(f, "{}?{}", self.group, self.params)
        }
    }
}

#[derive(Debug, Clone)]
struct CachedQuery {
    value: Value,
    stale: bool,
}

/// Process-local store of query results.
///
/// Values are kept as JSON so one cache serves every result type.
pub struct QueryCache {
    entries: DashMap<QueryKey, CachedQuery>,
    invalidations: broadcast::Sender<CacheGroup>,
}

impl QueryCache {
    pub fn new() -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_CAPACITY);
        Self {
            entries: DashMap::new(),
            invalidations,
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn put(&self, key: QueryKey, value: Value) {
        self.entries.insert(
            key,
            CachedQuery {
                value,
                stale: false,
            },
        );
    }

    /// `None` when the key has never been fetched.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.entries.get(key).map(|entry| entry.stale)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark every entry of `group` stale and notify observers.
    /// Returns the number of entries marked.
    pub fn invalidate(&self, group: CacheGroup) -> usize {
        let mut marked = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.key().group == group {
                entry.value_mut().stale = true;
                marked += 1;
            }
        }
        debug!(%group, marked, "invalidated cache group");
        let _ = self.invalidations.send(group);
        marked
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheGroup> {
        self.invalidations.subscribe()
    }

    /// Serve a fresh cached value, or run `fetcher` and cache its result.
    pub async fn fetch_with<T, E, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let fresh = self
            .entries
            .get(key)
            .filter(|entry| !entry.stale)
            .map(|entry| entry.value.clone());
        if let Some(value) = fresh {
            match serde_json::from_value(value) {
                Ok(cached) => return Ok(cached),
                Err(e) => debug!(%key, "cached value has a different shape, refetching: {e}"),
            }
        }

        let value = fetcher().await?;
        match serde_json::to_value(&value) {
            Ok(json) => self.put(key.clone(), json),
            Err(e) => warn!(%key, "result not cacheable: {e}"),
        }
        Ok(value)
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}
