use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{QueryCache, QueryKey};

#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> QueryState<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            QueryState::Ready(data) => Some(data),
            _ => None,
        }
    }
}

/// A mounted consumer of one query.
///
/// Fetches on mount and again every time the key's group is invalidated.
/// Dropping the observer unmounts it; the cache and connection are untouched.
pub struct QueryObserver<T> {
    key: QueryKey,
    state: watch::Receiver<QueryState<T>>,
    task: JoinHandle<()>,
}

impl<T> QueryObserver<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn mount<F, Fut, E>(cache: Arc<QueryCache>, key: QueryKey, fetcher: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (tx, state) = watch::channel(QueryState::Loading);
        // Subscribe before the first fetch so no invalidation slips between.
        let mut invalidations = cache.subscribe();
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            refresh(&cache, &task_key, &fetcher, &tx).await;

            loop {
                match invalidations.recv().await {
                    Ok(group) if group == task_key.group => {
                        debug!(key = %task_key, "group invalidated, refetching");
                        refresh(&cache, &task_key, &fetcher, &tx).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(key = %task_key, "observer lagged, missed {n} invalidations");
                        refresh(&cache, &task_key, &fetcher, &tx).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { key, state, task }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.clone()
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn refresh<T, F, Fut, E>(
    cache: &QueryCache,
    key: &QueryKey,
    fetcher: &F,
    tx: &watch::Sender<QueryState<T>>,
) where
    T: Serialize + DeserializeOwned,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let next = match cache.fetch_with(key, fetcher).await {
        Ok(data) => QueryState::Ready(data),
        Err(e) => {
            warn!(%key, "query failed: {e}");
            QueryState::Failed(e.to_string())
        }
    };
    tx.send_replace(next);
}
