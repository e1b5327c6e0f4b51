//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::transport::{Envelope, EventSource, EventStream, TransportError, TransportKind};

pub type Feed = mpsc::UnboundedSender<Result<Envelope, TransportError>>;

enum Outcome {
    Fail(TransportError),
    Stream(mpsc::UnboundedReceiver<Result<Envelope, TransportError>>),
}

/// An event source that replays scripted open results in order.
///
/// Each `push_stream` returns the sender feeding that stream; dropping the
/// sender ends the stream as if the server closed it. Opens beyond the
/// script fail with a retryable connection error.
#[derive(Default)]
pub struct ScriptedSource {
    outcomes: Mutex<VecDeque<Outcome>>,
    opened: Mutex<Vec<TransportKind>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stream(&self) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outcomes.lock().unwrap().push_back(Outcome::Stream(rx));
        tx
    }

    pub fn push_failure(&self, error: TransportError) {
        self.outcomes.lock().unwrap().push_back(Outcome::Fail(error));
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn opened_kinds(&self) -> Vec<TransportKind> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn open(&self, kind: TransportKind, _credential: &str) -> Result<EventStream, TransportError> {
        self.opened.lock().unwrap().push(kind);
        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(Outcome::Stream(rx)) => Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
            Some(Outcome::Fail(error)) => Err(error),
            None => Err(TransportError::Connection("nothing scripted".to_string())),
        }
    }
}
