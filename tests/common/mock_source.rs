//! In-memory event source for driving connections from tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use ledgerline_lib::transport::{Envelope, EventSource, EventStream, TransportError, TransportKind};

/// Sender half of a scripted stream. Dropping it ends the stream.
pub struct Feed(mpsc::UnboundedSender<Result<Envelope, TransportError>>);

impl Feed {
    pub fn emit(&self, event: &str, payload: Value) {
        self.0
            .send(Ok(Envelope::new(event, payload)))
            .expect("stream receiver dropped");
    }

    pub fn fail(&self, error: TransportError) {
        self.0.send(Err(error)).expect("stream receiver dropped");
    }
}

enum Scripted {
    Stream(mpsc::UnboundedReceiver<Result<Envelope, TransportError>>),
    Fail(TransportError),
}

/// An event source that answers each `open` with the next scripted outcome.
/// Unscripted opens fail with a retryable connection error.
#[derive(Default)]
pub struct MockEventSource {
    script: Mutex<VecDeque<Scripted>>,
    opens: Mutex<Vec<(TransportKind, String)>>,
}

impl MockEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().unwrap().push_back(Scripted::Stream(rx));
        Feed(tx)
    }

    pub fn fail(&self, error: TransportError) {
        self.script.lock().unwrap().push_back(Scripted::Fail(error));
    }

    /// Every `(transport, credential)` pair passed to `open`.
    pub fn opens(&self) -> Vec<(TransportKind, String)> {
        self.opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn open(&self, kind: TransportKind, credential: &str) -> Result<EventStream, TransportError> {
        self.opens.lock().unwrap().push((kind, credential.to_string()));
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Stream(rx)) => Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
            Some(Scripted::Fail(error)) => Err(error),
            None => Err(TransportError::Connection("no scripted stream".to_string())),
        }
    }
}
