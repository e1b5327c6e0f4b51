//! HTTP event source: SSE stream with long-polling fallback.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{Envelope, EventSource, EventStream, SseDecoder, TransportError, TransportKind};
use crate::config::RealtimeConfig;

/// Body returned by the long-polling endpoint.
#[derive(Debug, Deserialize)]
struct PollResponse {
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    events: Vec<Envelope>,
}

/// Opens event streams against `{base_url}{events_path}`.
///
/// - `Stream` reads `GET …/stream` as `text/event-stream`
/// - `Polling` repeatedly calls `GET …/poll?cursor=…`
pub struct HttpEventSource {
    client: reqwest::Client,
    endpoint: String,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl HttpEventSource {
    pub fn new(config: &RealtimeConfig) -> Result<Self, TransportError> {
        // No overall timeout: the SSE response lives as long as the session.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| TransportError::connection(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.events_url(),
            request_timeout: config.request_timeout,
            poll_interval: config.poll_interval,
        })
    }

    fn auth_headers(credential: &str) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {credential}"))
            .map_err(|e| TransportError::connection(format!("invalid auth header: {e}")))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    async fn open_stream(&self, credential: &str) -> Result<EventStream, TransportError> {
        let url = format!("{}/stream", self.endpoint);
        let mut headers = Self::auth_headers(credential)?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| TransportError::connection(format!("failed to open event stream: {e}")))?;
        let response = check_status(response).await?;

        info!("Connected to event stream at {}", url);

        let mut decoder = SseDecoder::new();
        let events = response.bytes_stream().flat_map(move |chunk| {
            let items: Vec<Result<Envelope, TransportError>> = match chunk {
                Ok(bytes) => decoder
                    .push(&bytes)
                    .into_iter()
                    .filter_map(|event| match event.into_envelope() {
                        Ok(envelope) => Some(Ok(envelope)),
                        Err(e) => {
                            warn!("dropping malformed event: {e}");
                            None
                        }
                    })
                    .collect(),
                Err(e) => vec![Err(TransportError::connection(format!("stream error: {e}")))],
            };
            futures::stream::iter(items)
        });

        Ok(Box::pin(events))
    }

    async fn open_polling(&self, credential: &str) -> Result<EventStream, TransportError> {
        let poller = Poller {
            client: self.client.clone(),
            url: format!("{}/poll", self.endpoint),
            headers: Self::auth_headers(credential)?,
            timeout: self.request_timeout,
        };

        // The first poll doubles as the handshake.
        let first = poller.poll(None).await?;
        info!("Connected to polling endpoint at {}", poller.url);

        let state = PollState {
            poller,
            interval: self.poll_interval,
            cursor: first.cursor,
            idle: first.events.is_empty(),
            pending: first.events.into(),
            done: false,
        };

        let events = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(envelope) = state.pending.pop_front() {
                    return Some((Ok(envelope), state));
                }
                if state.done {
                    return None;
                }
                if state.idle {
                    sleep(state.interval).await;
                }
                match state.poller.poll(state.cursor.as_deref()).await {
                    Ok(response) => {
                        if response.cursor.is_some() {
                            state.cursor = response.cursor;
                        }
                        state.idle = response.events.is_empty();
                        state.pending.extend(response.events);
                    }
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                }
            }
        });

        Ok(Box::pin(events))
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn open(&self, kind: TransportKind, credential: &str) -> Result<EventStream, TransportError> {
        match kind {
            TransportKind::Stream => self.open_stream(credential).await,
            TransportKind::Polling => self.open_polling(credential).await,
        }
    }
}

struct Poller {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    timeout: Duration,
}

impl Poller {
    async fn poll(&self, cursor: Option<&str>) -> Result<PollResponse, TransportError> {
        let mut request = self
            .client
            .get(&self.url)
            .headers(self.headers.clone())
            .timeout(self.timeout);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::connection(format!("poll request failed: {e}"))
            }
        })?;
        let response = check_status(response).await?;

        let body: PollResponse = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(format!("poll body: {e}")))?;
        debug!(count = body.events.len(), "poll returned events");
        Ok(body)
    }
}

struct PollState {
    poller: Poller,
    interval: Duration,
    cursor: Option<String>,
    pending: VecDeque<Envelope>,
    idle: bool,
    done: bool,
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(TransportError::Unauthorized(status.as_u16()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Http {
        status: status.as_u16(),
        message: body,
    })
}
