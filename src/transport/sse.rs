//! Incremental `text/event-stream` decoding.

use tracing::trace;

use super::{Envelope, TransportError};

/// SSE event structure with full field support.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Event type (e.g., "message", "debt.created").
    pub event_type: String,
    /// Event data payload.
    pub data: String,
    /// Event ID for ordering.
    pub id: Option<String>,
    /// Retry timing hint from server.
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Parse a single SSE event block (the text between two blank lines).
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let mut event_type = "message".to_string();
        let mut data = String::new();
        let mut id = None;
        let mut retry = None;

        for line in input.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                match key {
                    "event" => event_type = value.to_string(),
                    "data" => {
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(value);
                    }
                    "id" => id = Some(value.to_string()),
                    "retry" => {
                        if let Ok(ms) = value.parse::<u64>() {
                            retry = Some(ms);
                        }
                    }
                    _ => {
                        trace!("Unknown SSE field: {}", key);
                    }
                }
            }
        }

        if data.is_empty() {
            return Err(TransportError::InvalidResponse("empty SSE event data".to_string()));
        }

        Ok(Self {
            event_type,
            data,
            id,
            retry,
        })
    }

    /// Interpret the data field as the JSON payload of a named event.
    pub fn into_envelope(self) -> Result<Envelope, TransportError> {
        let payload = serde_json::from_str(&self.data).map_err(|e| {
            TransportError::InvalidResponse(format!(
                "event '{}' carried non-JSON data: {e}",
                self.event_type
            ))
        })?;
        Ok(Envelope::new(self.event_type, payload))
    }
}

/// Buffers raw response chunks and yields complete events.
///
/// Chunks may split an event (or a multi-byte character) anywhere; nothing
/// is decoded until the terminating blank line has arrived.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    /// Keep-alive comments and data-less blocks are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_block_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&block[..end]);
            match SseEvent::parse(&text) {
                Ok(event) => events.push(event),
                Err(e) => trace!("skipping SSE block: {e}"),
            }
        }
        events
    }

    /// Bytes held back waiting for the rest of an event.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_block_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_sse_event_parse() {
        let event = SseEvent::parse("event: debt.created\nid: 123\ndata: {\"debtId\":\"d1\"}").unwrap();

        assert_eq!(event.event_type, "debt.created");
        assert_eq!(event.id, Some("123".to_string()));
        assert_eq!(event.data, "{\"debtId\":\"d1\"}");
    }

    #[test]
    fn test_sse_event_parse_multiline() {
        let event = SseEvent::parse("data: Line 1\ndata: Line 2").unwrap();

        assert_eq!(event.event_type, "message");
        assert_eq!(event.data, "Line 1\nLine 2");
    }

    #[test]
    fn test_sse_event_parse_empty_data() {
        assert!(SseEvent::parse("event: message").is_err());
        assert!(SseEvent::parse(": keep-alive").is_err());
    }

    #[test]
    fn decoder_joins_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"event: data.updated\nda").is_empty());
        assert!(decoder.push(b"ta: {\"type\":\"charges\"}\n").is_empty());
        let events = decoder.push(b"\nevent: notification\ndata: {}\n\n");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "data.updated");
        assert_eq!(events[1].event_type, "notification");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn decoder_handles_crlf_and_split_utf8() {
        let mut decoder = SseDecoder::new();
        let bytes = "event: notification\r\ndata: {\"subject\":\"Cobrança\"}\r\n\r\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(decoder.push(&bytes[..split]).is_empty());
        let events = decoder.push(&bytes[split..]);

        assert_eq!(events.len(), 1);
        let envelope = events[0].clone().into_envelope().unwrap();
        assert_eq!(envelope.payload, json!({ "subject": "Cobrança" }));
    }

    #[test]
    fn decoder_skips_keep_alive_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": ping\n\nevent: debt.updated\ndata: {\"debtId\":\"d9\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "debt.updated");
    }

    #[test]
    fn non_json_data_is_rejected() {
        let event = SseEvent::parse("event: notification\ndata: hello").unwrap();
        assert!(matches!(
            event.into_envelope(),
            Err(TransportError::InvalidResponse(_))
        ));
    }
}
