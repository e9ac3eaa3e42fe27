//! Incremental Server-Sent Events parser.
//!
//! Bytes arrive in arbitrary chunks; [`SseParser::feed`] buffers partial
//! lines and returns every event completed by the chunk.

use std::time::Duration;

/// Event names whose data is a vehicle payload
pub const PAYLOAD_EVENTS: [&str; 3] = ["message", "snapshot", "vehicles"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// `message` when the server sent no `event:` field
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    pub fn carries_payload(&self) -> bool {
        PAYLOAD_EVENTS.contains(&self.event.as_str())
    }
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
    retry: Option<Duration>,
    /// Bytes or lines seen since the last call to `take_activity`
    activity: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if !chunk.is_empty() {
            self.activity = true;
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r') {
            // A CR right at the end may be the first half of a CRLF
            if self.buffer[pos] == b'\r' && pos + 1 == self.buffer.len() {
                break;
            }
            let skip = if self.buffer[pos] == b'\r' && self.buffer.get(pos + 1) == Some(&b'\n') {
                2
            } else {
                1
            };

            let line: Vec<u8> = self.buffer.drain(..pos + skip).take(pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_owned());
                }
            }
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "message".to_owned()),
            data,
            id: self.last_id.clone(),
        })
    }

    /// Reconnect delay requested by the server
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    /// Whether anything arrived since the last call, comments included
    pub fn take_activity(&mut self) -> bool {
        std::mem::take(&mut self.activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_events() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: snapshot\ndata: {\"a\":1}\n\ndata: hello\n\n");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "snapshot");
        assert_eq!(events[0].data, "{\"a\":1}");
        assert!(events[0].carries_payload());
        assert_eq!(events[1].event, "message");
        assert_eq!(events[1].data, "hello");
    }

    #[test]
    fn test_chunks_split_anywhere() {
        let stream = b"id: 7\r\nevent: vehicles\r\ndata: line one\r\ndata: line two\r\n\r\n";
        let mut parser = SseParser::new();
        let mut events = Vec::new();
        for byte in stream.iter() {
            events.extend(parser.feed(std::slice::from_ref(byte)));
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "vehicles");
        assert_eq!(events[0].data, "line one\nline two");
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(parser.last_event_id(), Some("7"));
    }

    #[test]
    fn test_comments_retry_and_other_events() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": keepalive\n\nretry: 2500\nevent: ping\ndata: x\n\nevent: empty\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "ping");
        assert!(!events[0].carries_payload());
        assert_eq!(parser.retry(), Some(Duration::from_millis(2500)));
        assert!(parser.take_activity());
        assert!(!parser.take_activity());
    }

    #[test]
    fn test_incomplete_event_waits() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: partial").is_empty());
        assert!(parser.feed(b"\n").is_empty());
        let events = parser.feed(b"\n");
        assert_eq!(events[0].data, "partial");
    }
}
