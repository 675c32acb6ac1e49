//! Incremental Server-Sent Events parser for remote providers.
//!
//! Remote providers push two kinds of events: one `endpoint` event naming
//! the URL to POST requests to, then `message` events carrying JSON-RPC
//! frames.

use bytes::{Buf, BytesMut};

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field; `message` when absent.
    pub event: String,
    pub data: String,
}

/// Accumulates raw bytes and yields complete events.
///
/// Bytes are decoded one complete line at a time, so a character or a
/// `\r\n` split across network chunks is reassembled before parsing.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: BytesMut,
    event: Option<String>,
    data: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the stream and drain every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((line_len, terminator_len)) = next_line(&self.buffer) {
            let raw = self.buffer.split_to(line_len);
            self.buffer.advance(terminator_len);

            let line = String::from_utf8_lossy(&raw);
            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else {
                self.field(&line);
            }
        }
        events
    }

    fn field(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => match self.data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            // id and retry carry nothing we act on
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: self.data.take()?,
        })
    }
}

/// Length of the next complete line and of its terminator. A trailing `\r`
/// stays buffered until the next byte shows whether `\n` follows it.
fn next_line(buf: &[u8]) -> Option<(usize, usize)> {
    let pos = buf.iter().position(|&b| b == b'\n' || b == b'\r')?;
    if buf[pos] == b'\n' {
        return Some((pos, 1));
    }
    match buf.get(pos + 1) {
        Some(b'\n') => Some((pos, 2)),
        Some(_) => Some((pos, 1)),
        None => None,
    }
}
