//! `text/event-stream` frame decoding.
//!
//! Frames end at the leftmost `\r\n\r\n`, `\r\r` or `\n\n`. Inside a frame
//! only `event` and `data` keys matter; everything else is skipped rather than
//! treated as an error, so a single malformed line never kills the stream.

use tracing::trace;

const TERMINATORS: [&[u8]; 3] = [b"\r\n\r\n", b"\r\r", b"\n\n"];

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// `None` for a bare keep-alive frame.
    pub event_type: Option<String>,
    /// Joined `data:` lines, empty when there were none.
    pub payload: String,
}

impl StreamEvent {
    /// Keep-alive frame.
    pub fn heartbeat() -> Self {
        Self {
            event_type: None,
            payload: String::new(),
        }
    }

    /// Named event with a payload.
    pub fn named(event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            payload: payload.into(),
        }
    }

    /// True when the frame carried no event name.
    pub fn is_heartbeat(&self) -> bool {
        self.event_type.is_none()
    }
}

/// Incremental decoder: feed it raw chunks, pull complete events out.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already searched without finding a terminator.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes read from the connection.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Splits off the first complete frame, if the buffer holds one.
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        // A terminator may straddle the previous scan end by up to 3 bytes.
        let from = self.scanned.saturating_sub(3);
        let Some((start, len)) = find_terminator(&self.buf, from) else {
            self.scanned = self.buf.len();
            return None;
        };
        self.scanned = 0;
        let rest = self.buf.split_off(start + len);
        let mut frame = std::mem::replace(&mut self.buf, rest);
        frame.truncate(start);
        Some(parse_frame(&String::from_utf8_lossy(&frame)))
    }

    /// Bytes held back waiting for a terminator.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Leftmost terminator at or after `from` as `(offset, length)`. At equal
/// offsets the longer CRLF form wins so `\r\n\r\n` is never read as a lone `\r`.
fn find_terminator(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buf.len()).find_map(|i| {
        TERMINATORS
            .iter()
            .find(|t| buf[i..].starts_with(t))
            .map(|t| (i, t.len()))
    })
}

/// Parses the text of one frame (terminator already removed).
pub fn parse_frame(frame: &str) -> StreamEvent {
    let mut event_type = None;
    let mut data: Option<String> = None;

    for line in frame.split(|c| c == '\r' || c == '\n') {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            trace!(line, "skipping sse line without a colon");
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match key {
            "event" => {
                let name = value.trim();
                event_type = (!name.is_empty()).then(|| name.to_string());
            }
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            other => trace!(key = other, "ignoring sse field"),
        }
    }

    StreamEvent {
        event_type,
        payload: data.unwrap_or_default(),
    }
}
