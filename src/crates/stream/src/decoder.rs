//! Line-oriented frame decoder for the response stream
//!
//! Network chunks never line up with frames, so the decoder keeps the bytes
//! of the last unterminated line between calls. Splitting happens on raw
//! bytes; `\n` can never occur inside a multi-byte UTF-8 sequence, so a
//! character cut in half by a chunk boundary is reassembled before decoding.

use log::{debug, trace};
use parley_core_types::{EventKind, StreamEvent};
use serde_json::Value;

const DATA_PREFIX: &str = "data:";

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one chunk and return every event completed by it.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|byte| *byte == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|byte| *byte == b'\n')
            .filter_map(|line| parse_line(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// End of stream. Unterminated data is not an event and is dropped.
    pub fn flush(&mut self) {
        if !self.buffer.is_empty() {
            debug!(
                "Discarding unterminated stream data at end of input: bytes={}",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }
}

fn parse_line(line: &str) -> Option<StreamEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let data = line.strip_prefix(DATA_PREFIX)?.trim();
    if data.is_empty() {
        return None;
    }
    Some(parse_event(data))
}

/// Parse the body of one `data:` line. Never fails: anything that is not a
/// structured event degrades to a raw token carrying the text verbatim.
pub fn parse_event(data: &str) -> StreamEvent {
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            debug!("Non-JSON stream line treated as raw token: error={}", e);
            return StreamEvent::token(data);
        }
    };

    let Value::Object(mut object) = value else {
        debug!("Non-object JSON stream line treated as raw token");
        return StreamEvent::token(data);
    };

    let Some(kind) = object.get("type").and_then(Value::as_str).map(EventKind::from_wire) else {
        debug!("Stream line without string `type` treated as raw token");
        return StreamEvent::token(data);
    };

    if kind == EventKind::Unknown {
        trace!(
            "Unknown stream event type: type={}",
            object.get("type").and_then(Value::as_str).unwrap_or_default()
        );
    }

    let payload = match object.remove("data") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    };
    let metadata = match object.remove("metadata") {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    };

    StreamEvent {
        kind,
        payload,
        metadata,
    }
}
