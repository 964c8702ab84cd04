use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a decoded protocol event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    ThinkingStart,
    ThinkingToken,
    ThinkingEnd,
    ResponseStart,
    Token,
    ResponseEnd,
    FileReady,
    Done,
    Error,
    Heartbeat,
    /// Any `type` string this build does not know. Never aborts a session.
    Unknown,
}

impl EventKind {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "status" => Self::Status,
            "thinking_start" => Self::ThinkingStart,
            "thinking_token" => Self::ThinkingToken,
            "thinking_end" => Self::ThinkingEnd,
            "response_start" => Self::ResponseStart,
            "token" => Self::Token,
            "response_end" => Self::ResponseEnd,
            "file_ready" | "file_generated" => Self::FileReady,
            "done" => Self::Done,
            "error" => Self::Error,
            "heartbeat" => Self::Heartbeat,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::ThinkingStart => "thinking_start",
            Self::ThinkingToken => "thinking_token",
            Self::ThinkingEnd => "thinking_end",
            Self::ResponseStart => "response_start",
            Self::Token => "token",
            Self::ResponseEnd => "response_end",
            Self::FileReady => "file_ready",
            Self::Done => "done",
            Self::Error => "error",
            Self::Heartbeat => "heartbeat",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete event decoded from the response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub kind: EventKind,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl StreamEvent {
    pub fn new(kind: EventKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            metadata: None,
        }
    }

    /// Raw answer text, used for lines that are not structured events.
    pub fn token(text: impl Into<String>) -> Self {
        Self::new(EventKind::Token, text)
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
