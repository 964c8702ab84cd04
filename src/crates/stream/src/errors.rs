//! Error types for the ingestion engine

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// A session is already open for this conversation. Caller must cancel it first.
    #[error("Session busy: conversation {conversation_id} already has an open stream")]
    SessionBusy { conversation_id: String },

    /// Mutation attempted after finalize/discard.
    #[error("Session closed: the in-flight message is finalized")]
    ClosedSession,

    /// Non-2xx response, connection failure or idle timeout.
    #[error("Transport error{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Explicit `error` event from the server.
    #[error("Server error: {0}")]
    Server(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StreamError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Whether the UI should render a failure affordance for this error.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Server(_))
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport {
            status: error.status().map(|status| status.as_u16()),
            message: error.to_string(),
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}
