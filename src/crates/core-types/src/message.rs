use serde::{Deserialize, Serialize};

/// Phase of one streaming session. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Idle,
    Reasoning,
    Answering,
    Finished,
    Aborted,
    Failed,
}

impl PhaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Aborted | Self::Failed)
    }
}

/// Which text buffer of the in-flight message a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    Reasoning,
    Answer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    #[default]
    Assistant,
}

/// A generated file announced by a `file_ready` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    #[serde(alias = "file_id")]
    pub id: String,
    #[serde(alias = "filename", alias = "file_name")]
    pub name: String,
    #[serde(default, alias = "mime_type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(
        default,
        alias = "size",
        alias = "size_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub size_bytes: Option<u64>,
    #[serde(
        default,
        alias = "url",
        alias = "download_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,
}

/// Point-in-time copy of the in-flight assistant message.
///
/// Owned values only: mutating the live message never shows through a
/// snapshot taken earlier.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSnapshot {
    pub role: MessageRole,
    pub answer_text: String,
    pub reasoning_text: String,
    pub reasoning_active: bool,
    #[serde(default)]
    pub reasoning_elapsed_ms: Option<u64>,
    #[serde(default)]
    pub attached_artifact: Option<FileRef>,
    pub is_open: bool,
}
