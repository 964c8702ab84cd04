use serde::{Deserialize, Serialize};

/// JSON body posted to the stream endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub content: String,
    pub chat_id: String,
    pub include_thinking: bool,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<String>>,
}

/// Per-call options for starting a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOptions {
    /// `None` uses the configured default.
    #[serde(default)]
    pub include_reasoning: Option<bool>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub attachment_ids: Vec<String>,
}

impl StreamRequest {
    pub fn new(
        chat_id: impl Into<String>,
        content: impl Into<String>,
        include_thinking: bool,
        max_tokens: u32,
        attachment_ids: Vec<String>,
    ) -> Self {
        Self {
            content: content.into(),
            chat_id: chat_id.into(),
            include_thinking,
            max_tokens,
            file_ids: if attachment_ids.is_empty() {
                None
            } else {
                Some(attachment_ids)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StreamRequest;

    #[test]
    fn omits_file_ids_without_attachments() {
        let request = StreamRequest::new("chat-1", "hello", true, 512, vec![]);
        let value = serde_json::to_value(&request).expect("serializable");
        assert_eq!(
            value,
            serde_json::json!({
                "content": "hello",
                "chat_id": "chat-1",
                "include_thinking": true,
                "max_tokens": 512
            })
        );
    }

    #[test]
    fn carries_file_ids_when_attached() {
        let request = StreamRequest::new("chat-1", "see file", false, 64, vec!["f-9".into()]);
        let value = serde_json::to_value(&request).expect("serializable");
        assert_eq!(value["file_ids"], serde_json::json!(["f-9"]));
        assert_eq!(value["include_thinking"], false);
    }
}
