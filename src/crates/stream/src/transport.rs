//! Transport collaborators: auth token source and the byte-chunk opener
//!
//! Closing a transport means dropping its `ChunkStream`; for HTTP that tears
//! the connection down so a pending read unblocks immediately.

use crate::config::StreamConfig;
use crate::errors::{StreamError, StreamResult};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, warn};
use parley_core_types::StreamRequest;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";
const MAX_ERROR_BODY_CHARS: usize = 512;

pub type ChunkStream = BoxStream<'static, StreamResult<Vec<u8>>>;

/// Source of the bearer token for the stream endpoint.
pub trait AuthProvider: Send + Sync {
    fn current_token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

impl AuthProvider for StaticTokenProvider {
    fn current_token(&self) -> Option<String> {
        self.token.clone()
    }
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: StreamRequest,
}

impl TransportRequest {
    pub fn new(url: impl Into<String>, body: StreamRequest, token: Option<String>) -> Self {
        let mut headers = HashMap::new();
        if let Some(token) = token {
            headers.insert(AUTHORIZATION.as_str().to_string(), token);
        }
        Self {
            url: url.into(),
            headers,
            body,
        }
    }
}

/// Opens the response byte stream for one request.
#[async_trait]
pub trait TransportOpener: Send + Sync {
    /// Must return promptly once `cancel` fires.
    async fn open(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> StreamResult<ChunkStream>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    /// Bound on waiting for response headers and on reading an error body.
    response_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &StreamConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .use_rustls_tls()
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to create HTTP client, using default config: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            response_timeout: config.idle_timeout(),
        }
    }

    pub fn with_client(client: reqwest::Client, response_timeout: Duration) -> Self {
        Self {
            client,
            response_timeout,
        }
    }
}

#[async_trait]
impl TransportOpener for HttpTransport {
    async fn open(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> StreamResult<ChunkStream> {
        let TransportRequest { url, headers, body } = request;
        debug!("Opening stream: url={}, chat_id={}", url, body.chat_id);

        let send = self
            .client
            .post(&url)
            .headers(build_headers(&headers))
            .header(ACCEPT, EVENT_STREAM_MIME_TYPE)
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(StreamError::transport(None, "request cancelled before response"));
            }
            result = tokio::time::timeout(self.response_timeout, send) => match result {
                Ok(response) => response?,
                Err(_) => {
                    return Err(StreamError::transport(
                        None,
                        format!(
                            "no response headers after {}s",
                            self.response_timeout.as_secs()
                        ),
                    ));
                }
            },
        };

        let status = response.status();
        if !status.is_success() {
            let text = tokio::select! {
                _ = cancel.cancelled() => String::new(),
                text = tokio::time::timeout(self.response_timeout, response.text()) => {
                    text.ok().and_then(Result::ok).unwrap_or_default()
                }
            };
            let detail: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(StreamError::transport(
                Some(status.as_u16()),
                if detail.trim().is_empty() {
                    status.to_string()
                } else {
                    detail
                },
            ));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(StreamError::from))
            .boxed())
    }
}

fn normalize_authorization_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    // A value with an inner space is taken as `<scheme> <credentials>`.
    if trimmed.contains(char::is_whitespace) {
        return Some(trimmed.to_string());
    }
    Some(format!("Bearer {}", trimmed))
}

/// Request headers for the stream call. Entries that are not valid HTTP are
/// dropped with a warning rather than failing the session.
fn build_headers(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, raw) in headers {
        let Ok(name) = HeaderName::from_str(name) else {
            warn!("Dropping request header with invalid name: {}", name);
            continue;
        };
        let value = if name == AUTHORIZATION {
            normalize_authorization_value(raw)
        } else {
            Some(raw.trim().to_string())
        };
        let Some(value) = value else {
            continue;
        };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                map.insert(name, value);
            }
            Err(_) => warn!("Dropping request header with invalid value: header={}", name),
        }
    }
    map
}
