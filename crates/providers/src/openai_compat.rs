//! OpenAI-compatible provider implementation.
//!
//! Works with any endpoint exposing `/chat/completions` in the OpenAI shape:
//! the local Copilot-style bridge on `localhost:4141`, OpenAI itself,
//! OpenRouter, Ollama, vLLM and friends.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Quota exhaustion reported distinctly from other transport failures
//! - Health checks

use async_trait::async_trait;
use boltstudio_config::AppConfig;
use boltstudio_core::error::ProviderError;
use boltstudio_core::message::{Message, Role};
use boltstudio_core::provider::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Phrases an endpoint uses in an error body when the account's allowance is
/// spent rather than the request being malformed or unauthorized.
const QUOTA_MARKERS: &[&str] = &[
    "usage limit",
    "quota",
    "insufficient_quota",
    "limit reached",
];

/// An OpenAI-compatible model provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Build from the loaded configuration. A missing key is sent as an empty
    /// bearer token; local bridges typically do not check it.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            "openai-compat",
            &config.api_url,
            config.api_key.clone().unwrap_or_default(),
        )
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    async fn send(
        &self,
        body: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
        Err(classify_error(status, &error_body))
    }
}

/// Map a non-success status and its body onto the error taxonomy.
///
/// Quota exhaustion must stay distinguishable from everything else: the loop
/// reports it to the user differently and never retries it.
pub fn classify_error(status: u16, body: &str) -> ProviderError {
    let lower = body.to_ascii_lowercase();
    let mentions_quota = QUOTA_MARKERS.iter().any(|m| lower.contains(m));

    match status {
        402 => ProviderError::QuotaExceeded(error_message(body)),
        403 | 429 if mentions_quota => ProviderError::QuotaExceeded(error_message(body)),
        429 => ProviderError::RateLimited {
            retry_after_secs: 5,
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: error_message(body),
        },
    }
}

/// Pull a human-readable message out of an error body, which may be
/// `{"error": {"message": ..}}`, `{"error": ".."}` or plain text.
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v["error"]["message"]
            .as_str()
            .or_else(|| v["error"].as_str())
            .or_else(|| v["message"].as_str())
            .map(String::from)
    });
    from_json.unwrap_or_else(|| body.trim().to_string())
}

/// Accumulates raw stream bytes and hands out complete lines. Decoding
/// waits for the newline, so a character split across network chunks
/// arrives intact.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// The next `\n`-terminated line, without its terminator.
    fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        Some(
            String::from_utf8(line)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
        )
    }
}

/// One meaningful SSE line.
#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Usage(Usage),
    Done,
}

/// Interpret one line of the event stream. Comments, blank lines, empty
/// deltas and unparseable payloads yield nothing.
fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let parsed = match serde_json::from_str::<StreamResponse>(data) {
        Ok(p) => p,
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            return None;
        }
    };

    if let Some(content) = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
    {
        return Some(SseEvent::Delta(content));
    }

    parsed.usage.map(|u| {
        SseEvent::Usage(Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
    })
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = Self::request_body(&request, false);
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self.send(&body, false).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage,
            model: api_response.model,
        })
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let body = Self::request_body(&request, true);
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.send(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Read the SSE byte stream; dropping `rx` ends this task at the next send
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut usage = None;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                lines.push(&bytes);

                while let Some(line) = lines.next_line() {
                    match parse_sse_line(&line) {
                        Some(SseEvent::Delta(text)) => {
                            if tx.send(Ok(StreamChunk::delta(text))).await.is_err() {
                                trace!(provider = %provider_name, "Stream receiver dropped");
                                return;
                            }
                        }
                        Some(SseEvent::Usage(u)) => usage = Some(u),
                        Some(SseEvent::Done) => {
                            let _ = tx.send(Ok(StreamChunk::finished(usage))).await;
                            return;
                        }
                        None => {}
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(StreamChunk::finished(usage))).await;
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_constructor_uses_api_url() {
        let config = AppConfig::default();
        let provider = OpenAiCompatProvider::from_config(&config);
        assert_eq!(provider.base_url(), "http://localhost:4141/v1");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("x", "http://host/v1/", "k");
        assert_eq!(provider.base_url(), "http://host/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("Hello"),
            Message::assistant("Hi"),
        ];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 3);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(api_messages[2].role, "assistant");
    }

    #[test]
    fn streaming_body_requests_usage() {
        let request = ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.2,
            max_tokens: Some(100),
            stream: true,
        };
        let body = OpenAiCompatProvider::request_body(&request, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["max_tokens"], 100);

        let body = OpenAiCompatProvider::request_body(&request, false);
        assert!(body.get("stream_options").is_none());
    }

    // --- Error classification ---

    #[test]
    fn usage_limit_403_is_quota() {
        let err = classify_error(403, r#"{"error":{"message":"Usage limit reached"}}"#);
        assert!(err.is_quota_exceeded());
        assert!(err.to_string().contains("Usage limit reached"));
    }

    #[test]
    fn plain_403_is_authentication() {
        let err = classify_error(403, "forbidden");
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[test]
    fn insufficient_quota_429_is_quota_but_plain_429_is_rate_limit() {
        assert!(classify_error(429, r#"{"error":{"code":"insufficient_quota"}}"#).is_quota_exceeded());
        assert!(matches!(
            classify_error(429, "slow down"),
            ProviderError::RateLimited { .. }
        ));
    }

    #[test]
    fn payment_required_is_quota() {
        assert!(classify_error(402, "").is_quota_exceeded());
    }

    #[test]
    fn server_error_is_transport() {
        let err = classify_error(502, r#"{"error":"bad gateway"}"#);
        assert!(!err.is_quota_exceeded());
        match err {
            ProviderError::ApiError { status_code, message } => {
                assert_eq!(status_code, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // --- SSE parsing ---

    #[test]
    fn parse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), Some(SseEvent::Delta("Hello".into())));
    }

    #[test]
    fn parse_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseEvent::Done));
        assert_eq!(parse_sse_line("data:[DONE]\r"), Some(SseEvent::Done));
    }

    #[test]
    fn parse_usage_chunk() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        assert_eq!(
            parse_sse_line(line),
            Some(SseEvent::Usage(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }))
        );
    }

    #[test]
    fn ignorable_lines() {
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("event: message"), None);
        assert_eq!(parse_sse_line("data: {not json"), None);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            None
        );
    }

    // --- Byte stream framing ---

    #[test]
    fn line_buffer_joins_character_split_across_chunks() {
        let bytes = "data: Zähler\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut lines = LineBuffer::default();
        lines.push(&bytes[..split]);
        assert_eq!(lines.next_line(), None);
        lines.push(&bytes[split..]);
        assert_eq!(lines.next_line().as_deref(), Some("data: Zähler"));
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn line_buffer_yields_every_complete_line() {
        let mut lines = LineBuffer::default();
        lines.push(b"data: a\r\n\ndata: [DO");
        assert_eq!(lines.next_line().as_deref(), Some("data: a\r"));
        assert_eq!(lines.next_line().as_deref(), Some(""));
        assert_eq!(lines.next_line(), None);
        lines.push(b"NE]\n");
        assert_eq!(lines.next_line().as_deref(), Some("data: [DONE]"));
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) {
        use tokio::io::AsyncReadExt;

        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            received.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&received);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if received.len() >= header_end + 4 + length {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn stream_preserves_character_split_across_network_chunks() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"Zähler\"}}]}\n\ndata: [DONE]\n\n";
        let bytes = event.as_bytes().to_vec();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for part in [&bytes[..split], &bytes[split..]] {
                let mut chunk = format!("{:x}\r\n", part.len()).into_bytes();
                chunk.extend_from_slice(part);
                chunk.extend_from_slice(b"\r\n");
                socket.write_all(&chunk).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
        });

        let provider = OpenAiCompatProvider::new("local", format!("http://{addr}/v1"), "k");
        let request = ProviderRequest {
            model: "m".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.0,
            max_tokens: None,
            stream: true,
        };
        let mut rx = provider.stream(request).await.unwrap();

        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            if let Some(content) = chunk.content {
                text.push_str(&content);
            }
            if chunk.done {
                break;
            }
        }
        assert_eq!(text, "Zähler");
    }
}
