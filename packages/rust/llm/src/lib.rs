//! OpenAI-compatible chat completions client.
//!
//! [`ChatModel`] is the seam the rest of the workspace programs against;
//! [`LlmClient`] implements it over HTTP. Plain requests are streamed as
//! server-sent events and accumulated; JSON-mode requests use a single
//! non-streaming call with `response_format: json_object`.

mod sse;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use mojarung_shared::{LlmConfig, MojarungError, Result};

/// Maximum bytes of an error body kept for diagnostics.
const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A single-message chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub prompt: String,
    /// Model override; `None` uses the client default.
    pub model: Option<String>,
    pub role: String,
    /// Completion budget override; `None` uses the client default.
    pub max_tokens: Option<u32>,
    /// Temperature override; `None` uses the client default.
    pub temperature: Option<f32>,
    /// Ask for a JSON object reply.
    pub json_mode: bool,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            role: "user".into(),
            max_tokens: None,
            temperature: None,
            json_mode: false,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Anything that can answer a chat request with text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run the request and return the full assistant reply.
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Chat completions over an OpenAI-compatible HTTP API.
pub struct LlmClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClient {
    /// Build a client from config and an already-resolved API key.
    pub fn from_config(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MojarungError::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": [{ "role": request.role, "content": request.prompt }],
            "stream": !request.json_mode,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "temperature": request.temperature.unwrap_or(self.temperature),
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| MojarungError::Llm(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = read_capped_error_body(response).await;
            return Err(MojarungError::Llm(format!("API error {status}: {body}")));
        }
        Ok(response)
    }

    async fn complete_json(&self, request: &ChatRequest) -> Result<String> {
        let response = self.send(request).await?;
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MojarungError::Llm(format!("invalid response body: {e}")))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| MojarungError::Llm("response has no message content".into()))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let started = std::time::Instant::now();
        let reply = if request.json_mode {
            self.complete_json(&request).await?
        } else {
            let response = self.send(&request).await?;
            sse::collect_stream(response).await?
        };

        tracing::debug!(
            chars = reply.chars().count(),
            json_mode = request.json_mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "llm reply received"
        );

        if reply.trim().is_empty() {
            return Err(MojarungError::Llm("empty reply".into()));
        }
        Ok(reply)
    }
}

async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

// ---------------------------------------------------------------------------
// Reply helpers
// ---------------------------------------------------------------------------

/// Remove a surrounding Markdown code fence (```` ```json ```` or ```` ``` ````).
pub fn strip_code_fence(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Strip a code fence and deserialize the reply.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| MojarungError::parse(format!("LLM reply is not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> LlmClient {
        let config = LlmConfig {
            base_url: format!("{}/v1", server.uri()),
            ..LlmConfig::default()
        };
        LlmClient::from_config(&config, "test-key").expect("client")
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"b\": 2} "), "{\"b\": 2}");
    }

    #[test]
    fn parse_reply_reports_garbage() {
        #[derive(Debug, serde::Deserialize)]
        struct Reply {
            answer: String,
        }
        let ok: Reply = parse_json_reply("```json\n{\"answer\": \"да\"}\n```").expect("parse");
        assert_eq!(ok.answer, "да");

        let err = parse_json_reply::<Reply>("not json").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn request_body_uses_defaults_and_overrides() {
        let config = LlmConfig::default();
        let client = LlmClient::from_config(&config, "k").expect("client");

        let body = client.body(&ChatRequest::new("привет"));
        assert_eq!(body["model"], "deepseek-ai/DeepSeek-V3-0324");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 2024);
        assert!(body.get("response_format").is_none());

        let body = client.body(
            &ChatRequest::new("x")
                .json()
                .max_tokens(1024)
                .role("system")
                .model("other/model"),
        );
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["model"], "other/model");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[tokio::test]
    async fn streams_and_accumulates_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Рынок \"}}]}\n\n",
            ": keep-alive\n\n",
            "data: not-json\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"растёт\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({ "stream": true })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .complete(ChatRequest::new("Что с рынком?"))
            .await
            .expect("reply");
        assert_eq!(reply, "Рынок растёт");
    }

    #[tokio::test]
    async fn json_mode_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "stream": false,
                "response_format": { "type": "json_object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"action\":\"hold\"}" } }]
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .complete(ChatRequest::new("rec").json().temperature(0.2))
            .await
            .expect("reply");
        assert_eq!(reply, "{\"action\":\"hold\"}");
    }

    #[tokio::test]
    async fn api_errors_carry_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(ChatRequest::new("x"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("429"), "{msg}");
        assert!(msg.contains("slow down"), "{msg}");
    }

    #[tokio::test]
    async fn empty_stream_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("data: [DONE]\n\n"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(ChatRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, MojarungError::Llm(_)));
    }
}
