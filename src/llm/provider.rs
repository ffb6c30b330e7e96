//! Model provider abstraction for different LLM APIs
//!
//! Supports:
//! - Ollama (local models, NDJSON streaming)
//! - OpenAI-compatible chat completions (SSE streaming)
//! - Google Gemini (SSE streaming)
//!
//! # Example
//!
//! ```no_run
//! use subvenciones::llm::provider::create_provider;
//! use subvenciones::config::ModelConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = create_provider(ModelConfig::default())?;
//! provider.validate_connection().await?;
//! let response = provider.generate("Hola").await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

use crate::config::{ModelConfig, ModelProvider as ProviderType};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Response from a model provider
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Raw fragments coming from a streaming completion
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Model provider trait
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Generate a completion
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError>;

    /// Start a streaming completion
    async fn generate_stream(&self, prompt: &str) -> Result<ProviderStream, ProviderError>;

    /// Validate connection to the provider
    async fn validate_connection(&self) -> Result<(), ProviderError>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the provider type
    fn provider_type(&self) -> ProviderType;
}

/// Create a model provider from configuration
pub fn create_provider(config: ModelConfig) -> Result<Box<dyn ModelProvider>, ProviderError> {
    match config.provider {
        ProviderType::Ollama => Ok(Box::new(OllamaProvider::new(config))),
        ProviderType::OpenAI => Ok(Box::new(OpenAIProvider::new(config)?)),
        ProviderType::Gemini => Ok(Box::new(GeminiProvider::new(config)?)),
    }
}

fn build_client(config: &ModelConfig) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .unwrap_or_default()
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::ConnectionError(e.to_string())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::AuthError(format!("HTTP {}", status)));
    }
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(ProviderError::ModelError(format!(
            "HTTP {}: {}",
            status, error_text
        )));
    }
    Ok(response)
}

// ============================================================================
// Streaming decode
// ============================================================================

/// What a single line of a streaming body means
#[derive(Debug, PartialEq)]
pub(crate) enum LineEvent {
    Text(String),
    Skip,
    Done,
    Invalid(String),
}

struct LineDecoder<S, F> {
    bytes: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, ProviderError>>,
    finished: bool,
    parse: F,
}

impl<S, F> LineDecoder<S, F>
where
    F: Fn(&str) -> LineEvent,
{
    fn push_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match (self.parse)(line) {
            LineEvent::Text(text) if !text.is_empty() => self.pending.push_back(Ok(text)),
            LineEvent::Text(_) | LineEvent::Skip => {}
            LineEvent::Done => self.finished = true,
            LineEvent::Invalid(reason) => {
                // Un fragmento corrupto no aborta el stream
                tracing::warn!("Failed to parse streaming chunk: {} - Line: {}", reason, line);
            }
        }
    }

    fn drain_complete_lines(&mut self) {
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            self.push_line(&line);
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }
}

/// Turn a chunked HTTP body into text fragments, one parsed line at a time.
///
/// Lines are split on raw bytes so multi-byte characters cut between chunks
/// survive intact.
pub(crate) fn decode_lines<S, B, F>(bytes: S, parse: F) -> ProviderStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    F: Fn(&str) -> LineEvent + Send + 'static,
{
    let decoder = LineDecoder {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
        parse,
    };

    Box::pin(stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(item) = decoder.pending.pop_front() {
                return Some((item, decoder));
            }
            if decoder.finished {
                return None;
            }
            match decoder.bytes.next().await {
                Some(Ok(chunk)) => {
                    decoder.buffer.extend_from_slice(chunk.as_ref());
                    decoder.drain_complete_lines();
                }
                Some(Err(e)) => {
                    decoder.finished = true;
                    decoder.pending.push_back(Err(ProviderError::HttpError(e)));
                }
                None => {
                    let rest = std::mem::take(&mut decoder.buffer);
                    decoder.push_line(&rest);
                    decoder.finished = true;
                }
            }
        }
    }))
}

/// Strip the `data:` prefix of a server-sent event line
fn sse_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

// ============================================================================
// Ollama Provider
// ============================================================================

pub struct OllamaProvider {
    config: ModelConfig,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: ModelConfig) -> Self {
        let client = build_client(&config);
        Self { config, client }
    }

    fn request(&self, prompt: &str, stream: bool) -> OllamaRequest {
        OllamaRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream,
            options: Some(OllamaOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                num_predict: self.config.max_tokens,
            }),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    done: bool,
}

/// Ollama streaming response (one NDJSON line)
#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

pub(crate) fn parse_ollama_line(line: &str) -> LineEvent {
    match serde_json::from_str::<OllamaStreamChunk>(line) {
        Ok(chunk) if chunk.done && chunk.response.is_empty() => LineEvent::Done,
        Ok(chunk) => LineEvent::Text(chunk.response),
        Err(e) => LineEvent::Invalid(e.to_string()),
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/api/generate", self.config.url);

        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt, false))
            .send()
            .await
            .map_err(map_send_error)?;
        let response = ensure_success(response).await?;

        let ollama_response: OllamaResponse = response.json().await?;

        Ok(ProviderResponse {
            content: ollama_response.response,
            model: ollama_response.model,
            finish_reason: Some(if ollama_response.done { "stop" } else { "length" }.to_string()),
        })
    }

    async fn generate_stream(&self, prompt: &str) -> Result<ProviderStream, ProviderError> {
        let url = format!("{}/api/generate", self.config.url);

        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt, true))
            .send()
            .await
            .map_err(map_send_error)?;
        let response = ensure_success(response).await?;

        Ok(decode_lines(Box::pin(response.bytes_stream()), parse_ollama_line))
    }

    async fn validate_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/tags", self.config.url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::ConnectionError(format!(
                "Failed to connect to Ollama at {}",
                self.config.url
            )));
        }

        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Ollama
    }
}

// ============================================================================
// OpenAI Provider
// ============================================================================

pub struct OpenAIProvider {
    config: ModelConfig,
    client: Client,
    api_key: String,
}

impl OpenAIProvider {
    pub fn new(config: ModelConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| ProviderError::AuthError("OpenAI API key not found".to_string()))?;

        let client = build_client(&config);

        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    fn request(&self, prompt: &str, stream: bool) -> OpenAIRequest {
        OpenAIRequest {
            model: self.config.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
            stream,
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    model: String,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) fn parse_openai_line(line: &str) -> LineEvent {
    let Some(payload) = sse_payload(line) else {
        return LineEvent::Skip;
    };
    if payload == "[DONE]" {
        return LineEvent::Done;
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => LineEvent::Text(
            value
                .pointer("/choices/0/delta/content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Err(e) => LineEvent::Invalid(e.to_string()),
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.config.url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt, false))
            .send()
            .await
            .map_err(map_send_error)?;
        let response = ensure_success(response).await?;

        let openai_response: OpenAIResponse = response.json().await?;

        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            model: openai_response.model,
            finish_reason: choice.finish_reason,
        })
    }

    async fn generate_stream(&self, prompt: &str) -> Result<ProviderStream, ProviderError> {
        let url = format!("{}/chat/completions", self.config.url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt, true))
            .send()
            .await
            .map_err(map_send_error)?;
        let response = ensure_success(response).await?;

        Ok(decode_lines(Box::pin(response.bytes_stream()), parse_openai_line))
    }

    async fn validate_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/models", self.config.url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthError("Invalid API key".to_string()));
        }

        if !response.status().is_success() {
            return Err(ProviderError::ConnectionError(format!(
                "Failed to connect to OpenAI: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }
}

// ============================================================================
// Gemini Provider
// ============================================================================

pub struct GeminiProvider {
    config: ModelConfig,
    client: Client,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(config: ModelConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| ProviderError::AuthError("Gemini API key not found".to_string()))?;

        let client = build_client(&config);

        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    fn body(&self, prompt: &str) -> Value {
        let mut generation_config = json!({
            "temperature": self.config.temperature,
            "topP": self.config.top_p,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        })
    }

    fn model_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }
}

/// First text part of the first candidate, if any
fn gemini_text(value: &Value) -> Option<&str> {
    value
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
}

pub(crate) fn parse_gemini_line(line: &str) -> LineEvent {
    let Some(payload) = sse_payload(line) else {
        return LineEvent::Skip;
    };
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => match gemini_text(&value) {
            Some(text) => LineEvent::Text(text.to_string()),
            None => {
                tracing::debug!("Gemini chunk without parts, probably the end of the stream");
                LineEvent::Skip
            }
        },
        Err(e) => LineEvent::Invalid(e.to_string()),
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .client
            .post(self.model_url("generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .json(&self.body(prompt))
            .send()
            .await
            .map_err(map_send_error)?;
        let response = ensure_success(response).await?;

        let value: Value = response.json().await?;
        let content = gemini_text(&value).ok_or_else(|| {
            ProviderError::InvalidResponse(format!(
                "No text in Gemini response: {}",
                truncate(&value.to_string(), 500)
            ))
        })?;

        Ok(ProviderResponse {
            content: content.to_string(),
            model: self.config.model.clone(),
            finish_reason: value
                .pointer("/candidates/0/finishReason")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn generate_stream(&self, prompt: &str) -> Result<ProviderStream, ProviderError> {
        let response = self
            .client
            .post(self.model_url("streamGenerateContent"))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(&self.body(prompt))
            .send()
            .await
            .map_err(map_send_error)?;
        let response = ensure_success(response).await?;

        Ok(decode_lines(Box::pin(response.bytes_stream()), parse_gemini_line))
    }

    async fn validate_connection(&self) -> Result<(), ProviderError> {
        let url = format!(
            "{}/models/{}",
            self.config.url.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::ConnectionError(format!(
                "Failed to reach Gemini model {}: HTTP {}",
                self.config.model,
                response.status()
            )));
        }

        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Gemini
    }
}

/// Cut a string to at most `max` characters (char-boundary safe)
pub(crate) fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
