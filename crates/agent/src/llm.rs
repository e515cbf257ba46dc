//! Port and HTTP adapter for the generative-AI capability.
//!
//! The router only ever sees [`LlmClient`]. [`HttpLlmClient`] speaks the three
//! supported provider dialects; every failure collapses into
//! [`AiUnavailableError`] so callers can degrade to local replies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use cartwise_core::config::{LlmConfig, LlmProvider};
use cartwise_core::errors::ApplicationError;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AiUnavailableError {
    #[error("ai capability is disabled")]
    Disabled,
    #[error("ai request timed out after {0:?}")]
    Timeout(Duration),
    #[error("ai transport failure: {0}")]
    Transport(String),
    #[error("ai provider returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed ai response: {0}")]
    Malformed(String),
}

impl AiUnavailableError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<AiUnavailableError> for ApplicationError {
    fn from(value: AiUnavailableError) -> Self {
        Self::AiUnavailable(value.to_string())
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AiUnavailableError>;
}

/// Builds the configured client, or `None` when the capability is disabled
/// or cannot be constructed.
pub fn build_client(config: &LlmConfig) -> Option<Arc<dyn LlmClient>> {
    if !config.enabled {
        return None;
    }
    match HttpLlmClient::from_config(config) {
        Ok(client) => Some(Arc::new(client)),
        Err(error) => {
            warn!(
                event_name = "llm.client.unavailable",
                provider = config.provider.as_str(),
                error = %error,
                "ai client could not be built; chat will use local replies"
            );
            None
        }
    }
}

pub struct HttpLlmClient {
    http: Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    timeout: Duration,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, AiUnavailableError> {
        if !config.enabled {
            return Err(AiUnavailableError::Disabled);
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AiUnavailableError::Transport(error.to_string()))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            provider: config.provider,
            base_url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout,
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::Gemini => {
                format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
            }
            LlmProvider::OpenAi => format!("{}/v1/chat/completions", self.base_url),
            LlmProvider::Ollama => format!("{}/api/generate", self.base_url),
        }
    }

    async fn send_once(&self, prompt: &str) -> Result<String, AiUnavailableError> {
        let mut request = self.http.post(self.endpoint()).json(&request_body(
            self.provider,
            &self.model,
            prompt,
        ));
        if let Some(api_key) = &self.api_key {
            request = match self.provider {
                LlmProvider::Gemini => request.header("x-goog-api-key", api_key.expose_secret()),
                LlmProvider::OpenAi | LlmProvider::Ollama => {
                    request.bearer_auth(api_key.expose_secret())
                }
            };
        }

        let response = request.send().await.map_err(|error| self.map_transport(error))?;
        let status = response.status();
        let body = response.text().await.map_err(|error| self.map_transport(error))?;

        if !status.is_success() {
            return Err(AiUnavailableError::Status {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        extract_text(self.provider, &body)
    }

    fn map_transport(&self, error: reqwest::Error) -> AiUnavailableError {
        if error.is_timeout() {
            AiUnavailableError::Timeout(self.timeout)
        } else {
            AiUnavailableError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, AiUnavailableError> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(text) => {
                    debug!(
                        event_name = "llm.complete.succeeded",
                        provider = self.provider.as_str(),
                        attempt,
                        "ai completion received"
                    );
                    return Ok(text);
                }
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.complete.retry",
                        provider = self.provider.as_str(),
                        attempt,
                        error = %error,
                        "retrying ai completion"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Worst-case wall time of one completion: every attempt timing out plus the
/// linear backoff slept between attempts.
pub fn completion_budget(config: &LlmConfig) -> Duration {
    let retries = config.max_retries;
    let attempts = retries.saturating_add(1);
    let backoff_steps = retries.saturating_mul(retries.saturating_add(1)) / 2;
    Duration::from_secs(config.timeout_secs)
        .saturating_mul(attempts)
        .saturating_add(RETRY_BACKOFF.saturating_mul(backoff_steps))
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Gemini => GEMINI_BASE_URL,
        LlmProvider::OpenAi => OPENAI_BASE_URL,
        LlmProvider::Ollama => OLLAMA_BASE_URL,
    }
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

fn request_body(provider: LlmProvider, model: &str, prompt: &str) -> serde_json::Value {
    let body = match provider {
        LlmProvider::Gemini => serde_json::to_value(GeminiRequest {
            contents: vec![GeminiContent { parts: vec![GeminiPart { text: prompt }] }],
        }),
        LlmProvider::OpenAi => serde_json::to_value(OpenAiRequest {
            model,
            messages: vec![OpenAiMessage { role: "user", content: prompt }],
        }),
        LlmProvider::Ollama => {
            serde_json::to_value(OllamaRequest { model, prompt, stream: false })
        }
    };
    body.unwrap_or(serde_json::Value::Null)
}

/// Pulls the completion text out of a provider response body.
pub fn extract_text(provider: LlmProvider, body: &str) -> Result<String, AiUnavailableError> {
    let malformed = |error: serde_json::Error| AiUnavailableError::Malformed(error.to_string());
    let text = match provider {
        LlmProvider::Gemini => {
            let response: GeminiResponse = serde_json::from_str(body).map_err(malformed)?;
            response
                .candidates
                .into_iter()
                .next()
                .map(|candidate| {
                    candidate
                        .content
                        .parts
                        .into_iter()
                        .map(|part| part.text)
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default()
        }
        LlmProvider::OpenAi => {
            let response: OpenAiResponse = serde_json::from_str(body).map_err(malformed)?;
            response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .unwrap_or_default()
        }
        LlmProvider::Ollama => {
            let response: OllamaResponse = serde_json::from_str(body).map_err(malformed)?;
            response.response
        }
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(AiUnavailableError::Malformed(format!(
            "{} response carried no text",
            provider.as_str()
        )));
    }
    Ok(text.to_string())
}

/// Best-effort message from an error body: `error.message`, a bare `error`
/// string, or the status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        let error = value.get("error")?;
        error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .or_else(|| error.as_str())
            .map(str::to_string)
    });
    message.unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string())
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use secrecy::SecretString;

    use cartwise_core::config::{LlmConfig, LlmProvider};

    use std::time::Duration;

    use super::{
        build_client, completion_budget, error_message, extract_text, AiUnavailableError,
        HttpLlmClient,
    };

    fn config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            enabled: true,
            provider,
            api_key: Some(SecretString::from("test-key".to_string())),
            base_url: None,
            model: "gemini-1.5-flash".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        }
    }

    #[test]
    fn completion_budget_covers_every_attempt_and_backoff() {
        let mut settings = config(LlmProvider::Gemini);
        settings.max_retries = 2;
        // Three 5s attempts plus 250ms and 500ms of backoff.
        assert_eq!(completion_budget(&settings), Duration::from_millis(15_750));

        settings.max_retries = 0;
        assert_eq!(completion_budget(&settings), Duration::from_secs(5));
    }

    #[test]
    fn gemini_text_is_joined_from_first_candidate() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Drink "},{"text":"water."}]}}]}"#;
        assert_eq!(extract_text(LlmProvider::Gemini, body), Ok("Drink water.".to_string()));
    }

    #[test]
    fn openai_and_ollama_bodies_are_understood() {
        let openai = r#"{"choices":[{"message":{"role":"assistant","content":" Sure. "}}]}"#;
        let ollama = r#"{"model":"llama3","response":"Fine.","done":true}"#;

        assert_eq!(extract_text(LlmProvider::OpenAi, openai), Ok("Sure.".to_string()));
        assert_eq!(extract_text(LlmProvider::Ollama, ollama), Ok("Fine.".to_string()));
    }

    #[test]
    fn empty_or_invalid_bodies_are_malformed() {
        assert!(matches!(
            extract_text(LlmProvider::Gemini, r#"{"candidates":[]}"#),
            Err(AiUnavailableError::Malformed(_))
        ));
        assert!(matches!(
            extract_text(LlmProvider::OpenAi, "<html>"),
            Err(AiUnavailableError::Malformed(_))
        ));
    }

    #[test]
    fn error_message_prefers_provider_detail() {
        let body = r#"{"error":{"code":400,"message":"API key not valid"}}"#;
        assert_eq!(error_message(StatusCode::BAD_REQUEST, body), "API key not valid");
        assert_eq!(error_message(StatusCode::NOT_FOUND, r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream"), "Bad Gateway");
    }

    #[test]
    fn endpoints_follow_provider_dialect() {
        let gemini = HttpLlmClient::from_config(&config(LlmProvider::Gemini)).expect("client");
        assert_eq!(
            gemini.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );

        let mut ollama_config = config(LlmProvider::Ollama);
        ollama_config.base_url = Some("http://ollama.internal:11434/".to_string());
        let ollama = HttpLlmClient::from_config(&ollama_config).expect("client");
        assert_eq!(ollama.endpoint(), "http://ollama.internal:11434/api/generate");
    }

    #[test]
    fn disabled_capability_builds_no_client() {
        let mut disabled = config(LlmProvider::Gemini);
        disabled.enabled = false;

        assert!(build_client(&disabled).is_none());
        assert!(matches!(
            HttpLlmClient::from_config(&disabled),
            Err(AiUnavailableError::Disabled)
        ));
    }

    #[test]
    fn retry_policy_covers_transient_failures_only() {
        assert!(AiUnavailableError::Transport("reset".into()).is_retryable());
        assert!(AiUnavailableError::Status { status: 503, message: String::new() }.is_retryable());
        assert!(!AiUnavailableError::Status { status: 401, message: String::new() }.is_retryable());
        assert!(!AiUnavailableError::Malformed("x".into()).is_retryable());
    }
}
