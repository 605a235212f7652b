//! Language model endpoints
//!
//! Every agent holds one `LanguageModel` handle. Calls are plain text in,
//! plain text out; callers decide what to do when a call fails.

use agentloop_common::config::{ModelConfig, ModelProvider};
use agentloop_common::error::{AgentLoopError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const GEMINI_API_KEY_HEADER: &str = "x-goog-api-key";

/// A text-generation endpoint
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a free-text reply for `prompt`
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier for logs
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<GenerateContent<'a>>,
}

#[derive(Serialize)]
struct GenerateContent<'a> {
    parts: Vec<GeneratePart<'a>>,
}

#[derive(Serialize)]
struct GeneratePart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Google Generative Language REST client
pub struct GeminiModel {
    base_url: String,
    model: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            model: model.into(),
            api_key: api_key.into(),
            http_client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// The key travels in a header so it never appears in request URLs
    fn request(&self, body: &GenerateRequest<'_>) -> reqwest::RequestBuilder {
        self.http_client
            .post(self.endpoint())
            .header(GEMINI_API_KEY_HEADER, &self.api_key)
            .json(body)
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![GeneratePart { text: prompt }],
            }],
        };

        let response = self.request(&body).send().await.map_err(|e| {
            AgentLoopError::model(format!("Gemini request failed: {}", e.without_url()))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AgentLoopError::model(format!(
                "Gemini API error {}: {}",
                status, body_text
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            AgentLoopError::model(format!(
                "Failed to parse Gemini response: {}",
                e.without_url()
            ))
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AgentLoopError::model("Gemini returned no text"));
        }

        debug!("Gemini {} returned {} chars", self.model, text.len());
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Returns the same reply for every prompt
///
/// Used for demo mode and tests. An optional latency makes every call yield
/// to the scheduler before answering.
pub struct StaticModel {
    reply: String,
    latency: Option<Duration>,
}

impl StaticModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl LanguageModel for StaticModel {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "static"
    }
}

/// Always fails; every agent judgment degrades to its fallback
pub struct UnavailableModel {
    reason: String,
}

impl UnavailableModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for UnavailableModel {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(AgentLoopError::model(self.reason.clone()))
    }

    fn model_name(&self) -> &str {
        "unavailable"
    }
}

/// Bounds each call of the wrapped model by a deadline
pub struct TimeoutModel {
    inner: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl TimeoutModel {
    pub fn new(inner: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl LanguageModel for TimeoutModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        tokio::time::timeout(self.timeout, self.inner.generate(prompt))
            .await
            .map_err(|_| {
                AgentLoopError::timeout(format!(
                    "{} did not answer within {:?}",
                    self.inner.model_name(),
                    self.timeout
                ))
            })?
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Build the model handle described by `config`
///
/// A Gemini provider without an API key falls back to `UnavailableModel`
/// so the service still runs (every judgment uses its fallback text).
pub fn build_model(config: &ModelConfig) -> Arc<dyn LanguageModel> {
    let base: Arc<dyn LanguageModel> = match config.provider {
        ModelProvider::Gemini => match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Arc::new(GeminiModel::new(
                config.model_name.clone(),
                key,
                config.base_url.clone(),
            )),
            _ => {
                warn!(
                    "{} not set; running in demo mode without model access",
                    config.api_key_env
                );
                Arc::new(UnavailableModel::new(format!("{} not set", config.api_key_env)))
            }
        },
        ModelProvider::Static => Arc::new(StaticModel::new(config.static_reply.clone())),
        ModelProvider::Unavailable => {
            Arc::new(UnavailableModel::new("model disabled by configuration"))
        }
    };

    match config.timeout_secs {
        Some(secs) => Arc::new(TimeoutModel::new(base, Duration::from_secs(secs))),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_model_replies() {
        let model = StaticModel::new("Complexity: low");
        assert_eq!(model.generate("anything").await.unwrap(), "Complexity: low");
    }

    #[tokio::test]
    async fn test_unavailable_model_fails() {
        let model = UnavailableModel::new("no key");
        let err = model.generate("anything").await.unwrap_err();
        assert!(matches!(err, AgentLoopError::Model(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_model_expires() {
        let slow: Arc<dyn LanguageModel> =
            Arc::new(StaticModel::new("late").with_latency(Duration::from_secs(60)));
        let model = TimeoutModel::new(slow, Duration::from_secs(5));

        let err = model.generate("anything").await.unwrap_err();
        assert!(matches!(err, AgentLoopError::Timeout(_)));
    }

    #[test]
    fn test_gemini_endpoint() {
        let base_url = Some("http://localhost:9999/".to_string());
        let model = GeminiModel::new("gemini-pro", "k", base_url);
        assert_eq!(
            model.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn test_gemini_key_sent_as_header() {
        let model = GeminiModel::new("gemini-pro", "SECRET_KEY_123", None);
        let body = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![GeneratePart { text: "hello" }],
            }],
        };

        let request = model.request(&body).build().unwrap();

        assert!(request.url().query().is_none());
        assert!(!request.url().as_str().contains("SECRET_KEY_123"));
        assert_eq!(request.headers()[GEMINI_API_KEY_HEADER], "SECRET_KEY_123");
    }

    #[tokio::test]
    async fn test_gemini_error_does_not_leak_key() {
        let model = GeminiModel::new(
            "gemini-pro",
            "SECRET_KEY_123",
            Some("http://127.0.0.1:1".to_string()),
        );

        let err = model.generate("anything").await.unwrap_err();

        assert!(matches!(err, AgentLoopError::Model(_)));
        assert!(!err.to_string().contains("SECRET_KEY_123"));
    }

    #[test]
    fn test_build_static_model() {
        let config = ModelConfig {
            provider: ModelProvider::Static,
            static_reply: "hi".to_string(),
            ..ModelConfig::default()
        };
        assert_eq!(build_model(&config).model_name(), "static");
    }

    #[test]
    fn test_build_gemini_without_key_is_unavailable() {
        let config = ModelConfig {
            api_key_env: "AGENTLOOP_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ModelConfig::default()
        };
        assert_eq!(build_model(&config).model_name(), "unavailable");
    }
}
