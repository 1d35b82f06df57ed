//! LLM transport contract
//!
//! The network transports themselves live outside this crate. What lives here
//! is the seam: a [`LlmTransport`] trait returning a tagged
//! [`LlmResponse`], and an [`LlmClient`] that applies the configured
//! provider/model, a deadline, error logging and the interaction log.

mod interaction_log;
mod replay;

pub use interaction_log::{InteractionLog, InteractionRecord};
pub use replay::StaticTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

/// System role shared by every forensic prompt
pub const ANALYST_SYSTEM_PROMPT: &str = "You are a senior control systems cybersecurity analyst specialising in industrial automation and PLC threat detection. You have deep expertise in Siemens PCS7/S7 environments, STL/SCL/LAD programming, and cyber-physical attack techniques targeting operational technology (OT) environments.";

/// What a transport hands back: text, or an error it chose to report as data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LlmResponse {
    Text { value: String },
    Error { message: String },
}

impl LlmResponse {
    pub fn text(value: impl Into<String>) -> Self {
        LlmResponse::Text {
            value: value.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        LlmResponse::Error {
            message: message.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            LlmResponse::Text { value } => Some(value),
            LlmResponse::Error { .. } => None,
        }
    }
}

/// One generation request
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub system: Option<&'a str>,
    pub prompt: &'a str,
    pub provider: &'a str,
    pub model: &'a str,
}

#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Single attempt. Retries, if any, are the transport's business.
    async fn generate(&self, request: &GenerateRequest<'_>) -> LlmResponse;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmFailure {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
}

/// Transport bound to a provider, model and deadline
pub struct LlmClient<'a> {
    transport: &'a dyn LlmTransport,
    provider: String,
    model: String,
    timeout: Duration,
    log: Option<InteractionLog>,
}

impl<'a> LlmClient<'a> {
    pub fn new(transport: &'a dyn LlmTransport, config: &LlmConfig) -> Self {
        Self {
            transport,
            provider: config.provider.clone(),
            model: config.model.clone(),
            timeout: config.timeout(),
            log: config.interaction_log_path().map(InteractionLog::new),
        }
    }

    pub fn with_provider(mut self, provider: Option<String>) -> Self {
        if let Some(provider) = provider {
            self.provider = provider;
        }
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model {
            self.model = model;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one generation under the deadline. Failures are logged here with
    /// their full detail before being handed back.
    pub async fn generate(&self, system: Option<&str>, prompt: &str) -> Result<String, LlmFailure> {
        let request = GenerateRequest {
            system,
            prompt,
            provider: &self.provider,
            model: &self.model,
        };

        let outcome = match tokio::time::timeout(self.timeout, self.transport.generate(&request)).await
        {
            Ok(LlmResponse::Text { value }) => Ok(value),
            Ok(LlmResponse::Error { message }) => Err(LlmFailure::Provider(message)),
            Err(_) => Err(LlmFailure::Timeout(self.timeout)),
        };

        match &outcome {
            Ok(text) => tracing::debug!(
                provider = %self.provider,
                model = %self.model,
                chars = text.len(),
                "llm generation succeeded"
            ),
            Err(err) => tracing::warn!(
                provider = %self.provider,
                model = %self.model,
                error = %err,
                "llm generation failed"
            ),
        }

        if let Some(log) = &self.log {
            let record = InteractionRecord::new(prompt, &outcome, &self.provider, &self.model);
            if let Err(err) = log.append(&record) {
                tracing::warn!(path = %log.path().display(), error = %err, "failed to write llm interaction log");
            }
        }

        outcome
    }
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowTransport;

    #[async_trait]
    impl LlmTransport for SlowTransport {
        async fn generate(&self, _request: &GenerateRequest<'_>) -> LlmResponse {
            tokio::time::sleep(Duration::from_secs(5)).await;
            LlmResponse::text("too late")
        }
    }

    struct CountingTransport(AtomicUsize);

    #[async_trait]
    impl LlmTransport for CountingTransport {
        async fn generate(&self, request: &GenerateRequest<'_>) -> LlmResponse {
            self.0.fetch_add(1, Ordering::SeqCst);
            LlmResponse::error(format!("{} rejected {}", request.provider, request.model))
        }
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 10), "ab");
        assert_eq!(truncate_chars("äöü€", 2), "äö");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_response_is_tagged() {
        let json = serde_json::to_value(LlmResponse::error("quota")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "error", "message": "quota"}));
        assert_eq!(LlmResponse::text("hi").as_text(), Some("hi"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let transport = SlowTransport;
        let client = LlmClient::new(&transport, &LlmConfig::default())
            .with_timeout(Duration::from_millis(20));
        let outcome = client.generate(None, "prompt").await;
        assert_eq!(outcome, Err(LlmFailure::Timeout(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn test_provider_error_is_single_attempt() {
        let transport = CountingTransport(AtomicUsize::new(0));
        let client = LlmClient::new(&transport, &LlmConfig::default())
            .with_provider(Some("ollama".to_string()))
            .with_model(Some("llama3".to_string()));
        let outcome = client.generate(None, "prompt").await;
        assert_eq!(
            outcome,
            Err(LlmFailure::Provider("ollama rejected llama3".to_string()))
        );
        assert_eq!(transport.0.load(Ordering::SeqCst), 1);
    }
}
