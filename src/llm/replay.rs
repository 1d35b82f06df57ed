//! Transport that answers with a fixed response
//!
//! Used to replay a captured model answer through the pipeline (the CLI's
//! `--response` flag) and as the test double everywhere else.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;

use super::{GenerateRequest, LlmResponse, LlmTransport};

pub struct StaticTransport {
    response: LlmResponse,
    prompts: Mutex<Vec<String>>,
}

impl StaticTransport {
    pub fn new(response: LlmResponse) -> Self {
        Self {
            response,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(LlmResponse::text(value))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(LlmResponse::error(message))
    }

    /// Replay a captured response from disk
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let value = std::fs::read_to_string(path)?;
        Ok(Self::text(value))
    }

    /// Prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmTransport for StaticTransport {
    async fn generate(&self, request: &GenerateRequest<'_>) -> LlmResponse {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.to_string());
        }
        self.response.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_prompts_and_replays_response() {
        let transport = StaticTransport::text("answer");
        let request = GenerateRequest {
            system: None,
            prompt: "question",
            provider: "openai",
            model: "gpt-4o",
        };
        assert_eq!(transport.generate(&request).await, LlmResponse::text("answer"));
        assert_eq!(transport.prompts(), vec!["question".to_string()]);
    }

    #[test]
    fn test_from_file_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StaticTransport::from_file(&dir.path().join("nope.txt")).is_err());
    }
}
