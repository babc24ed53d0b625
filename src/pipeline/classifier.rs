//! Classification client. Email body in, classifier text out.
//!
//! The returned text is expected to be a JSON ticket but is never parsed,
//! validated or repaired here.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::llm::retry::{RetryConfig, retry_with_backoff};

/// Turns an email body into classifier output.
///
/// The batch driver only depends on this trait.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, body: &str) -> Result<String, LlmError>;
}

/// Classifier backed by an `LlmProvider` and a fixed instruction document.
pub struct TicketClassifier {
    llm: Arc<dyn LlmProvider>,
    instruction: String,
    retry: RetryConfig,
}

impl TicketClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, instruction: impl Into<String>) -> Self {
        Self {
            llm,
            instruction: instruction.into(),
            retry: RetryConfig::NONE,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn build_request(&self, body: &str) -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system(self.instruction.as_str()),
            ChatMessage::user(body),
        ])
    }
}

#[async_trait]
impl Classifier for TicketClassifier {
    async fn classify(&self, body: &str) -> Result<String, LlmError> {
        debug!(
            model = self.llm.model_name(),
            body_len = body.len(),
            "Sending email body to classifier"
        );

        let response =
            retry_with_backoff(self.retry, || self.llm.complete(self.build_request(body))).await?;

        info!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Classifier responded"
        );
        Ok(response.content.trim().to_string())
    }
}
