//! LLM integration for ticket triage.
//!
//! Supports:
//! - **Groq**: OpenAI-compatible endpoint at `api.groq.com/openai/v1`
//! - **OpenAI**: `api.openai.com/v1`
//!
//! Both go through `OpenAiCompatProvider`, which implements `LlmProvider`.

pub mod openai_compat;
pub mod provider;
pub mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use provider::*;
pub use retry::RetryConfig;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Groq,
    OpenAi,
}

impl LlmBackend {
    /// Provider label used in logs and errors.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
        }
    }

    /// Environment variable holding the API credential.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown backend '{other}' (expected groq or openai)")),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiCompatProvider::new(
        config.backend.label(),
        &config.base_url,
        config.api_key.clone(),
        &config.model,
        config.request_timeout,
    )?;
    tracing::info!(
        "Using {} (model: {}, timeout: {:?})",
        config.backend.label(),
        config.model,
        config.request_timeout
    );
    Ok(Arc::new(provider))
}
