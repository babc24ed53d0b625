//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig, RetryConfig};
use crate::pipeline::dedup::FingerprintScheme;

/// Default model identifier sent to the classifier.
pub const DEFAULT_MODEL: &str = "llama3-8b-8192";

/// Default folder scanned for email documents.
pub const DEFAULT_EMAIL_DIR: &str = "./emails";

/// Default email document extension (without the dot).
pub const DEFAULT_EMAIL_EXTENSION: &str = "eml";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 1000;

/// Default instruction document sent as the system message.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a banking support assistant. You receive the body of an email or other document related to banking operations, together with the rules below.

Produce:
1. Request types. Determine every request type present in the input. Give each one a priority (High, Medium or Low) and a confidence score as a percentage.
2. Extracted fields. Extract all relevant field values (customer ID, account details, loan type, dates, amounts, references). Keep field names consistent across documents.
3. Duplicate detection. If the content looks like a duplicate of an earlier request (matching request ID, same account details), flag it as a duplicate and give the reason.

Return a service ticket as a single JSON object with these fields:
- ticket_id: "TICKET-" followed by the email file name without its extension.
- request_types: list of {"type", "priority", "confidence"}.
- fields: object mapping field names to extracted values.
- duplicates: list of {"duplicate": true, "reason"} entries, empty if none.

Format:
{
  "ticket_id": "TICKET-<file_name>",
  "request_types": [
    { "type": "<request_type>", "priority": "<High|Medium|Low>", "confidence": <percentage> }
  ],
  "fields": { "<field_name>": "<field_value>" },
  "duplicates": [
    { "duplicate": true, "reason": "<reason>" }
  ]
}

Output only the JSON object. No text, notes or explanations before or after it. Do not repeat the email body."#;

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub fingerprint_scheme: FingerprintScheme,
    pub email_dir: PathBuf,
    pub email_extension: String,
    pub system_prompt: String,
}

impl AppConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Fails fast when the backend credential is missing, before any file is
    /// touched.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get("TICKET_BACKEND") {
            Some(raw) => raw
                .parse::<LlmBackend>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "TICKET_BACKEND".into(),
                    message,
                })?,
            None => LlmBackend::Groq,
        };

        let key_var = backend.api_key_var();
        let api_key = get(key_var).ok_or_else(|| ConfigError::MissingEnvVar(key_var.into()))?;

        let model = get("TICKET_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = get("TICKET_API_BASE_URL")
            .unwrap_or_else(|| backend.default_base_url().to_string());

        let timeout_secs = parse_number(
            "TICKET_REQUEST_TIMEOUT_SECS",
            get("TICKET_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TICKET_REQUEST_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        let max_retries = parse_number("TICKET_MAX_RETRIES", get("TICKET_MAX_RETRIES"), 0u32)?;
        let initial_delay_ms = parse_number(
            "TICKET_RETRY_INITIAL_DELAY_MS",
            get("TICKET_RETRY_INITIAL_DELAY_MS"),
            DEFAULT_RETRY_INITIAL_DELAY_MS,
        )?;

        let fingerprint_scheme = match get("TICKET_FINGERPRINT_SCHEME") {
            Some(raw) => raw
                .parse::<FingerprintScheme>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "TICKET_FINGERPRINT_SCHEME".into(),
                    message,
                })?,
            None => FingerprintScheme::default(),
        };

        let email_dir = get("TICKET_EMAIL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EMAIL_DIR));

        let email_extension = get("TICKET_EMAIL_EXTENSION")
            .map(|ext| ext.trim().trim_start_matches('.').to_string())
            .unwrap_or_else(|| DEFAULT_EMAIL_EXTENSION.to_string());

        let system_prompt = match get("TICKET_SYSTEM_PROMPT_FILE") {
            Some(path) => std::fs::read_to_string(&path)?,
            None => DEFAULT_SYSTEM_PROMPT.to_string(),
        };

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
                base_url,
                request_timeout: Duration::from_secs(timeout_secs),
            },
            retry: RetryConfig::new(max_retries, Duration::from_millis(initial_delay_ms)),
            fingerprint_scheme,
            email_dir,
            email_extension,
            system_prompt,
        })
    }
}

fn parse_number<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{value}': {e}"),
            }),
        None => Ok(default),
    }
}
