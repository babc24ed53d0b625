//! OpenAI-compatible chat completions over `reqwest`.
//!
//! Groq and OpenAI both accept `POST {base}/chat/completions` with bearer auth,
//! so one provider covers both backends.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};

/// Provider for any endpoint speaking the OpenAI chat completions wire format.
pub struct OpenAiCompatProvider {
    provider: String,
    base_url: String,
    api_key: SecretString,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Build a provider with a bounded per-request timeout.
    pub fn new(
        provider: &str,
        base_url: &str,
        api_key: SecretString,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: provider.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            provider: provider.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_failed(&self, reason: impl Into<String>) -> LlmError {
        LlmError::RequestFailed {
            provider: self.provider.clone(),
            reason: reason.into(),
        }
    }

    /// Map a non-2xx response onto the error taxonomy.
    fn status_error(&self, status: StatusCode, retry_after: Option<Duration>, body: &str) -> LlmError {
        let detail = serde_json::from_str::<ApiErrorBody>(body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed {
                provider: self.provider.clone(),
            },
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                provider: self.provider.clone(),
                retry_after,
            },
            StatusCode::NOT_FOUND => LlmError::ModelNotAvailable {
                provider: self.provider.clone(),
                model: self.model.clone(),
            },
            _ => self.request_failed(format!("HTTP {status}: {detail}")),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: &request.messages,
        };

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_failed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(
                provider = %self.provider,
                status = %status,
                "Chat completion request rejected"
            );
            return Err(self.status_error(status, retry_after, &text));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| self.request_failed(format!("Failed to read response body: {e}")))?;
        let parsed: ChatCompletionReply =
            serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
                provider: self.provider.clone(),
                reason: format!("JSON parse error: {e}"),
            })?;

        let usage = parsed.usage.unwrap_or_default();
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: self.provider.clone(),
                reason: "response contained no choices".into(),
            })?;
        let content = choice
            .message
            .content
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: self.provider.clone(),
                reason: "first choice has no message content".into(),
            })?;

        Ok(CompletionResponse {
            content,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            finish_reason: FinishReason::from_wire(choice.finish_reason.as_deref()),
            response_id: parsed.id,
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatCompletionReply {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve exactly one HTTP exchange with a canned response.
    /// Resolves to the raw request body the client sent.
    async fn serve_once(
        status_line: &'static str,
        extra_headers: &'static str,
        body: &'static str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let body_start = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break buf.len();
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let headers = String::from_utf8_lossy(&buf[..body_start]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < body_start + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let request_body = String::from_utf8_lossy(&buf[body_start..]).to_string();

            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\n{extra_headers}content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(request_body);
        });

        (format!("http://{addr}/openai/v1"), rx)
    }

    fn provider(base_url: &str) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(
            "groq",
            base_url,
            SecretString::from("test-key"),
            "llama3-8b-8192",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system("instructions"),
            ChatMessage::user("Please reset my account."),
        ])
    }

    #[tokio::test]
    async fn complete_returns_first_choice_and_sends_model() {
        let (base, body_rx) = serve_once(
            "HTTP/1.1 200 OK",
            "",
            r#"{"id":"chatcmpl-1","choices":[{"message":{"role":"assistant","content":"  {\"ticket_id\":\"TICKET-1\"}\n"},"finish_reason":"stop"},{"message":{"content":"second"}}],"usage":{"prompt_tokens":12,"completion_tokens":7}}"#,
        )
        .await;

        let response = provider(&base).complete(request()).await.unwrap();
        assert_eq!(response.content, "  {\"ticket_id\":\"TICKET-1\"}\n");
        assert_eq!(response.input_tokens, 12);
        assert_eq!(response.output_tokens, 7);
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.response_id.as_deref(), Some("chatcmpl-1"));

        let sent: serde_json::Value = serde_json::from_str(&body_rx.await.unwrap()).unwrap();
        assert_eq!(sent["model"], "llama3-8b-8192");
        assert_eq!(sent["messages"][0]["role"], "system");
        assert_eq!(sent["messages"][0]["content"], "instructions");
        assert_eq!(sent["messages"][1]["role"], "user");
        assert_eq!(sent["messages"][1]["content"], "Please reset my account.");
        assert_eq!(sent.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_failed() {
        let (base, _rx) = serve_once(
            "HTTP/1.1 401 Unauthorized",
            "",
            r#"{"error":{"message":"Invalid API Key"}}"#,
        )
        .await;

        let err = provider(&base).complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::AuthFailed { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let (base, _rx) = serve_once(
            "HTTP/1.1 429 Too Many Requests",
            "retry-after: 7\r\n",
            r#"{"error":{"message":"slow down"}}"#,
        )
        .await;

        let err = provider(&base).complete(request()).await.unwrap_err();
        match err {
            LlmError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("Expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_transient_request_failure() {
        let (base, _rx) = serve_once(
            "HTTP/1.1 503 Service Unavailable",
            "",
            r#"{"error":{"message":"overloaded"}}"#,
        )
        .await;

        let err = provider(&base).complete(request()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_response() {
        let (base, _rx) = serve_once("HTTP/1.1 200 OK", "", r#"{"choices":[]}"#).await;

        let err = provider(&base).complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn connection_refused_is_request_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = provider(&format!("http://{addr}"))
            .complete(request())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let p = provider("https://api.groq.com/openai/v1/");
        assert_eq!(p.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
    }
}
