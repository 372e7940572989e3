//! HTTP client for the relationship classifier
//!
//! Sends one pinned-sampling chat request per ambiguous pair. A 429 is
//! retried with exponential backoff while the server asks for a short wait.
//! A longer wait fails the call, and the predictor then falls back to its
//! rules rather than stalling a batch.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client as HttpClient, StatusCode};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::{Answer, ClassifyRequest, ClassifyResponse, Message};

/// Attempts per classification, the first one included
const MAX_ATTEMPTS: u32 = 3;

const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Used when a 429 carries no hint
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Longest server-requested wait worth sitting through
const MAX_RETRY_AFTER_SECS: u64 = 30;

/// Asks an OpenRouter model one question at a time
#[derive(Clone)]
pub struct LlmClient {
    http: HttpClient,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::LLMError("API key is empty".to_string()));
        }

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send the prompt and return the model's reply
    pub async fn ask(&self, messages: &[Message]) -> Result<Answer> {
        let request = ClassifyRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut attempt = 1;
        loop {
            match self.send(&request).await {
                Err(Error::RateLimited(wait_secs))
                    if attempt < MAX_ATTEMPTS && wait_secs <= MAX_RETRY_AFTER_SECS =>
                {
                    let delay = backoff(attempt, wait_secs);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "Classifier rate limited, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send(&self, request: &ClassifyRequest<'_>) -> Result<Answer> {
        debug!(model = %self.model, "Sending classification request");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://github.com/lorelink/lorelink")
            .header("X-Title", "Lorelink")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let header_hint = retry_after_header(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, header_hint, &body));
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Unreadable classifier response: {}", e)))?;

        parsed
            .into_answer()
            .ok_or_else(|| Error::LLMError("Model returned no answer".to_string()))
    }
}

fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> Error {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited(
            retry_after
                .or_else(|| retry_after_body(body))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        ),
        StatusCode::UNAUTHORIZED => Error::LLMError(
            "API key rejected. Set LORELINK_API_KEY or OPENROUTER_API_KEY".to_string(),
        ),
        StatusCode::PAYMENT_REQUIRED => {
            Error::LLMError("OpenRouter account is out of credits".to_string())
        }
        StatusCode::NOT_FOUND => Error::LLMError(format!("Unknown model or endpoint: {}", body)),
        _ => Error::LLMError(format!("Classifier request failed ({}): {}", status.as_u16(), body)),
    }
}

/// `Retry-After` in its delta-seconds form
fn retry_after_header(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

/// OpenRouter sometimes puts the hint in the error body instead
fn retry_after_body(body: &str) -> Option<u64> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("retry_after")
        .or_else(|| json.pointer("/error/retry_after"))
        .and_then(serde_json::Value::as_u64)
}

/// Doubling delay, never shorter than the server's hint, plus up to 10% jitter
fn backoff(attempt: u32, retry_after_secs: u64) -> Duration {
    let doubled = BACKOFF_BASE.saturating_mul(1 << attempt.saturating_sub(1).min(16));
    let delay = doubled.max(Duration::from_secs(retry_after_secs));
    let jitter_ms = (delay.as_millis() as u64 / 10).max(1);
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn config() -> LlmConfig {
        LlmConfig {
            model: "test/model".to_string(),
            base_url: "https://example.com/v1/".to_string(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_new_builds_endpoint_and_hides_key() {
        let client = LlmClient::new(config(), "secret-key").unwrap();
        assert_eq!(client.endpoint, "https://example.com/v1/chat/completions");
        assert_eq!(client.model(), "test/model");

        let debug = format!("{:?}", client);
        assert!(debug.contains("test/model"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_new_rejects_blank_key() {
        assert!(matches!(LlmClient::new(config(), "  "), Err(Error::LLMError(_))));
    }

    #[test]
    fn test_rate_limit_hint_sources() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after_header(&headers), Some(12));

        // HTTP-date form is not honoured
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(retry_after_header(&headers), None);

        assert_eq!(retry_after_body(r#"{"retry_after": 30}"#), Some(30));
        assert_eq!(retry_after_body(r#"{"error": {"retry_after": 8}}"#), Some(8));
        assert_eq!(retry_after_body("slow down"), None);
    }

    #[test]
    fn test_status_error() {
        let limited = status_error(StatusCode::TOO_MANY_REQUESTS, Some(3), r#"{"retry_after": 9}"#);
        assert!(matches!(limited, Error::RateLimited(3)));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, None, r#"{"retry_after": 9}"#),
            Error::RateLimited(9)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, None, ""),
            Error::RateLimited(DEFAULT_RETRY_AFTER_SECS)
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, ""),
            Error::LLMError(msg) if msg.contains("LORELINK_API_KEY")
        ));
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, None, "down"),
            Error::LLMError(msg) if msg.contains("503")
        ));
    }

    #[test]
    fn test_backoff() {
        let first = backoff(1, 0);
        assert!(first >= BACKOFF_BASE && first < BACKOFF_BASE + BACKOFF_BASE / 10);
        assert!(backoff(2, 0) >= BACKOFF_BASE * 2);
        assert!(backoff(1, 4) >= Duration::from_secs(4));
        assert!(backoff(u32::MAX, 0) >= BACKOFF_BASE);
    }
}
