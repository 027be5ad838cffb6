//! Stage B: model-assisted fallback extraction (§4.1).
//!
//! Triggered when Stage A produced fewer than `max_exceptions_for_ai_extraction`
//! validation errors — the message looked signal-ish but incomplete. Wraps an external
//! structured-output extractor behind a retrying client.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use super::manual::SignalBase;

/// Whether a transient-extractor failure should be retried (§4.1: timeout,
/// connection-reset, rate-limit, server-error) or fails fast (auth, bad-request).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorFailureKind {
    Transient,
    NonRetryable,
}

#[derive(Debug, thiserror::Error)]
#[error("extractor call failed: {message}")]
pub struct ExtractorCallError {
    pub message: String,
    pub kind: ExtractorFailureKind,
}

/// Abstraction over the external structured-output extractor. Implemented against
/// whichever provider is configured; mocked in tests via `mockall`.
#[async_trait]
pub trait ExtractorClient: Send + Sync {
    async fn extract_structured(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<SignalBase, ExtractorCallError>;
}

/// Retry policy mirrored from `ExtractionConfig` (kept decoupled from `config::Config`
/// so this module has no dependency on the crate-wide config type).
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff_base_ms: u64,
    pub attempt_cap_secs: u64,
}

const SYSTEM_PROMPT: &str = "Extract a trading signal (symbol, side, entries, take-profits, \
stop-loss) from the following chat message. Respond only with the structured schema fields.";

/// Runs Stage B: retries transient failures with exponential backoff, fails fast on
/// non-retryable errors, and gives up (returning `None`) once retries are exhausted.
pub async fn extract_with_fallback(
    client: &dyn ExtractorClient,
    policy: &RetryPolicy,
    text: &str,
) -> Option<SignalBase> {
    let mut attempt: u32 = 0;
    loop {
        let call = client.extract_structured(SYSTEM_PROMPT, text);
        let cap = Duration::from_secs(policy.attempt_cap_secs);
        let outcome = tokio::time::timeout(cap, call).await;

        let result = match outcome {
            Ok(r) => r,
            Err(_) => {
                warn!(attempt, "extractor call timed out at attempt cap");
                Err(ExtractorCallError {
                    message: "attempt cap exceeded".to_string(),
                    kind: ExtractorFailureKind::Transient,
                })
            }
        };

        match result {
            Ok(record) => return Some(record),
            Err(err) if err.kind == ExtractorFailureKind::NonRetryable => {
                warn!(error = %err.message, "extractor returned a non-retryable error");
                return None;
            }
            Err(err) => {
                if attempt >= policy.retries {
                    warn!(error = %err.message, attempt, "extractor retries exhausted");
                    return None;
                }
                let backoff = backoff_delay(policy.backoff_base_ms, attempt);
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// The production `ExtractorClient`: a structured-output call against whichever
/// OpenAI-compatible chat-completions endpoint is configured (§6 "Configuration file
/// layering", `[extraction]` section). The provider and its prompt/schema contract are
/// out of scope (§1 "LLM invocation ... treated as a black-box"); this is just the HTTP
/// transport and retry-classification glue around it.
pub struct HttpExtractorClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpExtractorClient {
    pub fn new(endpoint: String, model: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            model,
            api_key,
        }
    }
}

#[derive(serde::Serialize)]
struct ExtractorRequest<'a> {
    model: &'a str,
    system_prompt: &'a str,
    user_text: &'a str,
}

#[async_trait]
impl ExtractorClient for HttpExtractorClient {
    async fn extract_structured(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<SignalBase, ExtractorCallError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ExtractorRequest {
                model: &self.model,
                system_prompt,
                user_text,
            })
            .send()
            .await
            .map_err(|e| ExtractorCallError {
                message: e.to_string(),
                kind: classify_reqwest_error(&e),
            })?;

        let status = response.status();
        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractorCallError {
                message: format!("{status}: {body}"),
                kind: ExtractorFailureKind::NonRetryable,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractorCallError {
                message: format!("{status}: {body}"),
                kind: ExtractorFailureKind::Transient,
            });
        }

        response.json::<SignalBase>().await.map_err(|e| ExtractorCallError {
            message: format!("malformed extractor response: {e}"),
            kind: ExtractorFailureKind::NonRetryable,
        })
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> ExtractorFailureKind {
    if e.is_timeout() || e.is_connect() {
        ExtractorFailureKind::Transient
    } else {
        ExtractorFailureKind::NonRetryable
    }
}

fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    let jitter_ms = rand::thread_rng().gen_range(0..=50);
    Duration::from_millis(base_ms.saturating_mul(factor) + jitter_ms)
}
