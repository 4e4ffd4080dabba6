//! Retry policy for completion requests.
//!
//! Pipeline phases issue each request once and treat the final error as
//! that task's failure, so transient provider errors are absorbed here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marginalia_common::{MarginaliaError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff before retry number `attempt` (zero based).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        if delay.is_finite() {
            (delay as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        }
    }
}

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Retry { after_ms: Option<u64> },
    GiveUp,
}

/// Read back the provider message shape written by the HTTP layer.
fn classify(error: &MarginaliaError) -> Verdict {
    let MarginaliaError::Generation(message) = error else {
        return Verdict::GiveUp;
    };

    if message.contains(": transport error:") {
        return Verdict::Retry { after_ms: None };
    }

    let Some(status) = http_status(message) else {
        return Verdict::GiveUp;
    };
    if status == 408 || status == 429 || (500..600).contains(&status) {
        Verdict::Retry {
            after_ms: retry_after_secs(message).map(|s| s.saturating_mul(1000)),
        }
    } else {
        Verdict::GiveUp
    }
}

fn http_status(message: &str) -> Option<u16> {
    let rest = &message[message.find("HTTP ")? + 5..];
    rest.get(..3)?.parse().ok()
}

fn retry_after_secs(message: &str) -> Option<u64> {
    let rest = &message[message.find("retry after ")? + 12..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

pub struct RetryingClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut attempt = 0;
        loop {
            let error = match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let after_ms = match classify(&error) {
                Verdict::Retry { after_ms } if attempt < self.config.max_retries => after_ms,
                _ => return Err(error),
            };
            let delay_ms = after_ms
                .unwrap_or_else(|| self.config.backoff_ms(attempt))
                .min(self.config.max_delay_ms);

            warn!(
                model = %self.inner.model_name(),
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms,
                error = %error,
                "Retrying completion request"
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            attempt += 1;
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
