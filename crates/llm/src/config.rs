use std::sync::Arc;

use marginalia_common::{MarginaliaError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anthropic::AnthropicClient;
use crate::client::LlmClient;
use crate::layers::{RequestDefaults, SemaphoredClient};
use crate::openai::OpenAiClient;
use crate::retry::{RetryConfig, RetryingClient};

/// The `[llm]` table of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" (any OpenAI-compatible endpoint) or "anthropic"
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Used only when a request sets no temperature of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_max_tokens() -> Option<u32> {
    Some(4000)
}

fn default_max_concurrent() -> usize {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_url: None,
            temperature: None,
            max_tokens: default_max_tokens(),
            max_concurrent_requests: default_max_concurrent(),
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Environment variable consulted when no key is configured.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "openai" => Some("OPENAI_API_KEY"),
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            _ => None,
        }
    }

    /// A non-empty configured key, else the provider's environment
    /// variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(self.api_key_env()?).ok())
    }
}

/// Provider client wrapped as: retries → limiter → request defaults →
/// provider.
pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let provider: Arc<dyn LlmClient> = match config.provider.as_str() {
        "openai" => Arc::new(OpenAiClient::new(
            config.api_url.clone(),
            config.model.clone(),
            config.resolve_api_key(),
        )),
        "anthropic" => {
            let key = config.resolve_api_key().ok_or_else(|| {
                MarginaliaError::Config(
                    "provider 'anthropic' needs api_key or ANTHROPIC_API_KEY".to_string(),
                )
            })?;
            Arc::new(AnthropicClient::new(
                config.api_url.clone(),
                config.model.clone(),
                key,
            ))
        }
        other => {
            return Err(MarginaliaError::Config(format!(
                "Unknown LLM provider '{other}' (expected openai or anthropic)"
            )))
        }
    };

    debug!(
        provider = %config.provider,
        model = %config.model,
        max_concurrent = config.max_concurrent_requests,
        "Built completion client"
    );

    Ok(layered(provider, config))
}

/// The limiter sits inside the retry loop, so a request waiting out a
/// backoff holds no permit.
fn layered(provider: Arc<dyn LlmClient>, config: &LlmConfig) -> Arc<dyn LlmClient> {
    let defaults = Arc::new(RequestDefaults {
        inner: provider,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    });
    let limited = Arc::new(SemaphoredClient::new(
        defaults,
        config.max_concurrent_requests,
    ));
    Arc::new(RetryingClient::new(limited, config.retry.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LlmRequest, LlmResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    #[test]
    fn local_server_table() {
        let config: LlmConfig = toml::from_str(
            r#"
            provider = "openai"
            model = "qwen2.5-14b-instruct"
            api_url = "http://localhost:8000"
            max_concurrent_requests = 6

            [retry]
            max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "qwen2.5-14b-instruct");
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.max_concurrent_requests, 6);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 500);
    }

    #[test]
    fn empty_table_uses_defaults() {
        let config: LlmConfig = toml::from_str("").unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, Some(4000));
        assert_eq!(config.max_concurrent_requests, 2);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn configured_key_wins_and_empty_key_is_ignored() {
        let config = LlmConfig {
            api_key: Some("sk-from-config".into()),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("sk-from-config"));

        let unknown = LlmConfig {
            provider: "local".into(),
            api_key: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(unknown.api_key_env(), None);
        assert!(unknown.resolve_api_key().is_none());
    }

    #[test]
    fn builds_each_provider() {
        let openai = build_llm_client(&LlmConfig {
            model: "qwen2.5-14b-instruct".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(openai.model_name(), "qwen2.5-14b-instruct");

        let anthropic = build_llm_client(&LlmConfig {
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key: Some("sk-ant-test".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(anthropic.model_name(), "claude-sonnet-4-20250514");
    }

    /// Fails the first request whose user turn is "slow" with a 503.
    #[derive(Default)]
    struct Overloaded {
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl LlmClient for Overloaded {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            if request.user == "slow" && !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(MarginaliaError::Generation(
                    "openai: HTTP 503: overloaded".into(),
                ));
            }
            Ok(LlmResponse {
                content: request.user,
                model: "overloaded".into(),
                usage: None,
                stop_reason: None,
            })
        }

        fn model_name(&self) -> &str {
            "overloaded"
        }
    }

    #[tokio::test]
    async fn backoff_does_not_hold_a_permit() {
        let config = LlmConfig {
            max_concurrent_requests: 1,
            retry: RetryConfig {
                max_retries: 1,
                initial_delay_ms: 400,
                max_delay_ms: 400,
                backoff_multiplier: 1.0,
            },
            ..Default::default()
        };
        let client = layered(Arc::new(Overloaded::default()), &config);

        let slow = {
            let client = client.clone();
            tokio::spawn(async move { client.complete(LlmRequest::instruction("s", "slow")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        let fast = client
            .complete(LlmRequest::instruction("s", "fast"))
            .await
            .unwrap();
        assert_eq!(fast.content, "fast");
        assert!(started.elapsed() < Duration::from_millis(300));

        assert_eq!(slow.await.unwrap().unwrap().content, "slow");
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        let result = build_llm_client(&LlmConfig {
            provider: "gemini".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(MarginaliaError::Config(_))));
    }
}
