//! Text-completion capability for the Marginalia pipeline.
//!
//! Provider clients (OpenAI-compatible, Anthropic) sit behind the
//! [`LlmClient`] trait. [`build_llm_client`] wraps the configured provider
//! with request defaults, retries and a cap on in-flight requests.

pub mod anthropic;
pub mod client;
pub mod config;
mod http;
pub mod json;
pub mod layers;
pub mod openai;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use client::{LlmClient, LlmRequest, LlmResponse, TokenUsage};
pub use config::{build_llm_client, LlmConfig};
pub use json::{generate_json, parse_json};
pub use layers::SemaphoredClient;
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingClient};
