//! Anthropic Messages API client.

use async_trait::async_trait;
use marginalia_common::Result;
use serde::{Deserialize, Serialize};

use crate::client::{LlmClient, LlmRequest, LlmResponse, TokenUsage};
use crate::http::post_json;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "anthropic";
/// The Messages API requires an explicit output limit.
const DEFAULT_MAX_TOKENS: u32 = 4096;
/// No native JSON mode, so JSON requests restate the constraint.
const JSON_ONLY: &str = "Respond with a single JSON object and nothing else.";

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    system: String,
    messages: [UserTurn<'a>; 1],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct UserTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesReply {
    model: String,
    #[serde(default)]
    content: Vec<Block>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Block {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

pub struct AnthropicClient {
    endpoint: String,
    model: String,
    api_key: String,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(base_url: Option<String>, model: String, api_key: String) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            endpoint: format!("{}/v1/messages", base.trim_end_matches('/')),
            model,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn body<'a>(&'a self, request: &'a LlmRequest) -> MessagesBody<'a> {
        let system = if request.json_mode {
            format!("{}\n\n{JSON_ONLY}", request.system)
        } else {
            request.system.clone()
        };
        MessagesBody {
            model: &self.model,
            system,
            messages: [UserTurn {
                role: "user",
                content: &request.user,
            }],
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let http_request = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION);

        let reply: MessagesReply = post_json(PROVIDER, http_request, &self.body(&request)).await?;

        let content = reply
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<String>();

        Ok(LlmResponse {
            content,
            model: reply.model,
            usage: reply.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
            stop_reason: reply.stop_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
