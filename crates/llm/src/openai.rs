//! Chat-completions client for OpenAI and compatible servers (vLLM,
//! Ollama, LM Studio).

use async_trait::async_trait;
use marginalia_common::{MarginaliaError, Result};
use serde::{Deserialize, Serialize};

use crate::client::{LlmClient, LlmRequest, LlmResponse, TokenUsage};
use crate::http::post_json;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const PROVIDER: &str = "openai";

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [Turn<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonObjectFormat>,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct JsonObjectFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatReply {
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

pub struct OpenAiClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiClient {
    /// `base_url` is the server root, without `/v1`.
    pub fn new(base_url: Option<String>, model: String, api_key: Option<String>) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            endpoint: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            model,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn body<'a>(&'a self, request: &'a LlmRequest) -> ChatBody<'a> {
        ChatBody {
            model: &self.model,
            messages: [
                Turn {
                    role: "system",
                    content: &request.system,
                },
                Turn {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(JsonObjectFormat {
                kind: "json_object",
            }),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut http_request = self.http.post(&self.endpoint);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let reply: ChatReply = post_json(PROVIDER, http_request, &self.body(&request)).await?;

        let choice = reply.choices.into_iter().next().ok_or_else(|| {
            MarginaliaError::Generation(format!("{PROVIDER}: response had no choices"))
        })?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: reply.model,
            usage: reply.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            stop_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
