use async_trait::async_trait;
use marginalia_common::Result;
use serde::{Deserialize, Serialize};

/// One instruction exchange: a system prompt and a single user turn.
///
/// Every pipeline step (annotation, seed formation, discussion, comment) is
/// a fresh single-turn request, so there is no chat history to carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Ask the provider for a bare JSON object.
    #[serde(default)]
    pub json_mode: bool,
}

impl LlmRequest {
    pub fn instruction(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub stop_reason: Option<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_builder_sets_every_field() {
        let request = LlmRequest::instruction("You annotate.", "Section text")
            .with_temperature(0.8)
            .json();
        assert_eq!(request.system, "You annotate.");
        assert_eq!(request.user, "Section text");
        assert_eq!(request.temperature, Some(0.8));
        assert_eq!(request.max_tokens, None);
        assert!(request.json_mode);
    }

    #[test]
    fn unset_limits_are_not_serialized() {
        let json = serde_json::to_value(LlmRequest::instruction("s", "u")).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["json_mode"], false);
    }
}
