//! JSON-mode completions.
//!
//! The pipeline only ever needs "system + user instruction in, JSON object
//! out". A success response that does not decode into the requested shape is
//! reported as a generation error, the same as a transport failure.

use marginalia_common::{MarginaliaError, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::{LlmClient, LlmRequest};

/// Issue one JSON-mode request and decode the reply as `T`.
pub async fn generate_json<T: DeserializeOwned>(
    client: &dyn LlmClient,
    system: &str,
    user: &str,
    temperature: f32,
) -> Result<T> {
    let request = LlmRequest::instruction(system, user)
        .with_temperature(temperature)
        .json();

    let response = client.complete(request).await?;

    debug!(
        model = %response.model,
        response_len = response.content.len(),
        "Received JSON completion"
    );

    parse_json(&response.content)
}

/// Decode a completion body, tolerating a surrounding markdown code fence.
pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T> {
    let body = strip_code_fence(content);
    serde_json::from_str(body).map_err(|e| {
        MarginaliaError::Generation(format!("Completion was not valid JSON for the expected shape: {e}"))
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LlmResponse;
    use async_trait::async_trait;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        seeds: Vec<String>,
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl LlmClient for Fixed {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            assert!(request.json_mode);
            Ok(LlmResponse {
                content: self.0.to_string(),
                model: "fixed".to_string(),
                usage: None,
                stop_reason: None,
            })
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn parses_plain_json() {
        let payload: Payload = parse_json(r#"{"seeds": ["a", "b"]}"#).unwrap();
        assert_eq!(payload.seeds, vec!["a", "b"]);
    }

    #[test]
    fn parses_fenced_json() {
        let payload: Payload = parse_json("```json\n{\"seeds\": [\"a\"]}\n```").unwrap();
        assert_eq!(payload.seeds, vec!["a"]);
    }

    #[test]
    fn non_json_is_generation_error() {
        let err = parse_json::<Payload>("Sure! Here are some seeds.").unwrap_err();
        assert!(matches!(err, MarginaliaError::Generation(_)));
    }

    #[tokio::test]
    async fn wrong_shape_is_generation_error() {
        let client = Fixed(r#"{"threads": []}"#);
        let err = generate_json::<Payload>(&client, "sys", "user", 0.7)
            .await
            .unwrap_err();
        assert!(matches!(err, MarginaliaError::Generation(_)));
    }

    #[tokio::test]
    async fn decodes_successful_response() {
        let client = Fixed(r#"{"seeds": ["x"]}"#);
        let payload: Payload = generate_json(&client, "sys", "user", 0.7).await.unwrap();
        assert_eq!(payload.seeds, vec!["x"]);
    }
}
