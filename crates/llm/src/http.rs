//! Shared HTTP round trip for provider clients.
//!
//! Provider failures are reported as `MarginaliaError::Generation` with a
//! fixed message shape that [`crate::retry`] reads back:
//!
//! ```text
//! <provider>: HTTP <status> [retry after <secs>s]: <body>
//! <provider>: transport error: <detail>
//! ```

use marginalia_common::{MarginaliaError, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Longest slice of an error body kept in the message.
const MAX_ERROR_BODY_CHARS: usize = 500;

pub(crate) async fn post_json<B, R>(provider: &str, request: RequestBuilder, body: &B) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await.unwrap_or_default();
        return Err(MarginaliaError::Generation(status_error(
            provider,
            status.as_u16(),
            retry_after,
            &text,
        )));
    }

    debug!(provider, status = status.as_u16(), "Provider responded");
    response.json::<R>().await.map_err(|e| {
        MarginaliaError::Generation(format!("{provider}: unreadable response body: {e}"))
    })
}

fn transport_error(provider: &str, error: &reqwest::Error) -> MarginaliaError {
    let detail = if error.is_timeout() {
        "timed out".to_string()
    } else {
        error.to_string()
    };
    MarginaliaError::Generation(format!("{provider}: transport error: {detail}"))
}

pub(crate) fn status_error(
    provider: &str,
    status: u16,
    retry_after_secs: Option<u64>,
    body: &str,
) -> String {
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    match retry_after_secs {
        Some(secs) => format!("{provider}: HTTP {status} retry after {secs}s: {body}"),
        None => format!("{provider}: HTTP {status}: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_message_shape() {
        assert_eq!(
            status_error("openai", 503, None, "overloaded"),
            "openai: HTTP 503: overloaded"
        );
        assert_eq!(
            status_error("anthropic", 429, Some(7), "slow down"),
            "anthropic: HTTP 429 retry after 7s: slow down"
        );
    }

    #[test]
    fn long_bodies_are_cut() {
        let body = "x".repeat(2000);
        let message = status_error("openai", 500, None, &body);
        assert!(message.len() < 600);
    }
}
