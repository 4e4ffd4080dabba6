//! Client wrappers that shape traffic without touching request content.

use std::sync::Arc;

use async_trait::async_trait;
use marginalia_common::{MarginaliaError, Result};
use tokio::sync::Semaphore;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

/// Caps in-flight requests across every task sharing the client.
///
/// Phase fan-out (one task per agent, one per seed) goes through one of
/// these, so the provider never sees more than `max_concurrent` requests.
pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    permits: Semaphore,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| MarginaliaError::Generation(format!("Request limiter closed: {e}")))?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Fills `max_tokens` and `temperature` from config when a request leaves
/// them unset.
pub(crate) struct RequestDefaults {
    pub(crate) inner: Arc<dyn LlmClient>,
    pub(crate) max_tokens: Option<u32>,
    pub(crate) temperature: Option<f32>,
}

#[async_trait]
impl LlmClient for RequestDefaults {
    async fn complete(&self, mut request: LlmRequest) -> Result<LlmResponse> {
        request.max_tokens = request.max_tokens.or(self.max_tokens);
        request.temperature = request.temperature.or(self.temperature);
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Probe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        last: Mutex<Option<LlmRequest>>,
    }

    #[async_trait]
    impl LlmClient for Probe {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            *self.last.lock() = Some(request);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(LlmResponse {
                content: "ok".into(),
                model: "probe".into(),
                usage: None,
                stop_reason: None,
            })
        }

        fn model_name(&self) -> &str {
            "probe"
        }
    }

    #[tokio::test]
    async fn in_flight_requests_are_capped() {
        let probe = Arc::new(Probe::default());
        let client = Arc::new(SemaphoredClient::new(probe.clone(), 2));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.complete(LlmRequest::default()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(client.model_name(), "probe");
    }

    #[tokio::test]
    async fn defaults_only_fill_gaps() {
        let probe = Arc::new(Probe::default());
        let client = RequestDefaults {
            inner: probe.clone(),
            max_tokens: Some(4000),
            temperature: Some(0.2),
        };

        client
            .complete(LlmRequest::instruction("s", "u").with_temperature(0.9))
            .await
            .unwrap();

        let seen = probe.last.lock().take().unwrap();
        assert_eq!(seen.max_tokens, Some(4000));
        assert_eq!(seen.temperature, Some(0.9));
    }
}
