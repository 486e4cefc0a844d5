//! Provider gateway for OpenRouter chat completions.
//!
//! [`ChatGateway`] is the seam the calibration sweep depends on. The
//! production implementation, [`ProviderGateway`], wraps a single-shot
//! [`ChatProvider`] with exponential-backoff retries and reports every
//! attempt to a [`UsageSink`].

pub mod error;
pub mod openrouter;
pub mod pricing;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

pub use error::{ErrorContext, ProviderError};
pub use openrouter::{ChatProvider, OpenRouterAdapter, OpenRouterConfig};
pub use pricing::*;
pub use types::*;
pub use usage::{
    CallStatus, MemoryUsageSink, NoopUsageSink, ProviderCallRecord, TracingUsageSink, UsageSink,
};

#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Upper bound on any single wait, including provider Retry-After hints.
    pub max_retry_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

pub struct ProviderGateway<P: ChatProvider, U: UsageSink> {
    provider: P,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl<P: ChatProvider, U: UsageSink> ChatGateway for ProviderGateway<P, U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }
}

impl<U: UsageSink> ProviderGateway<OpenRouterAdapter, U> {
    pub fn openrouter(
        config: OpenRouterConfig,
        usage_sink: Arc<U>,
        gateway: GatewayConfig,
    ) -> Result<Self, ProviderError> {
        Ok(Self::with_config(
            OpenRouterAdapter::new(config)?,
            usage_sink,
            gateway,
        ))
    }
}

impl<P: ChatProvider, U: UsageSink> ProviderGateway<P, U> {
    pub fn with_config(provider: P, usage_sink: Arc<U>, config: GatewayConfig) -> Self {
        Self {
            provider,
            usage_sink,
            config,
        }
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.provider.chat(&req).await {
                Ok(resp) => {
                    self.record_usage(&req, &resp, None).await;
                    return Ok(resp);
                }
                Err(err) => {
                    self.record_usage(&req, &ChatResponse::failed(), Some(err.code()))
                        .await;

                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        return Err(err);
                    }

                    let delay = match &err {
                        ProviderError::RateLimited { retry_after, .. } => *retry_after,
                        _ => backoff_delay(self.config.retry_base_delay, attempt),
                    }
                    .min(self.config.max_retry_delay);

                    tracing::debug!(
                        model = req.model.model_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying provider call"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn record_usage(
        &self,
        req: &ChatRequest,
        resp: &ChatResponse,
        error_code: Option<&'static str>,
    ) {
        let record = ProviderCallRecord::new(
            req.model.provider(),
            req.model.model_id(),
            req.attribution.caller,
        )
        .tokens(resp.input_tokens, resp.output_tokens)
        .cost(resp.cost_nanodollars)
        .upstream_cost(resp.upstream_cost_nanodollars)
        .run(req.attribution.run_id.clone())
        .latency(resp.latency.as_millis() as u64);

        let record = match error_code {
            Some(code) => record.error(code),
            None => record,
        };

        self.usage_sink.record(record).await;
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.pow(attempt.min(5));
    base * multiplier
}

impl ChatResponse {
    fn failed() -> Self {
        Self {
            content: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cost_nanodollars: 0,
            upstream_cost_nanodollars: None,
            latency: Duration::from_millis(0),
            finish_reason: FinishReason::Unknown("error".to_string()),
        }
    }
}
