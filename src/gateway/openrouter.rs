//! OpenRouter adapter for chat completions.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::pricing::chat_cost;
use super::types::*;

// =============================================================================
// TRAIT
// =============================================================================

/// A single-shot chat completion provider. Retries live in the gateway.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

// =============================================================================
// CONFIG
// =============================================================================

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum allowed response body (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed input characters (~125k tokens).
const MAX_INPUT_CHARS: usize = 500_000;

/// Fallback wait when a 429 carries no usable Retry-After header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Connection settings for [`OpenRouterAdapter`].
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Sent as `X-Title` for OpenRouter's app attribution.
    pub app_title: Option<String>,
}

impl OpenRouterConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            app_title: Some("synthetic-students".to_string()),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// =============================================================================
// OPENROUTER ADAPTER
// =============================================================================

#[derive(Debug, Clone)]
pub struct OpenRouterAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl OpenRouterAdapter {
    pub fn new(config: OpenRouterConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::config("OpenRouter API key is empty"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| ProviderError::config("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        if let Some(title) = config.app_title.as_deref() {
            if let Ok(v) = HeaderValue::from_str(title) {
                headers.insert("X-Title", v);
            }
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    /// Seconds form of Retry-After only; HTTP-date values fall back to the default.
    fn retry_after(headers: &HeaderMap) -> Duration {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER)
    }

    fn looks_like_refusal(message: &str) -> bool {
        let l = message.to_lowercase();
        l.contains("content policy") || l.contains("moderation") || l.contains("refused")
    }

    fn classify_http_failure(
        status: u16,
        body: &str,
        retry_after: Duration,
        ctx: ErrorContext,
    ) -> ProviderError {
        let api_error = serde_json::from_str::<ChatApiResponse>(body)
            .ok()
            .and_then(|p| p.error);

        let (message, ctx) = match api_error {
            Some(err) => {
                let ctx = match err.code {
                    Some(serde_json::Value::String(code)) => ctx.with_code(code),
                    Some(code) => ctx.with_code(code.to_string()),
                    None => ctx,
                };
                (err.message.unwrap_or_default(), ctx)
            }
            None => (format!("HTTP {status}"), ctx),
        };

        match status {
            429 => ProviderError::rate_limited(retry_after, ctx),
            400 | 404 | 422 => ProviderError::InvalidRequest {
                message,
                context: Some(ctx),
            },
            403 if Self::looks_like_refusal(&message) => ProviderError::Refused {
                message,
                context: Some(ctx),
            },
            401 | 402 | 403 => ProviderError::provider_with_context("openrouter", message, false, ctx),
            s => ProviderError::provider_with_context("openrouter", message, s >= 500 || s == 408, ctx),
        }
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    #[serde(default)]
    cost_details: Option<CostDetails>,
}

#[derive(Deserialize)]
struct CostDetails {
    upstream_inference_cost: Option<f64>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    // OpenRouter sends numeric codes; other gateways send strings.
    code: Option<serde_json::Value>,
}

// =============================================================================
// CHAT PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ChatProvider for OpenRouterAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let total_chars: usize = req.messages.iter().map(|m| m.content.len()).sum();
        if total_chars > MAX_INPUT_CHARS {
            return Err(ProviderError::invalid_request(format!(
                "Input too large: {total_chars} chars (max {MAX_INPUT_CHARS})"
            )));
        }

        let start = Instant::now();

        let api_req = ChatApiRequest {
            model: req.model.model_id(),
            messages: &req.messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let mut response = self
            .client
            .post(self.chat_url())
            .json(&api_req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(start.elapsed(), None)
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = response.status();
        let request_id = Self::request_id(response.headers());
        let retry_after = Self::retry_after(response.headers());

        // Stream the body so the size limit holds even without Content-Length.
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(ProviderError::provider(
                    "openrouter",
                    format!("Response too large: {new_len} bytes"),
                    false,
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes);

        let mut ctx = ErrorContext::new().with_status(status.as_u16());
        if let Some(id) = &request_id {
            ctx = ctx.with_request_id(id);
        }

        if !status.is_success() {
            return Err(Self::classify_http_failure(
                status.as_u16(),
                &body,
                retry_after,
                ctx,
            ));
        }

        let parsed: ChatApiResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::provider_with_context(
                "openrouter",
                format!("Invalid JSON: {e}"),
                false,
                ctx.clone(),
            )
        })?;

        // OpenRouter can report upstream failures inside a 200.
        if let Some(error) = parsed.error {
            let message = error.message.unwrap_or_default();
            if Self::looks_like_refusal(&message) {
                return Err(ProviderError::refused(message));
            }
            return Err(ProviderError::provider_with_context(
                "openrouter",
                message,
                true,
                ctx,
            ));
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::provider("openrouter", "No choices in response", false))?;

        let content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();

        let usage = parsed.usage.ok_or_else(|| {
            ProviderError::provider("openrouter", "Missing usage in response", false)
        })?;
        let input_tokens = usage.prompt_tokens.unwrap_or(0);
        let output_tokens = usage.completion_tokens.unwrap_or(0);

        let upstream_cost_nanodollars = usage
            .cost_details
            .and_then(|d| d.upstream_inference_cost)
            .map(|usd| ((usd * 1_000_000_000.0).round() as i64).max(0));

        Ok(ChatResponse {
            content,
            input_tokens,
            output_tokens,
            cost_nanodollars: chat_cost(req.model.model_id(), input_tokens, output_tokens),
            upstream_cost_nanodollars,
            latency: start.elapsed(),
            finish_reason: FinishReason::from(choice.finish_reason),
        })
    }
}
