//! Failures from the chat completions service, classified for the retry loop.

use std::time::Duration;
use thiserror::Error;

/// What OpenRouter told us about a failed call, kept for log lines.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Response status, when the call got that far.
    pub http_status: Option<u16>,
    /// `error.code` from the body, stringified when numeric.
    pub provider_code: Option<String>,
    /// `x-request-id` header.
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors that can occur when calling the generation service.
///
/// The calibration sweep treats every variant the same way (skip the cell);
/// the distinction only matters to the gateway's own retry loop.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 429. `retry_after` comes from the header or a fallback.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        context: Option<ErrorContext>,
    },

    /// 4xx other than 429; resending the same request cannot help.
    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Moderation block on the prompt.
    #[error("refused: {message}")]
    Refused {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Upstream failure, including an error object inside a 200 body.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        retryable: bool,
        context: Option<ErrorContext>,
    },

    #[error("timeout after {0:?}")]
    Timeout(Duration, Option<ErrorContext>),

    /// Transport failure before a usable response.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn rate_limited(retry_after: Duration, context: ErrorContext) -> Self {
        Self::RateLimited {
            retry_after,
            context: Some(context),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            context: None,
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self::Refused {
            message: message.into(),
            context: None,
        }
    }

    /// `provider` names the upstream in the message, e.g. `"openrouter"`.
    pub fn provider(provider: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: None,
        }
    }

    pub fn provider_with_context(
        provider: &'static str,
        message: impl Into<String>,
        retryable: bool,
        context: ErrorContext,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
            context: Some(context),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True when the gateway should back off and resend.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Timeout(_, _) => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::InvalidRequest { .. } => false,
            Self::Refused { .. } => false,
            Self::Config(_) => false,
        }
    }

    /// Stable tag used in skip events, traces and usage records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Refused { .. } => "refused",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(_, _) => "timeout",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::RateLimited { context, .. } => context.as_ref(),
            Self::InvalidRequest { context, .. } => context.as_ref(),
            Self::Refused { context, .. } => context.as_ref(),
            Self::Provider { context, .. } => context.as_ref(),
            Self::Timeout(_, context) => context.as_ref(),
            Self::Http(_) => None,
            Self::Config(_) => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_split() {
        assert!(ProviderError::rate_limited(Duration::from_secs(1), ErrorContext::new())
            .is_retryable());
        assert!(ProviderError::provider("openrouter", "5xx", true).is_retryable());
        assert!(!ProviderError::provider("openrouter", "bad json", false).is_retryable());
        assert!(!ProviderError::refused("no").is_retryable());
        assert!(!ProviderError::config("missing key").is_retryable());
    }

    #[test]
    fn test_request_id_from_context() {
        let err = ProviderError::provider_with_context(
            "openrouter",
            "boom",
            true,
            ErrorContext::new().with_status(502).with_request_id("req-9"),
        );
        assert_eq!(err.request_id(), Some("req-9"));
        assert_eq!(err.code(), "provider_error");
    }
}
