//! Usage tracking via the UsageSink trait.
//!
//! Every attempt the gateway makes (retries included) is reported to a sink,
//! so spend can be audited independently of the response records the
//! calibration sweep persists.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Status of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Record of a single provider attempt.
#[derive(Debug, Clone)]
pub struct ProviderCallRecord {
    pub provider: &'static str,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Cost in nanodollars (1e-9 USD).
    pub cost_nanodollars: i64,
    /// Provider-reported upstream cost, when the provider sends one.
    pub upstream_cost_nanodollars: Option<i64>,
    pub run_id: Option<String>,
    pub latency_ms: u64,
    pub status: CallStatus,
    pub error_code: Option<&'static str>,
    pub caller: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl ProviderCallRecord {
    pub fn new(provider: &'static str, model: impl Into<String>, caller: &'static str) -> Self {
        Self {
            provider,
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost_nanodollars: 0,
            upstream_cost_nanodollars: None,
            run_id: None,
            latency_ms: 0,
            status: CallStatus::Success,
            error_code: None,
            caller,
            timestamp: Utc::now(),
        }
    }

    pub fn tokens(mut self, input: u32, output: u32) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    pub fn cost(mut self, nanodollars: i64) -> Self {
        self.cost_nanodollars = nanodollars;
        self
    }

    pub fn upstream_cost(mut self, nanodollars: Option<i64>) -> Self {
        self.upstream_cost_nanodollars = nanodollars;
        self
    }

    pub fn run(mut self, run_id: Option<String>) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn error(mut self, code: &'static str) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code);
        self
    }
}

/// Where usage records go.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Record a provider call. Fire-and-forget: failures should be logged,
    /// never propagated.
    async fn record(&self, record: ProviderCallRecord);
}

/// Discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ProviderCallRecord) {}
}

/// Emits each record as a structured `tracing` event at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        tracing::debug!(
            provider = record.provider,
            model = %record.model,
            run_id = record.run_id.as_deref().unwrap_or("-"),
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost_nanos = record.cost_nanodollars,
            latency_ms = record.latency_ms,
            status = record.status.as_str(),
            error_code = record.error_code.unwrap_or(""),
            caller = record.caller,
            "provider call"
        );
    }
}

/// Keeps every record in memory; lets callers total spend across retries.
#[derive(Debug, Default)]
pub struct MemoryUsageSink {
    records: Mutex<Vec<ProviderCallRecord>>,
}

impl MemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ProviderCallRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Total nanodollars across all recorded attempts.
    pub fn total_cost_nanodollars(&self) -> i64 {
        self.records
            .lock()
            .map(|r| r.iter().map(|c| c.cost_nanodollars).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl UsageSink for MemoryUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(_) => tracing::warn!("usage sink mutex poisoned; dropping record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sink_totals_cost() {
        let sink = MemoryUsageSink::new();
        sink.record(ProviderCallRecord::new("openrouter", "m", "test").cost(1_000))
            .await;
        sink.record(
            ProviderCallRecord::new("openrouter", "m", "test")
                .cost(0)
                .error("timeout"),
        )
        .await;
        sink.record(ProviderCallRecord::new("openrouter", "m", "test").cost(2_500))
            .await;

        assert_eq!(sink.total_cost_nanodollars(), 3_500);
        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].status, CallStatus::Error);
        assert_eq!(records[1].error_code, Some("timeout"));
    }
}
