use crate::backends::InferenceBackend;
use crate::config::ModelConfig;
use crate::llm::BackendClient;
use crate::structured::{
    corrective_prompt, parse_json_response, FallbackError, SchemaValidator, StructuredReply,
};
use ensemble_core::{EnsembleError, EnsembleResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// Retry and backoff settings, deserialized from the `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total transport attempts per `invoke`, first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Multiplier applied to `2^(retry - 1)`, in milliseconds.
    #[serde(default = "default_multiplier_ms")]
    pub backoff_multiplier_ms: u64,
    /// Lower clamp for a single delay, in milliseconds.
    #[serde(default = "default_min_ms")]
    pub backoff_min_ms: u64,
    /// Upper clamp for a single delay, in milliseconds.
    #[serde(default = "default_max_ms")]
    pub backoff_max_ms: u64,
    /// Total parse/validate attempts per `invoke_structured`.
    #[serde(default = "default_structured_attempts")]
    pub structured_attempts: u32,
}

fn default_max_attempts() -> u32 {
    6
}
fn default_multiplier_ms() -> u64 {
    1_000
}
fn default_min_ms() -> u64 {
    4_000
}
fn default_max_ms() -> u64 {
    10_000
}
fn default_structured_attempts() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_multiplier_ms: default_multiplier_ms(),
            backoff_min_ms: default_min_ms(),
            backoff_max_ms: default_max_ms(),
            structured_attempts: default_structured_attempts(),
        }
    }
}

/// Delay after failed attempt number `retry` (1-based):
/// `clamp(multiplier × 2^(retry - 1), min, max)`. Non-decreasing in `retry`.
pub fn compute_backoff(policy: &RetryPolicy, retry: u32) -> u64 {
    let delay = policy
        .backoff_multiplier_ms
        .saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)));
    let floor = policy.backoff_min_ms.min(policy.backoff_max_ms);
    delay.clamp(floor, policy.backoff_max_ms)
}

/// Lifecycle of a single exchange with the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Nothing sent yet.
    Idle,
    /// Request in flight.
    Sent,
    /// Backend replied with text.
    Success,
    /// Failed in a way worth another attempt.
    RetryableFailure,
    /// Failed for good; no further attempts.
    FatalFailure,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallState::Idle => "idle",
            CallState::Sent => "sent",
            CallState::Success => "success",
            CallState::RetryableFailure => "retryable_failure",
            CallState::FatalFailure => "fatal_failure",
        })
    }
}

/// Wraps a generative backend with per-call deadlines, exponential-backoff
/// retries and schema-validated structured replies.
///
/// Transport failures (network errors, non-2xx statuses, timeouts) are
/// retried up to `max_attempts`. Structured calls additionally re-prompt the
/// backend with corrective feedback up to `structured_attempts` times and
/// return a [`FallbackError`] instead of failing when nothing validates.
pub struct ResilientClient {
    backend: Arc<dyn InferenceBackend>,
    policy: RetryPolicy,
    timeout: Duration,
    /// Injectable sleep function for testing (allows skipping real delays).
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl ResilientClient {
    /// Wrap `backend` with `policy` and a 60 second per-call deadline.
    pub fn new(backend: Arc<dyn InferenceBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            timeout: Duration::from_secs(60),
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    /// Build the configured provider backend and wrap it.
    pub fn from_config(model: ModelConfig, policy: RetryPolicy) -> Self {
        let timeout = model.request_timeout();
        Self::new(Arc::new(BackendClient::new(model)), policy).with_timeout(timeout)
    }

    /// Override the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry settings in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Name of the wrapped backend, for logs.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn send_once(&self, system_prompt: &str, prompt: &str) -> EnsembleResult<String> {
        match tokio::time::timeout(self.timeout, self.backend.generate(system_prompt, prompt)).await
        {
            Ok(result) => result,
            Err(_) => Err(EnsembleError::Transport(format!(
                "request timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// Send one prompt and return the raw text reply.
    ///
    /// Retries transport failures with backoff; any other error is returned
    /// at once. Once the attempt budget is spent the last transport error is
    /// surfaced.
    pub async fn invoke(&self, system_prompt: &str, prompt: &str) -> EnsembleResult<String> {
        let attempts = self.policy.max_attempts.max(1);
        let backend = self.backend.name();
        let mut last_err: Option<EnsembleError> = None;

        for attempt in 1..=attempts {
            debug!(backend, attempt, state = %CallState::Sent, "sending request");
            match self.send_once(system_prompt, prompt).await {
                Ok(text) => {
                    debug!(backend, attempt, state = %CallState::Success, "request succeeded");
                    return Ok(text);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(
                        backend,
                        attempt,
                        state = %CallState::FatalFailure,
                        error = %e,
                        "Non-retryable error"
                    );
                    return Err(e);
                }
                Err(e) => {
                    if attempt < attempts {
                        let delay = compute_backoff(&self.policy, attempt);
                        info!(
                            backend,
                            attempt,
                            delay_ms = delay,
                            state = %CallState::RetryableFailure,
                            error = %e,
                            "Retryable error, backing off"
                        );
                        self.do_sleep(delay).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        let last = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        error!(backend, attempts, state = %CallState::FatalFailure, "Retry budget exhausted");
        Err(EnsembleError::Transport(format!(
            "gave up after {attempts} attempts: {last}"
        )))
    }

    /// Send a prompt whose reply must be JSON matching `schema`.
    ///
    /// Parse and schema failures are fed back to the backend in a corrective
    /// prompt. After `structured_attempts` failures the fallback sentinel is
    /// returned as `Ok(StructuredReply::Invalid(..))`. Transport failures
    /// and an uncompilable schema are returned as `Err`.
    pub async fn invoke_structured(
        &self,
        system_prompt: &str,
        prompt: &str,
        schema: &Value,
    ) -> EnsembleResult<StructuredReply> {
        let validator = SchemaValidator::compile(schema)?;
        let attempts = self.policy.structured_attempts.max(1);
        let mut current_prompt = prompt.to_string();
        let mut last_response: Option<String> = None;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let text = self.invoke(system_prompt, &current_prompt).await?;
            let checked =
                parse_json_response(&text).and_then(|v| validator.validate(&v).map(|()| v));
            match checked {
                Ok(value) => return Ok(StructuredReply::Valid(value)),
                Err(reason) => {
                    warn!(attempt, error = %reason, "Structured reply rejected");
                    current_prompt =
                        corrective_prompt(prompt, &text, validator.schema(), &reason);
                    last_response = Some(text);
                    last_error = reason;
                }
            }
        }

        Ok(StructuredReply::Invalid(FallbackError::validation(
            last_error,
            attempts,
            last_response,
        )))
    }

    /// Like [`invoke_structured`](Self::invoke_structured) but never returns
    /// an error: any failure becomes a fallback error object.
    pub async fn invoke_with_fallback(
        &self,
        system_prompt: &str,
        prompt: &str,
        schema: &Value,
    ) -> StructuredReply {
        match self.invoke_structured(system_prompt, prompt, schema).await {
            Ok(reply) => reply,
            Err(e) => {
                let attempts = if e.is_retryable() {
                    self.policy.max_attempts.max(1)
                } else {
                    0
                };
                error!(error = %e, "Structured call failed, returning fallback object");
                StructuredReply::Invalid(FallbackError::from_error(&e, attempts))
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
