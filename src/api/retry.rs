//! Bounded exponential-backoff retry around a single provider call
//!
//! Attempts are strictly sequential with a sleep between them. Only errors
//! accepted by the retry predicate (transient provider failures by default)
//! are retried; everything else returns immediately. Parse and validation
//! failures happen downstream of the call and never reach this layer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::types::Generation;
use super::TextGenerator;
use crate::errors::ProviderError;

/// Immutable retry configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 2.0,
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(15000),
        }
    }
}

/// Retry settings as they appear in the `[retry]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_min_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    15000
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries.max(1),
            backoff_factor: settings.backoff_factor,
            min_delay: Duration::from_millis(settings.min_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }

    /// Delay after the given failed attempt (1-based):
    /// `min(max_delay, min_delay * factor^(attempt - 1))`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.min_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        if capped.is_finite() && capped > 0.0 {
            Duration::from_millis(capped as u64)
        } else if capped.is_finite() {
            Duration::ZERO
        } else {
            self.max_delay
        }
    }

    /// Backoff for `attempt`, stretched to honor a provider `Retry-After`
    /// but never beyond `max_delay`.
    pub fn delay_after(&self, attempt: u32, err: &ProviderError) -> Duration {
        let backoff = self.delay_for(attempt);
        match err.retry_after() {
            Some(wait) => backoff.max(wait.min(self.max_delay)),
            None => backoff,
        }
    }
}

/// Emitted before each backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    /// The attempt that just failed (1-based)
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: String,
}

/// Side-channel callback for retry events, injected by the caller.
pub type RetryObserver = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

type RetryPredicate = Arc<dyn Fn(&ProviderError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryingInvoker {
    policy: RetryPolicy,
    should_retry: RetryPredicate,
    observer: Option<RetryObserver>,
}

impl std::fmt::Debug for RetryingInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingInvoker")
            .field("policy", &self.policy)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl Default for RetryingInvoker {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryingInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            should_retry: Arc::new(ProviderError::is_transient),
            observer: None,
        }
    }

    /// Replace the transient-error predicate.
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&ProviderError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    pub async fn invoke<F, Fut, T>(&self, op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.invoke_with_cancel(&CancellationToken::new(), op).await
    }

    /// As [`invoke`](Self::invoke), stopping with [`ProviderError::Cancelled`]
    /// as soon as `cancel` fires, including mid-call and mid-sleep.
    pub async fn invoke_with_cancel<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            debug!("Provider call attempt {}/{}", attempt, max_attempts);

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                r = op() => r,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !(self.should_retry)(&err) {
                debug!("Provider error is not retryable: {}", err);
                return Err(err);
            }
            if attempt >= max_attempts {
                warn!("Provider call failed after {} attempts: {}", attempt, err);
                return Err(ProviderError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.delay_after(attempt, &err);
            warn!(
                "Retry attempt {}/{} after {}ms delay: {}",
                attempt + 1,
                max_attempts,
                delay.as_millis(),
                err
            );
            if let Some(ref observer) = self.observer {
                observer(&RetryEvent {
                    attempt,
                    max_attempts,
                    delay,
                    error: err.to_string(),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Retry a single `generate(prompt)` call.
    pub async fn generate(
        &self,
        generator: &dyn TextGenerator,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Generation, ProviderError> {
        self.invoke_with_cancel(cancel, || generator.generate(prompt))
            .await
    }
}
