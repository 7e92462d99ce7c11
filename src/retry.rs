//! Retry engine: bounded exponential backoff around a single async operation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{Result, TaxRateError};

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay after the first failed attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound for any single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Decides whether a failed attempt may be retried. Receives the error and
/// the 1-based index of the attempt that produced it.
pub type RetryPredicate = Arc<dyn Fn(&TaxRateError, u32) -> bool + Send + Sync>;

/// Retries network failures and server errors (status >= 500).
///
/// Authentication, rate limit, validation and configuration errors are never
/// retried, nor is anything without a status code.
pub fn default_should_retry(error: &TaxRateError, _attempt: u32) -> bool {
    match error {
        TaxRateError::Network { .. } => true,
        TaxRateError::Api { status_code, .. } => *status_code >= 500,
        TaxRateError::Authentication { .. }
        | TaxRateError::RateLimit { .. }
        | TaxRateError::Validation { .. }
        | TaxRateError::Configuration { .. }
        | TaxRateError::RetryExhausted { .. }
        | TaxRateError::Other { .. } => false,
    }
}

/// Backoff policy for one execution. Never mutated while an execution runs.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub should_retry: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            should_retry: Arc::new(default_should_retry),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Creates a policy with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of attempts, including the first.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay after the first failed attempt.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the upper bound for any single delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the factor the delay grows by after each failed attempt.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Replaces the predicate deciding whether a failure may be retried.
    pub fn with_should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&TaxRateError, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Rejects policies the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(TaxRateError::configuration(
                "max_attempts must be at least 1",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(TaxRateError::configuration(format!(
                "max_delay ({:?}) must not be less than initial_delay ({:?})",
                self.max_delay, self.initial_delay
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(TaxRateError::configuration(format!(
                "backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Delay to wait after the given 1-based attempt failed:
    /// `min(initial_delay * multiplier^(attempt - 1), max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.initial_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);

        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.round() as u64).min(self.max_delay)
    }
}

/// Partial policy: unset fields fall back to [`RetryPolicy::default`].
#[derive(Clone, Default)]
pub struct RetryOverrides {
    pub max_attempts: Option<u32>,
    pub initial_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    pub backoff_multiplier: Option<f64>,
    pub should_retry: Option<RetryPredicate>,
}

impl fmt::Debug for RetryOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOverrides")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl RetryOverrides {
    /// Layers `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: RetryOverrides) -> RetryOverrides {
        RetryOverrides {
            max_attempts: other.max_attempts.or(self.max_attempts),
            initial_delay: other.initial_delay.or(self.initial_delay),
            max_delay: other.max_delay.or(self.max_delay),
            backoff_multiplier: other.backoff_multiplier.or(self.backoff_multiplier),
            should_retry: other.should_retry.or(self.should_retry),
        }
    }

    /// Applies the overrides to the default policy and validates the result.
    pub fn into_policy(self) -> Result<RetryPolicy> {
        let defaults = RetryPolicy::default();
        let policy = RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: self.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            backoff_multiplier: self
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            should_retry: self.should_retry.unwrap_or(defaults.should_retry),
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Runs `operation` until it succeeds, the policy refuses a retry, or the
/// attempt budget is spent.
///
/// The error that stops the loop is returned unchanged. Attempts never
/// overlap: the next one starts only after the previous one settled and the
/// backoff delay elapsed.
pub async fn execute_with_retry<F, Fut, T>(mut operation: F, policy: &RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    policy.validate()?;

    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        debug!("Attempt {}/{}...", attempt, policy.max_attempts);

        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let is_last_attempt = attempt == policy.max_attempts;
                let retryable = (policy.should_retry)(&error, attempt);

                if is_last_attempt || !retryable {
                    debug!(
                        "Attempt {}/{} failed, giving up: {}",
                        attempt, policy.max_attempts, error
                    );
                    return Err(error);
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "Attempt {}/{} failed ({}), retrying in {}ms...",
                    attempt,
                    policy.max_attempts,
                    error,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                last_error = Some(error);
            }
        }
    }

    // Unreachable with a validated policy: the last attempt always returns.
    Err(TaxRateError::RetryExhausted {
        attempts: policy.max_attempts,
        last_error: Box::new(
            last_error.unwrap_or_else(|| TaxRateError::other("no attempt was made")),
        ),
    })
}

/// [`execute_with_retry`] with a partial policy merged over the defaults.
pub async fn with_retry<F, Fut, T>(operation: F, overrides: RetryOverrides) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let policy = overrides.into_policy()?;
    execute_with_retry(operation, &policy).await
}
