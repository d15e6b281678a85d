//! Retry policies wrapping a single remote call.
//!
//! Two flavours are used by the stage chain:
//! - [`RetryPolicy::Fixed`] degrades to `Ok(None)` when attempts run out.
//! - [`RetryPolicy::Exponential`] raises [`QuillError::ExhaustedRetries`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use quill_types::{QuillError, Result};
use rand::Rng;

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Suspends the calling task between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Real sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Constant delay; exhaustion yields `Ok(None)`.
    Fixed { max_attempts: usize, delay: Duration },
    /// `base * 2^attempt + jitter`, jitter drawn from `0..=min(jitter, base)`;
    /// exhaustion yields `ExhaustedRetries`.
    Exponential {
        max_attempts: usize,
        base: Duration,
        jitter: Duration,
    },
}

impl RetryPolicy {
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        RetryPolicy::Fixed {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn exponential(max_attempts: usize, base: Duration, jitter: Duration) -> Self {
        RetryPolicy::Exponential {
            max_attempts: max_attempts.max(1),
            base,
            jitter,
        }
    }

    /// Research lookups: 3 attempts, 5 s apart.
    pub fn research_default() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }

    /// Session calls: 5 attempts, 1 s base, up to 1 s jitter.
    pub fn session_default() -> Self {
        Self::exponential(5, Duration::from_secs(1), Duration::from_secs(1))
    }

    /// Media uploads: 2 attempts, 2 s apart.
    pub fn media_default() -> Self {
        Self::fixed(2, Duration::from_secs(2))
    }

    pub fn max_attempts(&self) -> usize {
        match self {
            RetryPolicy::Fixed { max_attempts, .. }
            | RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    pub fn is_lenient(&self) -> bool {
        matches!(self, RetryPolicy::Fixed { .. })
    }

    /// Delay after the failed attempt `attempt` (0-indexed), given a jitter
    /// sample in `[0, 1]`.
    pub fn delay_for_attempt(&self, attempt: usize, jitter_sample: f64) -> Duration {
        match self {
            RetryPolicy::Fixed { delay, .. } => *delay,
            RetryPolicy::Exponential { base, jitter, .. } => {
                let base_ms = base.as_millis() as u64;
                let jitter_ms = jitter.as_millis().min(base.as_millis()) as f64;
                let backoff = base_ms.saturating_mul(2u64.saturating_pow(attempt as u32));
                let extra = (jitter_ms * jitter_sample.clamp(0.0, 1.0)) as u64;
                Duration::from_millis(backoff.saturating_add(extra))
            }
        }
    }

    /// Run `call` under this policy.
    ///
    /// `Ok(None)` means the artifact is absent: a malformed reply under either
    /// policy, or any failure under the fixed policy.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        sleeper: &dyn Sleeper,
        call: F,
    ) -> Result<Option<T>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            let err = match call().await {
                Ok(value) => return Ok(Some(value)),
                Err(e) => e,
            };

            if err.is_malformed() {
                tracing::warn!(call = %label, error = %err, "Malformed response, treating as absent");
                return Ok(None);
            }

            let last_attempt = attempt + 1 >= max_attempts;
            if !err.is_retryable() || last_attempt {
                return self.give_up(label, attempt + 1, err);
            }

            let delay = err
                .retry_after()
                .unwrap_or_else(|| self.delay_for_attempt(attempt, self.sample_jitter()));
            tracing::warn!(
                call = %label,
                attempt = attempt + 1,
                max_attempts,
                delay_ms = %delay.as_millis(),
                error = %err,
                "Retryable error, retrying"
            );
            sleeper.sleep(delay).await;
            attempt += 1;
        }
    }

    fn sample_jitter(&self) -> f64 {
        match self {
            RetryPolicy::Fixed { .. } => 0.0,
            RetryPolicy::Exponential { .. } => rand::thread_rng().gen_range(0.0..=1.0),
        }
    }

    fn give_up<T>(&self, label: &str, attempts: usize, err: QuillError) -> Result<Option<T>> {
        match self {
            RetryPolicy::Fixed { .. } => {
                tracing::warn!(call = %label, attempts, error = %err, "Giving up, continuing without result");
                Ok(None)
            }
            RetryPolicy::Exponential { .. } if err.is_retryable() => {
                Err(QuillError::ExhaustedRetries {
                    call: label.to_string(),
                    attempts,
                    last_error: err.to_string(),
                })
            }
            RetryPolicy::Exponential { .. } => Err(err),
        }
    }
}
