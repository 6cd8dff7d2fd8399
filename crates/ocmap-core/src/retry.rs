use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Source of every deliberate pause (retry spacing, UI settle time, the
/// provider throttling delay). Injected so tests can record pauses instead
/// of waiting them out.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// RetryBudget
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    pub max_attempts: u32,
    #[serde(with = "secs")]
    pub delay: Duration,
}

impl RetryBudget {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Exhausted
// ---------------------------------------------------------------------------

/// Every attempt failed; carries the cause of the last one.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct Exhausted<E: fmt::Display> {
    pub attempts: u32,
    pub last: E,
}

// ---------------------------------------------------------------------------
// RecoveryOutcome
// ---------------------------------------------------------------------------

/// Result shape of a recovery step. Recovery may be infallible (`()`) or
/// fallible (`Result`); a failure is logged and the next attempt runs anyway.
pub trait RecoveryOutcome {
    fn failure(self) -> Option<String>;
}

impl RecoveryOutcome for () {
    fn failure(self) -> Option<String> {
        None
    }
}

impl<T, E: fmt::Display> RecoveryOutcome for Result<T, E> {
    fn failure(self) -> Option<String> {
        self.err().map(|e| e.to_string())
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry with an optional recovery step between attempts.
///
/// Calls the action at most `budget.max_attempts` times. After a failed
/// attempt that is not the last, sleeps `budget.delay` and then runs the
/// recovery step. Nothing happens after the final attempt.
#[derive(Clone)]
pub struct RetryPolicy {
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicy {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    pub async fn execute<T, E, A, Fut>(
        &self,
        budget: &RetryBudget,
        action: A,
    ) -> Result<T, Exhausted<E>>
    where
        E: fmt::Display,
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(budget, action, None::<fn() -> std::future::Ready<()>>)
            .await
    }

    pub async fn execute_with_recovery<T, E, A, Fut, R, RFut>(
        &self,
        budget: &RetryBudget,
        action: A,
        recovery: R,
    ) -> Result<T, Exhausted<E>>
    where
        E: fmt::Display,
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnMut() -> RFut,
        RFut: Future,
        RFut::Output: RecoveryOutcome,
    {
        self.run(budget, action, Some(recovery)).await
    }

    async fn run<T, E, A, Fut, R, RFut>(
        &self,
        budget: &RetryBudget,
        mut action: A,
        mut recovery: Option<R>,
    ) -> Result<T, Exhausted<E>>
    where
        E: fmt::Display,
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnMut() -> RFut,
        RFut: Future,
        RFut::Output: RecoveryOutcome,
    {
        let max = budget.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match action().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last: e,
                    })
                }
                Err(e) => {
                    tracing::debug!(attempt, max, error = %e, "attempt failed, retrying");
                }
            }

            if !budget.delay.is_zero() {
                self.sleeper.sleep(budget.delay).await;
            }
            if let Some(recover) = recovery.as_mut() {
                if let Some(reason) = recover().await.failure() {
                    tracing::debug!(attempt, error = %reason, "recovery step failed");
                }
            }
            attempt += 1;
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// Records every requested pause and returns immediately.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSleeper {
    pub slept: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub(crate) fn durations(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
