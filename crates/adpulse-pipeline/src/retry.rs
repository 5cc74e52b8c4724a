//! Bounded retry with exponential back-off for pipeline stages.
//!
//! [`run_with_retry`] drives one stage invocation through
//! `Pending → Running → (Succeeded | Retrying → Running | Failed)`.
//! Only errors whose [`PipelineError::is_retryable`] is true are retried.
//! The delay before retry `n` (counting from 0) is exactly
//! `base_delay × multiplier^n`; there is no jitter.

use std::future::Future;
use std::time::Duration;

use adpulse_core::{ConfigError, Envelope, PipelineError, RetrySettings};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Budget for the whole invocation, back-off included.
    pub max_wall_clock: Option<Duration>,
}

impl RetryPolicy {
    /// # Errors
    ///
    /// Returns a configuration error when a delay or budget cannot be
    /// represented as a [`Duration`].
    pub fn from_settings(settings: &RetrySettings) -> Result<Self, PipelineError> {
        Ok(Self {
            max_retries: settings.max_retries,
            base_delay: seconds("retry.base_delay_secs", settings.base_delay_secs)?,
            multiplier: settings.backoff_multiplier,
            max_wall_clock: settings
                .max_wall_clock_secs
                .map(|secs| seconds("retry.max_wall_clock_secs", secs))
                .transpose()?,
        })
    }

    /// Sleep before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let secs = self.base_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

fn seconds(key: &str, secs: f64) -> Result<Duration, PipelineError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        PipelineError::from(ConfigError::OutOfRange {
            key: key.to_string(),
            value: secs.to_string(),
            expected: "a representable number of seconds >= 0".to_string(),
        })
    })
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_wall_clock: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    /// Waiting before retry `attempt` (1-based).
    Retrying {
        attempt: u32,
    },
    Succeeded,
    Failed,
}

/// Terminal result of one stage invocation.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Succeeded {
        value: T,
        attempts: u32,
        elapsed: Duration,
        transitions: Vec<StageState>,
    },
    Failed {
        /// The last error, unchanged, or a timeout if the budget ran out.
        error: PipelineError,
        attempts: u32,
        elapsed: Duration,
        transitions: Vec<StageState>,
    },
}

impl<T> StageOutcome<T> {
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }

    #[must_use]
    pub fn transitions(&self) -> &[StageState] {
        match self {
            Self::Succeeded { transitions, .. } | Self::Failed { transitions, .. } => transitions,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Wrap the outcome in a stage envelope.
    pub fn into_envelope(self, agent_name: &str) -> Envelope<T> {
        match self {
            Self::Succeeded {
                value,
                attempts,
                elapsed,
                ..
            } => Envelope::success(agent_name, millis(elapsed), attempts, value),
            Self::Failed {
                error,
                attempts,
                elapsed,
                ..
            } => Envelope::failure(agent_name, millis(elapsed), attempts, &error),
        }
    }

    /// Split into a payload-less envelope and the plain result.
    pub fn split(self, agent_name: &str) -> (Envelope<()>, Result<T, PipelineError>) {
        match self {
            Self::Succeeded {
                value,
                attempts,
                elapsed,
                ..
            } => {
                let mut envelope = Envelope::success(agent_name, millis(elapsed), attempts, ());
                envelope.payload = None;
                (envelope, Ok(value))
            }
            Self::Failed {
                error,
                attempts,
                elapsed,
                ..
            } => (
                Envelope::failure(agent_name, millis(elapsed), attempts, &error),
                Err(error),
            ),
        }
    }

    /// Drop the bookkeeping and keep only the stage result.
    ///
    /// # Errors
    ///
    /// Returns the stage's final error when it failed.
    pub fn into_result(self) -> Result<T, PipelineError> {
        match self {
            Self::Succeeded { value, .. } => Ok(value),
            Self::Failed { error, .. } => Err(error),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

struct Tracker<'a> {
    stage: &'a str,
    transitions: Vec<StageState>,
}

impl Tracker<'_> {
    fn enter(&mut self, state: StageState) {
        tracing::debug!(stage = self.stage, state = ?state, "stage transition");
        self.transitions.push(state);
    }
}

/// Run `operation` under `policy`.
///
/// Never panics and never returns early with `Err`: every path ends in a
/// [`StageOutcome`].
pub async fn run_with_retry<T, F, Fut>(
    stage: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> StageOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let started = Instant::now();
    // A budget too large to add to the clock never expires.
    let deadline = policy
        .max_wall_clock
        .and_then(|budget| started.checked_add(budget));
    let mut tracker = Tracker {
        stage,
        transitions: Vec::new(),
    };
    tracker.enter(StageState::Pending);

    let mut attempt = 0_u32;
    loop {
        tracker.enter(StageState::Running);
        let result = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, operation()).await {
                Ok(result) => result,
                Err(_) => {
                    return fail(tracker, timeout(stage, policy), attempt + 1, started);
                }
            },
            None => operation().await,
        };

        let error = match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(stage, attempts = attempt + 1, "stage succeeded after retry");
                }
                tracker.enter(StageState::Succeeded);
                return StageOutcome::Succeeded {
                    value,
                    attempts: attempt + 1,
                    elapsed: started.elapsed(),
                    transitions: tracker.transitions,
                };
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            tracing::error!(
                stage,
                error_type = error.error_type(),
                error = %error,
                "stage failed with non-retryable error"
            );
            return fail(tracker, error, attempt + 1, started);
        }
        if attempt >= policy.max_retries {
            tracing::error!(
                stage,
                attempts = attempt + 1,
                error_type = error.error_type(),
                error = %error,
                "stage failed after exhausting retries"
            );
            return fail(tracker, error, attempt + 1, started);
        }

        let delay = policy.delay_for(attempt);
        attempt += 1;
        tracker.enter(StageState::Retrying { attempt });
        tracing::warn!(
            stage,
            attempt,
            max_retries = policy.max_retries,
            delay_ms = millis(delay),
            error_type = error.error_type(),
            error = %error,
            "retryable stage error; backing off"
        );

        match deadline {
            Some(deadline) => {
                let wake = Instant::now().checked_add(delay);
                let Some(wake) = wake.filter(|wake| *wake <= deadline) else {
                    tokio::time::sleep_until(deadline).await;
                    return fail(tracker, timeout(stage, policy), attempt, started);
                };
                tokio::time::sleep_until(wake).await;
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}

fn timeout(stage: &str, policy: &RetryPolicy) -> PipelineError {
    let budget = policy.max_wall_clock.unwrap_or_default();
    tracing::error!(stage, budget_ms = millis(budget), "stage exceeded wall-clock budget");
    PipelineError::Timeout(format!(
        "stage {stage} exceeded its {:.1}s wall-clock budget",
        budget.as_secs_f64()
    ))
}

fn fail<T>(
    mut tracker: Tracker<'_>,
    error: PipelineError,
    attempts: u32,
    started: Instant,
) -> StageOutcome<T> {
    tracker.enter(StageState::Failed);
    StageOutcome::Failed {
        error,
        attempts,
        elapsed: started.elapsed(),
        transitions: tracker.transitions,
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
