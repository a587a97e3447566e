//! Retry scheduler.
//!
//! Drives a connect-and-verify operation until it succeeds, fails with a
//! non-throttling error, runs out of attempts, or is cancelled. This is the
//! only place in the crate that retries.
//!
//! ```text
//! Idle ──► Attempting ──Success──────────────► Succeeded
//!              │ ▲  ────FatalFailure─────────► FailedFatal
//!              │ │  ────last attempt failed──► FailedExhausted
//!   Transient  ▼ │ delay elapsed
//!            BackingOff
//!
//! Attempting / BackingOff ──token or deadline──► Cancelled
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::{CancelReason, ConnectError, Error, Result};
use crate::policy::RetryPolicy;
use crate::throttle;

/// Result of a single connection attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    /// The attempt produced a verified handle.
    Success(T),
    /// The database is paused or resuming; worth another attempt.
    TransientFailure(ConnectError),
    /// Anything else; retrying will not help.
    FatalFailure(ConnectError),
    /// The attempt observed cancellation itself.
    Cancelled,
}

impl<T> AttemptOutcome<T> {
    /// Classify a failure with [`throttle::is_throttling`].
    #[must_use]
    pub fn from_failure(failure: ConnectError) -> Self {
        if throttle::is_throttling(Some(&failure)) {
            Self::TransientFailure(failure)
        } else {
            Self::FatalFailure(failure)
        }
    }
}

/// Scheduler state, reported in trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Not started.
    Idle,
    /// An attempt is in flight.
    Attempting,
    /// Waiting before the next attempt.
    BackingOff,
    /// An attempt succeeded.
    Succeeded,
    /// An attempt failed with a non-throttling error.
    FailedFatal,
    /// All attempts hit the throttling condition.
    FailedExhausted,
    /// The deadline or the cancellation token fired.
    Cancelled,
}

impl RetryState {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::FailedFatal | Self::FailedExhausted | Self::Cancelled
        )
    }
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Attempting => "attempting",
            Self::BackingOff => "backing-off",
            Self::Succeeded => "succeeded",
            Self::FailedFatal => "failed-fatal",
            Self::FailedExhausted => "failed-exhausted",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Bookkeeping local to one [`retry`] call.
struct Run {
    state: RetryState,
    started: Instant,
    deadline: Instant,
    attempts: u32,
    last: Option<ConnectError>,
}

impl Run {
    fn new(policy: &RetryPolicy) -> Self {
        let started = Instant::now();
        Self {
            state: RetryState::Idle,
            started,
            deadline: started + policy.overall_deadline,
            attempts: 0,
            last: None,
        }
    }

    fn transition(&mut self, next: RetryState) {
        debug_assert!(
            !self.state.is_terminal(),
            "no transition out of {}",
            self.state
        );
        tracing::trace!(from = %self.state, to = %next, attempt = self.attempts, "retry state");
        self.state = next;
    }

    fn cancelled(mut self, reason: CancelReason) -> Error {
        self.transition(RetryState::Cancelled);
        let elapsed = self.started.elapsed();
        tracing::warn!(
            attempts = self.attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            reason = %reason,
            "connection sequence cancelled"
        );
        Error::Cancelled {
            reason,
            attempts: self.attempts,
            elapsed,
            last: self.last,
        }
    }

    fn check_cancelled(&self, cancel: &CancellationToken) -> Option<CancelReason> {
        if cancel.is_cancelled() {
            Some(CancelReason::Signal)
        } else if Instant::now() >= self.deadline {
            Some(CancelReason::Deadline)
        } else {
            None
        }
    }
}

/// Run `op` under `policy` until a terminal outcome.
///
/// `op` receives the 1-based attempt number. The first attempt starts
/// immediately; later attempts wait for [`RetryPolicy::delay_for`], never past
/// the overall deadline. The cancellation token and the deadline are raced
/// against both the in-flight attempt and the backoff sleep, so either one
/// stops the sequence promptly.
///
/// # Errors
///
/// - [`Error::Fatal`] with the unchanged cause when an attempt fails fatally.
/// - [`Error::Exhausted`] with the last cause after `max_attempts` transient
///   failures.
/// - [`Error::Cancelled`] when the token or the deadline fires.
/// - [`Error::Configuration`] when the policy is invalid.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, cancel: &CancellationToken, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    policy.validate()?;

    let mut run = Run::new(policy);

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            let delay = policy.delay_for(attempt, &mut rand::thread_rng());
            let wake_at = (Instant::now() + delay).min(run.deadline);
            run.transition(RetryState::BackingOff);
            tracing::info!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "database not available yet, backing off"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(run.cancelled(CancelReason::Signal)),
                () = sleep_until(run.deadline) => return Err(run.cancelled(CancelReason::Deadline)),
                () = sleep_until(wake_at) => {}
            }
        }

        if let Some(reason) = run.check_cancelled(cancel) {
            return Err(run.cancelled(reason));
        }

        run.attempts = attempt;
        run.transition(RetryState::Attempting);
        tracing::info!(
            attempt,
            max_attempts = policy.max_attempts,
            "attempting database connection"
        );

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => AttemptOutcome::Cancelled,
            () = sleep_until(run.deadline) => {
                return Err(run.cancelled(CancelReason::Deadline));
            }
            outcome = op(attempt) => outcome,
        };

        match outcome {
            AttemptOutcome::Success(value) => {
                run.transition(RetryState::Succeeded);
                tracing::info!(
                    attempt,
                    elapsed_ms = run.started.elapsed().as_millis() as u64,
                    "database connection verified"
                );
                return Ok(value);
            }
            AttemptOutcome::FatalFailure(source) => {
                run.transition(RetryState::FailedFatal);
                tracing::error!(attempt, error = %source, "connection failed, not retrying");
                return Err(Error::Fatal {
                    attempt,
                    elapsed: run.started.elapsed(),
                    source,
                });
            }
            AttemptOutcome::TransientFailure(source) => {
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %source,
                    "database is paused or resuming"
                );
                run.last = Some(source);
            }
            AttemptOutcome::Cancelled => return Err(run.cancelled(CancelReason::Signal)),
        }
    }

    run.transition(RetryState::FailedExhausted);
    let elapsed = run.started.elapsed();
    match run.last {
        Some(source) => Err(Error::Exhausted {
            attempts: run.attempts,
            elapsed,
            source,
        }),
        None => Err(Error::Configuration(
            "retry policy allowed no attempts".into(),
        )),
    }
}

/// Upper bound on the time [`retry`] can spend sleeping for `policy`.
///
/// Useful for sizing an outer timeout; the overall deadline still applies.
#[must_use]
pub fn worst_case_backoff(policy: &RetryPolicy) -> Duration {
    (2..=policy.max_attempts)
        .map(|attempt| {
            policy
                .nominal_delay(attempt)
                .mul_f64(1.0 + policy.jitter_fraction.clamp(0.0, 1.0))
        })
        .fold(Duration::ZERO, Duration::saturating_add)
        .min(policy.overall_deadline)
}
