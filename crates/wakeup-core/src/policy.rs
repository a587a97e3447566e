//! Retry policy configuration.

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};

/// How the nominal delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed,
    /// The delay is multiplied by `multiplier` after every retry.
    Exponential {
        /// Growth factor, at least 1.0.
        multiplier: f64,
    },
}

/// Bounds and pacing for the retry scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of connection attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Growth of the delay between retries.
    pub backoff: Backoff,

    /// Extra random fraction added to each delay, between 0.0 and 1.0.
    pub jitter_fraction: f64,

    /// Upper bound on the exponential nominal delay, applied before jitter.
    ///
    /// Fixed backoff always waits `base_delay`.
    pub max_delay: Duration,

    /// Time budget for the whole sequence, backoff included.
    pub overall_deadline: Duration,
}

impl Default for RetryPolicy {
    /// Fifteen attempts twenty seconds apart, within five minutes.
    ///
    /// Fourteen backoffs of 20 s plus up to 10 % jitter take 280 to 308 s, so
    /// a database that never resumes usually hits the deadline during the
    /// last backoff and ends as [`Error::Cancelled`] with
    /// [`CancelReason::Deadline`] rather than [`Error::Exhausted`].
    ///
    /// [`CancelReason::Deadline`]: crate::error::CancelReason::Deadline
    fn default() -> Self {
        Self {
            max_attempts: 15,
            base_delay: Duration::from_secs(20),
            backoff: Backoff::Fixed,
            jitter_fraction: 0.1,
            max_delay: Duration::from_secs(60),
            overall_deadline: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// The default fixed-delay policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Six attempts with a doubling delay starting at five seconds.
    #[must_use]
    pub fn exponential() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(5),
            backoff: Backoff::Exponential { multiplier: 2.0 },
            ..Self::default()
        }
    }

    /// Set the maximum number of attempts.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff growth.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the jitter fraction.
    #[must_use]
    pub fn jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction;
        self
    }

    /// Set the cap on the nominal delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the overall deadline.
    #[must_use]
    pub fn overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = deadline;
        self
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(Error::Configuration(format!(
                "jitter_fraction must be between 0 and 1, got {}",
                self.jitter_fraction
            )));
        }
        if let Backoff::Exponential { multiplier } = self.backoff {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(Error::Configuration(format!(
                    "backoff multiplier must be a finite number >= 1, got {multiplier}"
                )));
            }
        }
        if self.overall_deadline.is_zero() {
            return Err(Error::Configuration(
                "overall_deadline must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Nominal delay before `attempt` (1-based), without jitter.
    ///
    /// The first attempt is never delayed. For later attempts the delay is
    /// `base_delay` for fixed backoff, or `base_delay * multiplier^(attempt - 2)`
    /// capped at `max_delay` for exponential backoff.
    #[must_use]
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential { multiplier } => {
                let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
                let secs = self.base_delay.as_secs_f64() * multiplier.powi(exponent);
                if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    self.max_delay
                }
            }
        }
    }

    /// Extend `nominal` by a random fraction in `[0, jitter_fraction]`.
    ///
    /// The result is never shorter than `nominal`.
    #[must_use]
    pub fn apply_jitter<R: Rng>(&self, nominal: Duration, rng: &mut R) -> Duration {
        if self.jitter_fraction <= 0.0 || nominal.is_zero() {
            return nominal;
        }
        let extra = rng.gen_range(0.0..=self.jitter_fraction);
        nominal.saturating_add(nominal.mul_f64(extra))
    }

    /// Jittered delay before `attempt`.
    #[must_use]
    pub fn delay_for<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.apply_jitter(self.nominal_delay(attempt), rng)
    }
}
