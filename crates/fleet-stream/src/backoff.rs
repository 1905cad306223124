//! Reconnect backoff policy.
//!
//! [`BackoffPolicy::delay_for`] is a pure function of the attempt counter: it
//! does no I/O, keeps no state and draws no randomness, so the retry schedule
//! of a controller is fully determined by its configuration.

use std::time::Duration;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(2_000);

/// Default number of retries before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Outcome of a backoff lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Wait this long, then open a new session.
    Delay(Duration),
    /// The retry budget is spent.
    GiveUp,
}

impl Backoff {
    /// Returns the delay, if any.
    pub fn delay(self) -> Option<Duration> {
        match self {
            Self::Delay(delay) => Some(delay),
            Self::GiveUp => None,
        }
    }

    /// Returns `true` if the policy gave up.
    pub fn is_give_up(self) -> bool {
        matches!(self, Self::GiveUp)
    }
}

/// Deterministic exponential backoff: `base_delay * factor^attempt`, capped at
/// `max_delay`, until `max_retries` attempts have been used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay for attempt zero.
    pub base_delay: Duration,
    /// Growth factor between consecutive attempts.
    pub factor: u32,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Attempts allowed before [`Backoff::GiveUp`].
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            factor: 2,
            max_delay: Duration::from_secs(60),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with the given base delay and retry budget, doubling
    /// each time.
    #[must_use]
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_retries,
            max_delay: Duration::MAX,
            ..Default::default()
        }
    }

    /// Set the growth factor.
    #[must_use]
    pub fn factor(mut self, factor: u32) -> Self {
        self.factor = factor;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Look up the wait before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Backoff {
        if attempt >= self.max_retries {
            return Backoff::GiveUp;
        }

        let multiplier = self.factor.saturating_pow(attempt);
        let delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay);
        Backoff::Delay(delay)
    }

    /// Validate the policy.
    ///
    /// # Errors
    ///
    /// Returns an error message string if any field has an invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay.is_zero() {
            return Err("Base reconnect delay must be > 0".to_string());
        }
        if self.factor == 0 {
            return Err("Backoff factor must be >= 1".to_string());
        }
        if self.max_delay < self.base_delay {
            return Err("Max reconnect delay must be >= base reconnect delay".to_string());
        }
        Ok(())
    }
}
