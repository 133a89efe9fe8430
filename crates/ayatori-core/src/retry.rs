//! Retry and backoff policy for failed state nodes.

use std::time::Duration;

/// Number of retries used when a retry policy is requested without a count.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry policy for a state node.
///
/// The node runs once; if it fails, it is re-run up to `max_retries` more
/// times, waiting [`delay_for_attempt`](Self::delay_for_attempt) before each
/// retry.
///
/// # Examples
///
/// ```
/// use ayatori_core::RetryPolicy;
/// use std::time::Duration;
///
/// // No retry (default)
/// let policy = RetryPolicy::None;
///
/// // Fixed delay: retry 3 times with 1 second delay
/// let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
///
/// // Backoff in whole seconds: waits 1s, 2s, 4s
/// let policy = RetryPolicy::backoff(3, 2);
/// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(4)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// No retry; a failed node stays failed.
    #[default]
    None,
    /// Fixed delay between retries.
    Fixed {
        /// Maximum number of retry attempts
        max_retries: u32,
        /// Delay between each retry
        delay: Duration,
    },
    /// Exponential backoff: `initial_delay * multiplier^attempt`, capped.
    ExponentialBackoff {
        /// Maximum number of retry attempts
        max_retries: u32,
        /// Delay before the first retry
        initial_delay: Duration,
        /// Maximum delay cap
        max_delay: Duration,
        /// Multiplier for each retry (e.g., 2 doubles the delay)
        multiplier: u32,
    },
}

/// Error returned when [`RetryPolicy`] configuration is invalid.
///
/// ```
/// use ayatori_core::RetryPolicy;
/// use std::time::Duration;
///
/// let result = RetryPolicy::exponential_backoff(
///     3,
///     Duration::from_millis(100),
///     Duration::from_secs(10),
///     0,
/// );
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicyError(pub &'static str);

impl std::fmt::Display for RetryPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RetryPolicyError {}

impl RetryPolicy {
    /// Creates a fixed retry policy.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        RetryPolicy::Fixed { max_retries, delay }
    }

    /// Creates a backoff policy measured in whole seconds.
    ///
    /// Retry `k` (0-based) waits `base_secs^k` seconds, so the delays run
    /// `1, base, base², …`. Delays are not capped.
    ///
    /// ```
    /// use ayatori_core::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::backoff(5, 3);
    /// assert_eq!(policy.max_retries(), 5);
    /// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(1)));
    /// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(3)));
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(9)));
    /// ```
    pub fn backoff(max_retries: u32, base_secs: u32) -> Self {
        RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::MAX,
            multiplier: base_secs,
        }
    }

    /// Creates an exponential backoff policy with `multiplier=2` and
    /// `max_delay=60s`.
    ///
    /// ```
    /// use ayatori_core::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(5, Duration::from_millis(100));
    ///
    /// // Delays: 100ms, 200ms, 400ms, 800ms, 1600ms
    /// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(200)));
    /// ```
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }

    /// Creates an exponential backoff retry policy with custom settings.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError`] if:
    /// - `multiplier` is 0 (would result in no backoff)
    /// - `max_delay` is less than `initial_delay`
    pub fn exponential_backoff(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Result<Self, RetryPolicyError> {
        if multiplier == 0 {
            return Err(RetryPolicyError("multiplier must be greater than 0"));
        }
        if max_delay < initial_delay {
            return Err(RetryPolicyError("max_delay must be >= initial_delay"));
        }
        Ok(RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay,
            multiplier,
        })
    }

    /// Returns the maximum number of retries for this policy.
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { max_retries, .. } => *max_retries,
            RetryPolicy::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }

    /// Returns `true` if a retry numbered `attempt` (0-based) is allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries()
    }

    /// Calculates the delay before the given retry (0-based).
    ///
    /// Returns `None` for [`RetryPolicy::None`]. Overflowing backoff
    /// saturates at the policy's `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let delay = multiplier
                    .checked_pow(attempt)
                    .and_then(|factor| initial_delay.checked_mul(factor))
                    .unwrap_or(*max_delay);
                Some(delay.min(*max_delay))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_none() {
        let policy = RetryPolicy::None;
        assert_eq!(policy.max_retries(), 0);
        assert!(!policy.should_retry(0));
        assert_eq!(policy.delay_for_attempt(0), None);
    }

    #[test]
    fn test_retry_policy_fixed() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::backoff(3, 2);
        let delays: Vec<_> = (0..3)
            .map(|attempt| policy.delay_for_attempt(attempt))
            .collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
            ]
        );
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::backoff(100, 10);
        assert_eq!(policy.delay_for_attempt(40), Some(Duration::MAX));
    }

    #[test]
    fn test_exponential_capped() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2,
        };
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for_attempt(10), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_exponential_backoff_validation() {
        let result = RetryPolicy::exponential_backoff(
            3,
            Duration::from_millis(100),
            Duration::from_secs(10),
            0,
        );
        assert_eq!(
            result.unwrap_err().0,
            "multiplier must be greater than 0"
        );

        let result = RetryPolicy::exponential_backoff(
            3,
            Duration::from_secs(10),
            Duration::from_millis(100),
            2,
        );
        assert_eq!(result.unwrap_err().0, "max_delay must be >= initial_delay");
    }

    #[test]
    fn test_large_multiplier_saturates_at_max_delay() {
        let policy = RetryPolicy::exponential_backoff(
            10,
            Duration::from_millis(100),
            Duration::from_secs(30),
            50,
        )
        .unwrap();
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for_attempt(9), Some(Duration::from_secs(30)));
    }
}
