//! Retry policy for transient failures
//!
//! Two kinds of outcome are retried: transport failures (timeouts, dropped
//! connections) and completed responses whose status is in the retryable
//! set (429 and the 5xx gateway family by default).
//!
//! Backoff is purely exponential in the zero-based attempt index
//! (`base_delay * 2^attempt`) with no jitter. Callers that need jitter wrap
//! the client externally.

use std::time::Duration;

use crate::transport::TransportError;

/// Decides whether a failed send is retried, and after how long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first send; total sends are bounded by `max_retries + 1`
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Statuses worth retrying, whether reported by a failure or a response
    pub retryable_statuses: Vec<u16>,
    /// Retry failures that carry no status (connection refused, reset, DNS)
    pub retry_network_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            retryable_statuses: vec![408, 429, 500, 502, 503, 504],
            retry_network_errors: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given zero-based attempt
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether a status is transient
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Whether the failure is transient by classification alone
    #[must_use]
    pub fn is_retryable(&self, error: &TransportError) -> bool {
        match error.status {
            Some(status) => self.is_retryable_status(status),
            None => self.retry_network_errors,
        }
    }

    /// Backoff to wait before the next attempt, or `None` to give up
    #[must_use]
    pub fn next_delay(&self, error: &TransportError, attempt: u32) -> Option<Duration> {
        self.within_budget(attempt, self.is_retryable(error))
    }

    /// Backoff after a completed response with `status`, or `None` to accept it
    #[must_use]
    pub fn next_delay_for_status(&self, status: u16, attempt: u32) -> Option<Duration> {
        self.within_budget(attempt, self.is_retryable_status(status))
    }

    fn within_budget(&self, attempt: u32, retryable: bool) -> Option<Duration> {
        (retryable && attempt < self.max_retries).then(|| self.backoff(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(100),
            ..Default::default()
        }
    }

    #[test]
    fn test_backoff_is_exponential() {
        let policy = policy();
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = policy();
        assert_eq!(policy.backoff(40), Duration::from_millis(100).saturating_mul(u32::MAX));
    }

    #[test]
    fn test_retryable_classification() {
        let policy = policy();
        assert!(policy.is_retryable(&TransportError::with_status(503, "unavailable")));
        assert!(policy.is_retryable(&TransportError::with_status(408, "timeout")));
        assert!(!policy.is_retryable(&TransportError::with_status(400, "bad request")));
        assert!(policy.is_retryable(&TransportError::new("connection reset")));

        let strict = RetryPolicy {
            retry_network_errors: false,
            ..policy
        };
        assert!(!strict.is_retryable(&TransportError::new("connection reset")));
    }

    #[test]
    fn test_budget_is_bounded() {
        let policy = policy();
        let err = TransportError::with_status(502, "bad gateway");
        assert!(policy.next_delay(&err, 0).is_some());
        assert!(policy.next_delay(&err, 2).is_some());
        assert!(policy.next_delay(&err, 3).is_none());
    }

    #[test]
    fn test_response_status_classification() {
        let policy = policy();
        assert_eq!(policy.next_delay_for_status(503, 0), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay_for_status(429, 1), Some(Duration::from_millis(200)));
        assert!(policy.next_delay_for_status(503, 3).is_none());
        assert!(policy.next_delay_for_status(501, 0).is_none());
        assert!(policy.next_delay_for_status(404, 0).is_none());
        assert!(policy.next_delay_for_status(200, 0).is_none());
    }
}
