//! Stall-triggered reconnection policy
//!
//! Bounded-linear: a fixed delay and a fixed attempt budget. No
//! exponential backoff; the fixed delay keeps reconnects from hammering
//! a possibly-overloaded endpoint and both values are tunables.

use super::transport::TransportState;
use std::time::Duration;

/// Default reconnect attempt budget per play request
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Default delay before a scheduled reconnect fires
pub const DEFAULT_RETRY_DELAY_MS: u64 = 4000;

/// Outcome of a retry evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub delay: Duration,
}

/// Reconnect policy for stalled sessions
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum reconnect attempts per logical play request
    pub max_retries: u32,
    /// Fixed delay before a scheduled reconnect fires
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Decide whether a stalled session warrants another attempt.
    ///
    /// Retry only while frames are not flowing, the attempt budget is not
    /// exhausted, and the transport is still logically connected; a stall
    /// on a dead transport is handled by the transport path instead.
    pub fn decide(
        &self,
        attempt: u32,
        media_started: bool,
        transport: TransportState,
    ) -> RetryDecision {
        let should_retry = !media_started
            && attempt < self.max_retries
            && transport == TransportState::Connected;
        RetryDecision {
            should_retry,
            delay: self.delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_while_budget_remains() {
        let policy = RetryPolicy::default();
        for attempt in 1..4 {
            let decision = policy.decide(attempt, false, TransportState::Connected);
            assert!(decision.should_retry, "attempt {} should retry", attempt);
            assert_eq!(decision.delay, Duration::from_millis(4000));
        }
    }

    #[test]
    fn stops_when_budget_exhausted() {
        let policy = RetryPolicy::default();
        assert!(!policy.decide(4, false, TransportState::Connected).should_retry);
        assert!(!policy.decide(5, false, TransportState::Connected).should_retry);
    }

    #[test]
    fn no_retry_while_media_is_flowing() {
        let policy = RetryPolicy::default();
        assert!(!policy.decide(1, true, TransportState::Connected).should_retry);
    }

    #[test]
    fn no_retry_unless_transport_connected() {
        let policy = RetryPolicy::default();
        assert!(!policy.decide(1, false, TransportState::New).should_retry);
        assert!(!policy.decide(1, false, TransportState::Disconnected).should_retry);
        assert!(!policy.decide(1, false, TransportState::Failed).should_retry);
        assert!(!policy.decide(1, false, TransportState::Closed).should_retry);
    }

    #[test]
    fn honors_custom_bounds() {
        let policy = RetryPolicy {
            max_retries: 1,
            delay: Duration::from_millis(100),
        };
        let decision = policy.decide(0, false, TransportState::Connected);
        assert!(decision.should_retry);
        assert_eq!(decision.delay, Duration::from_millis(100));
        assert!(!policy.decide(1, false, TransportState::Connected).should_retry);
    }
}
