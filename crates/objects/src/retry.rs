//! Method-aware retry policy with capped exponential backoff.
//!
//! | Outcome | Idempotent (`GET`, `DELETE`) | Mutating (`POST`, `PUT`) |
//! |---------|------------------------------|--------------------------|
//! | 2xx | done | done |
//! | 4xx | never retried | never retried |
//! | 5xx | retried | not retried (the server may have applied it) |
//! | [`TransportFailure::Connect`] | retried | retried (nothing was sent) |
//! | [`TransportFailure::Timeout`] / [`TransportFailure::Interrupted`] | retried | not retried |
//!
//! Every retry is bounded by [`RetryPolicy::max_attempts`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Method, RetryDecision, TransportFailure, TransportOutcome};

/// Retry ceiling and backoff schedule for dispatched commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, including `Retry-After` hints.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (1-based count of failed attempts).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Decides whether the outcome of attempt number `attempt` warrants another.
    pub fn decide(
        &self,
        method: Method,
        outcome: &TransportOutcome,
        attempt: u32,
    ) -> RetryDecision {
        if attempt >= self.max_attempts.max(1) {
            return RetryDecision::NonRetryable;
        }
        let transient = match outcome {
            Ok(response) if response.is_success() => false,
            Ok(response) if (500..600).contains(&response.status) => method.is_idempotent(),
            Ok(_) => false,
            Err(err) => is_retryable_failure(method, err.failure),
        };
        if !transient {
            return RetryDecision::NonRetryable;
        }
        let hinted = outcome
            .as_ref()
            .ok()
            .and_then(|r| r.retry_after)
            .map(|d| d.min(Duration::from_millis(self.max_delay_ms)));
        RetryDecision::Retryable {
            after: hinted.unwrap_or_else(|| self.backoff(attempt)),
        }
    }
}

fn is_retryable_failure(method: Method, failure: TransportFailure) -> bool {
    method.is_idempotent() || failure.definitely_not_sent()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{RawResponse, TransportError};

    fn status(code: u16) -> TransportOutcome {
        Ok(RawResponse::new(code, Vec::new()))
    }

    fn failure(kind: TransportFailure) -> TransportOutcome {
        Err(TransportError::new(kind, "boom"))
    }

    #[rstest]
    #[case::get_5xx(Method::Get, status(503), true)]
    #[case::delete_5xx(Method::Delete, status(500), true)]
    #[case::post_5xx(Method::Post, status(503), false)]
    #[case::put_5xx(Method::Put, status(502), false)]
    #[case::get_4xx(Method::Get, status(400), false)]
    #[case::post_4xx(Method::Post, status(429), false)]
    #[case::get_timeout(Method::Get, failure(TransportFailure::Timeout), true)]
    #[case::post_connect(Method::Post, failure(TransportFailure::Connect), true)]
    #[case::post_timeout(Method::Post, failure(TransportFailure::Timeout), false)]
    #[case::put_interrupted(Method::Put, failure(TransportFailure::Interrupted), false)]
    #[case::success(Method::Get, status(200), false)]
    fn retry_matrix(
        #[case] method: Method,
        #[case] outcome: TransportOutcome,
        #[case] retry: bool,
    ) {
        let decision = RetryPolicy::default().decide(method, &outcome, 1);
        assert_eq!(matches!(decision, RetryDecision::Retryable { .. }), retry);
    }

    #[test]
    fn ceiling_stops_retries() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let outcome = status(503);
        assert!(matches!(
            policy.decide(Method::Get, &outcome, 2),
            RetryDecision::Retryable { .. }
        ));
        assert_eq!(
            policy.decide(Method::Get, &outcome, 3),
            RetryDecision::NonRetryable
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(200), Duration::from_millis(1_000));
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let policy = RetryPolicy::default();
        let mut response = RawResponse::new(503, Vec::new());
        response.retry_after = Some(Duration::from_secs(3600));
        assert_eq!(
            policy.decide(Method::Get, &Ok(response), 1),
            RetryDecision::Retryable {
                after: Duration::from_millis(policy.max_delay_ms)
            }
        );
    }
}
