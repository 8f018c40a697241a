//! Error taxonomy and retry-decision types.
//!
//! [`StoreError`] is the single terminal error every operation reports. It is
//! `Clone` so batch results and per-subscription deliveries can each carry a
//! copy of a shared failure.
//!
//! [`RetryDecision`] is the cross-cutting verdict produced by
//! [`crate::RetryPolicy::decide`]: whether a failed attempt may be re-issued
//! and after what delay.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a failed attempt is safe to retry and, if so, after what delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryDecision {
    /// The attempt may be re-issued.
    Retryable {
        /// Minimum back-off before the next attempt (e.g. derived from a
        /// `Retry-After` response header or the policy's exponential schedule).
        after: Duration,
    },
    /// The outcome is terminal and must be surfaced to the caller.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Transport failure classification
// ---------------------------------------------------------------------------

/// How a request failed when no HTTP response was received.
///
/// The classification is explicit because it decides whether a
/// state-mutating request may be re-sent: only failures that provably never
/// reached the server are safe to repeat for non-idempotent methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFailure {
    /// The connection (DNS, TCP, TLS) could not be established. Nothing was
    /// written, so the request definitely did not reach the server.
    Connect,
    /// The deadline expired after the request may have been written.
    Timeout,
    /// The connection dropped after the request was (possibly) written.
    Interrupted,
}

impl TransportFailure {
    /// Returns `true` when the request cannot have been observed by the server.
    pub fn definitely_not_sent(self) -> bool {
        matches!(self, Self::Connect)
    }
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Terminal errors reported by encoding, dispatch, and live-query operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A value cannot be represented in the wire format.
    #[error("encoding error: {message}")]
    Encoding {
        /// What could not be encoded and why.
        message: String,
    },

    /// A referenced child object or attachment has no id and cannot be saved.
    #[error("child resolution error: {message}")]
    ChildResolution {
        /// Which dependency could not be resolved.
        message: String,
    },

    /// The transport could not deliver the request or keep the socket open.
    #[error("connection failed ({failure}): {message}")]
    Connection {
        /// Whether the failure may have reached the server.
        failure: TransportFailure,
        /// Transport-supplied detail.
        message: String,
    },

    /// A frame or response body did not match the expected protocol shape.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the malformed or unexpected input.
        message: String,
    },

    /// The remote store answered with a structured application error.
    #[error("server error {code}: {message}")]
    Server {
        /// Store-defined numeric error code.
        code: i64,
        /// Human-readable message from the store.
        message: String,
    },

    /// A non-2xx response whose body was not the structured error shape.
    #[error("unknown error (status {status}): {body}")]
    Unknown {
        /// HTTP status of the response.
        status: u16,
        /// Raw response body, lossily decoded as UTF-8.
        body: String,
    },

    /// A ping or connect deadline expired.
    #[error("timed out: {operation}")]
    Timeout {
        /// Operation whose deadline expired (`"ping"`, `"connect"`).
        operation: String,
    },

    /// The operation was attempted on, or interrupted by, an explicitly closed client.
    #[error("client closed")]
    Closed,
}

impl StoreError {
    /// Convenience constructor for [`StoreError::Encoding`].
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`StoreError::ChildResolution`].
    pub fn child_resolution(message: impl Into<String>) -> Self {
        Self::ChildResolution {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`StoreError::Protocol`].
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`StoreError::Connection`].
    pub fn connection(failure: TransportFailure, message: impl Into<String>) -> Self {
        Self::Connection {
            failure,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`StoreError::Timeout`].
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Returns the server error code for [`StoreError::Server`], if any.
    pub fn server_code(&self) -> Option<i64> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connect_failures_are_definitely_unsent() {
        assert!(TransportFailure::Connect.definitely_not_sent());
        assert!(!TransportFailure::Timeout.definitely_not_sent());
        assert!(!TransportFailure::Interrupted.definitely_not_sent());
    }

    #[test]
    fn server_error_display_carries_code() {
        let err = StoreError::Server {
            code: 101,
            message: "Object not found.".into(),
        };
        assert_eq!(err.to_string(), "server error 101: Object not found.");
        assert_eq!(err.server_code(), Some(101));
    }
}
