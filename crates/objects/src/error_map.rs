//! Maps transport outcomes onto the [`StoreError`] taxonomy.
//!
//! Precedence for non-2xx responses: the structured `{code, error}` shape is
//! tried first; only when that decode fails does the outcome become
//! [`StoreError::Unknown`] with the raw status preserved.

use serde::Deserialize;
use serde_json::Value;

use crate::{RawResponse, StoreError, TransportOutcome};

/// The structured error body returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerErrorBody {
    /// Store-defined error code.
    pub code: i64,
    /// Human-readable message.
    pub error: String,
}

impl From<ServerErrorBody> for StoreError {
    fn from(body: ServerErrorBody) -> Self {
        StoreError::Server {
            code: body.code,
            message: body.error,
        }
    }
}

/// Maps one attempt's outcome to a decoded JSON body or a typed error.
///
/// A 2xx response with an empty body decodes to `Value::Null`.
pub fn map_outcome(outcome: TransportOutcome) -> Result<Value, StoreError> {
    match outcome {
        Ok(response) => map_response(&response),
        Err(err) => Err(StoreError::Connection {
            failure: err.failure,
            message: err.message,
        }),
    }
}

/// Maps a received response.
pub fn map_response(response: &RawResponse) -> Result<Value, StoreError> {
    if response.is_success() {
        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_slice(&response.body).map_err(|e| {
            StoreError::protocol(format!(
                "undecodable success body (status {}): {e}",
                response.status
            ))
        });
    }
    Err(map_error_body(response.status, &response.body))
}

/// Maps a non-2xx status and body to [`StoreError::Server`] or [`StoreError::Unknown`].
pub fn map_error_body(status: u16, body: &[u8]) -> StoreError {
    match serde_json::from_slice::<ServerErrorBody>(body) {
        Ok(structured) => structured.into(),
        Err(_) => StoreError::Unknown {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

/// Maps an already-decoded error value (e.g. one entry of a batch response).
pub fn map_error_value(status: u16, value: &Value) -> StoreError {
    match ServerErrorBody::deserialize(value) {
        Ok(structured) => structured.into(),
        Err(_) => StoreError::Unknown {
            status,
            body: value.to_string(),
        },
    }
}
