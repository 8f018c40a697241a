//! Request descriptors and raw transport outcomes.
//!
//! A [`CommandDescriptor`] is built once from an encoded payload, consumed by
//! one execution, and never mutated. Paths are relative to the configured
//! server URL (e.g. `/classes/GameScore`).

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use crate::{ClassName, Pointer, TransportFailure};

/// HTTP method of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read.
    Get,
    /// Create (or batch envelope).
    Post,
    /// Update.
    Put,
    /// Delete.
    Delete,
}

impl Method {
    /// `true` for methods whose repetition cannot produce extra side effects.
    ///
    /// `PUT` is deliberately not idempotent here: an update body may carry
    /// field operations such as `Increment`.
    pub fn is_idempotent(self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }

    /// Upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document.
    Json(Value),
    /// Raw bytes (file uploads).
    Bytes {
        /// MIME type sent as `Content-Type`.
        content_type: String,
        /// Body bytes.
        data: Vec<u8>,
    },
}

/// An immutable request: method, path, optional body and query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    method: Method,
    path: String,
    body: Option<RequestBody>,
    params: BTreeMap<String, String>,
}

impl CommandDescriptor {
    /// A bodiless command.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            params: BTreeMap::new(),
        }
    }

    /// Attaches a JSON body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Attaches a raw byte body.
    #[must_use]
    pub fn with_bytes(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Bytes {
            content_type: content_type.into(),
            data,
        });
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    // -- well-known shapes -------------------------------------------------

    /// `POST /classes/<class>`.
    pub fn create(class_name: &ClassName, body: Value) -> Self {
        Self::new(Method::Post, format!("/classes/{class_name}")).with_json(body)
    }

    /// `PUT /classes/<class>/<id>`.
    pub fn update(pointer: &Pointer, body: Value) -> Self {
        Self::new(Method::Put, object_path(pointer)).with_json(body)
    }

    /// `GET /classes/<class>/<id>`.
    pub fn fetch(pointer: &Pointer) -> Self {
        Self::new(Method::Get, object_path(pointer))
    }

    /// `DELETE /classes/<class>/<id>`.
    pub fn delete(pointer: &Pointer) -> Self {
        Self::new(Method::Delete, object_path(pointer))
    }

    /// `POST /files/<name>` with raw bytes.
    pub fn upload(name: &str, content_type: Option<&str>, data: Vec<u8>) -> Self {
        Self::new(Method::Post, format!("/files/{name}")).with_bytes(
            content_type.unwrap_or("application/octet-stream"),
            data,
        )
    }

    // -- accessors ---------------------------------------------------------

    /// Method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Path relative to the server URL.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Body, if any.
    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// JSON body, if the body is JSON.
    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            Some(RequestBody::Json(v)) => Some(v),
            _ => None,
        }
    }

    /// Query parameters in key order.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

fn object_path(pointer: &Pointer) -> String {
    format!("/classes/{}/{}", pointer.class_name, pointer.object_id)
}

/// A response received from the transport, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body bytes.
    pub body: Vec<u8>,
    /// Parsed `Retry-After` header, when present.
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    /// A response with no `Retry-After` hint.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that produced no response at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{failure} failure: {message}")]
pub struct TransportError {
    /// Whether the request may have reached the server.
    pub failure: TransportFailure,
    /// Transport-supplied detail.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(failure: TransportFailure, message: impl Into<String>) -> Self {
        Self {
            failure,
            message: message.into(),
        }
    }
}

/// What one attempt produced: a response of any status, or no response.
pub type TransportOutcome = Result<RawResponse, TransportError>;
