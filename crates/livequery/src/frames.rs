//! JSON frames exchanged over the live-query socket.
//!
//! Outgoing frames are [`ClientFrame`]s and incoming ones [`ServerFrame`]s;
//! both are tagged by their `op` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use objects::{ClassName, ClientId, Credentials, InstallationId, RequestId, StoreError};

/// A standing query: class, constraint document, and optional field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuery {
    /// Class whose objects are watched.
    pub class_name: ClassName,
    /// Constraint document in the store's query syntax. `{}` matches everything.
    #[serde(rename = "where")]
    pub constraints: Value,
    /// Keys to include in event payloads; all keys when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl LiveQuery {
    /// A query matching every object of `class_name`.
    pub fn all(class_name: ClassName) -> Self {
        Self {
            class_name,
            constraints: Value::Object(serde_json::Map::new()),
            fields: None,
        }
    }

    /// Restricts matches to objects satisfying `constraints`.
    #[must_use]
    pub fn matching(mut self, constraints: Value) -> Self {
        self.constraints = constraints;
        self
    }

    /// Limits event payloads to `fields`.
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Protocol handshake, sent once per socket.
    #[serde(rename_all = "camelCase")]
    Connect {
        /// Application the connection belongs to.
        application_id: String,
        /// Client key, when the application uses one.
        #[serde(skip_serializing_if = "Option::is_none")]
        client_key: Option<String>,
        /// Master key; bypasses per-object access rules.
        #[serde(skip_serializing_if = "Option::is_none")]
        master_key: Option<String>,
        /// Session of the signed-in user.
        #[serde(skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
        /// Stable id of this installation.
        installation_id: String,
    },
    /// Registers `query` under `request_id`.
    #[serde(rename_all = "camelCase")]
    Subscribe {
        /// Client-assigned id that tags every reply for this subscription.
        request_id: RequestId,
        /// The standing query.
        query: LiveQuery,
        /// Session the query is evaluated for.
        #[serde(skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
    },
    /// Replaces the query of an existing subscription.
    #[serde(rename_all = "camelCase")]
    Update {
        /// Subscription being changed.
        request_id: RequestId,
        /// The replacement query.
        query: LiveQuery,
        /// Session the query is evaluated for.
        #[serde(skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
    },
    /// Drops the subscription registered under `request_id`.
    #[serde(rename_all = "camelCase")]
    Unsubscribe {
        /// Subscription being dropped.
        request_id: RequestId,
    },
}

impl ClientFrame {
    /// The handshake frame for `credentials`.
    pub fn connect(credentials: Credentials, installation_id: InstallationId) -> Self {
        Self::Connect {
            application_id: credentials.application_id,
            client_key: credentials.client_key,
            master_key: credentials.master_key,
            session_token: credentials.session_token,
            installation_id: credentials
                .installation_id
                .unwrap_or_else(|| installation_id.to_string()),
        }
    }

    /// Serializes the frame to its JSON text.
    pub fn to_text(&self) -> Result<String, StoreError> {
        serde_json::to_string(self)
            .map_err(|e| StoreError::encoding(format!("live-query frame: {e}")))
    }
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Handshake acknowledgment.
    #[serde(rename_all = "camelCase")]
    Connected {
        /// Server-assigned id of this connection.
        client_id: ClientId,
    },
    /// A subscription is active.
    #[serde(rename_all = "camelCase")]
    Subscribed {
        /// The subscription that became active.
        request_id: RequestId,
    },
    /// A subscription was removed.
    #[serde(rename_all = "camelCase")]
    Unsubscribed {
        /// The subscription that was removed.
        request_id: RequestId,
    },
    /// A new object matches the subscription's query.
    #[serde(rename_all = "camelCase")]
    Create {
        /// Subscription the event belongs to.
        request_id: RequestId,
        /// The object as JSON.
        object: Value,
    },
    /// A matching object changed and still matches.
    #[serde(rename_all = "camelCase")]
    Update {
        /// Subscription the event belongs to.
        request_id: RequestId,
        /// The object after the change.
        object: Value,
    },
    /// A matching object was deleted.
    #[serde(rename_all = "camelCase")]
    Delete {
        /// Subscription the event belongs to.
        request_id: RequestId,
        /// The object as it was before deletion.
        object: Value,
    },
    /// An object changed and now matches.
    #[serde(rename_all = "camelCase")]
    Enter {
        /// Subscription the event belongs to.
        request_id: RequestId,
        /// The object after the change.
        object: Value,
    },
    /// A matching object changed and no longer matches.
    #[serde(rename_all = "camelCase")]
    Leave {
        /// Subscription the event belongs to.
        request_id: RequestId,
        /// The object after the change.
        object: Value,
    },
    /// An error for one subscription (`request_id` present) or for the
    /// whole connection.
    #[serde(rename_all = "camelCase")]
    Error {
        /// Store error code; `0` when the server sent none.
        #[serde(default)]
        code: i64,
        /// Human-readable description. Also accepted as `message`.
        #[serde(default, alias = "message")]
        error: String,
        /// Whether the client should reconnect after a connection error.
        #[serde(default)]
        reconnect: bool,
        /// The subscription the error concerns, if any.
        #[serde(default)]
        request_id: Option<RequestId>,
    },
    /// The server asks the client to continue on another socket URL.
    Redirect {
        /// Socket URL to reconnect to.
        url: String,
    },
}

impl ServerFrame {
    /// Parses one text frame.
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        serde_json::from_str(text)
            .map_err(|e| StoreError::protocol(format!("malformed live-query frame: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn query() -> LiveQuery {
        LiveQuery::all(ClassName::new("Message").unwrap())
            .matching(json!({"room": "lobby"}))
            .with_fields(["text"])
    }

    #[test]
    fn subscribe_frame_shape() {
        let frame = ClientFrame::Subscribe {
            request_id: RequestId::new(3),
            query: query(),
            session_token: None,
        };
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "op": "subscribe",
                "requestId": 3,
                "query": {"className": "Message", "where": {"room": "lobby"}, "fields": ["text"]}
            })
        );
    }

    #[test]
    fn connect_frame_omits_missing_keys() {
        let installation = InstallationId::new_random();
        let frame = ClientFrame::connect(
            Credentials {
                application_id: "app".into(),
                client_key: Some("ck".into()),
                ..Credentials::default()
            },
            installation,
        );
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(value["op"], "connect");
        assert_eq!(value["applicationId"], "app");
        assert_eq!(value["clientKey"], "ck");
        assert_eq!(value["installationId"], installation.to_string());
        assert!(value.get("masterKey").is_none());
    }

    #[test]
    fn event_frames_parse() {
        let frame = ServerFrame::parse(
            r#"{"op":"enter","requestId":7,"object":{"className":"Message","objectId":"m1"}}"#,
        )
        .unwrap();
        match frame {
            ServerFrame::Enter { request_id, object } => {
                assert_eq!(request_id, RequestId::new(7));
                assert_eq!(object["objectId"], "m1");
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn error_frames_accept_either_message_key() {
        let a = ServerFrame::parse(r#"{"op":"error","code":1,"error":"bad","reconnect":true}"#)
            .unwrap();
        let b = ServerFrame::parse(r#"{"op":"error","code":1,"message":"bad","requestId":2}"#)
            .unwrap();
        assert!(matches!(a, ServerFrame::Error { reconnect: true, request_id: None, .. }));
        match b {
            ServerFrame::Error {
                error, request_id, ..
            } => {
                assert_eq!(error, "bad");
                assert_eq!(request_id, Some(RequestId::new(2)));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn unknown_ops_are_protocol_errors() {
        let err = ServerFrame::parse(r#"{"op":"teleport"}"#).unwrap_err();
        assert!(matches!(err, StoreError::Protocol { .. }));
        assert!(ServerFrame::parse("not json").is_err());
    }
}
