//! Scripted transport shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use objects::{
    ClientConfig, CommandDescriptor, Credentials, HttpTransport, RawResponse, RetryPolicy,
    StaticCredentials, TransportError, TransportFailure, TransportOutcome,
};

use crate::Dispatcher;

/// Replays queued outcomes in order and records every request it sees.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    outcomes: Mutex<VecDeque<TransportOutcome>>,
    requests: Mutex<Vec<CommandDescriptor>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push(&self, outcome: TransportOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn push_json(&self, status: u16, body: Value) {
        self.push(Ok(RawResponse::new(status, body.to_string())));
    }

    pub(crate) fn push_failure(&self, failure: TransportFailure) {
        self.push(Err(TransportError::new(failure, "scripted failure")));
    }

    pub(crate) fn requests(&self) -> Vec<CommandDescriptor> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        command: &CommandDescriptor,
        _credentials: &Credentials,
    ) -> TransportOutcome {
        self.requests.lock().unwrap().push(command.clone());
        self.outcomes.lock().unwrap().pop_front().unwrap_or_else(|| {
            let body = json!({"code": 1, "error": "script exhausted"});
            Ok(RawResponse::new(500, body.to_string()))
        })
    }
}

pub(crate) fn config() -> ClientConfig {
    let mut config = ClientConfig::new(Url::parse("https://example.com/store").unwrap());
    config.retry = RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 100,
        max_delay_ms: 1_000,
    };
    config
}

pub(crate) fn dispatcher(transport: &Arc<ScriptedTransport>) -> Dispatcher {
    dispatcher_with(transport, config())
}

pub(crate) fn dispatcher_with(
    transport: &Arc<ScriptedTransport>,
    config: ClientConfig,
) -> Dispatcher {
    Dispatcher::new(
        &config,
        transport.clone(),
        Arc::new(StaticCredentials::new(Credentials {
            application_id: "app".into(),
            ..Credentials::default()
        })),
    )
}
