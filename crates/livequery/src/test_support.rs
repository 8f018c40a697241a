//! In-memory socket connector for client tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{sink, stream};
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use objects::{
    ClientConfig, Credentials, MemorySecretStore, StaticCredentials, StoreError, TransportFailure,
};

use crate::socket::{SocketConnector, SocketMessage, SocketSink, SocketStream};
use crate::LiveQueryClient;

/// What the next connect attempt does.
pub(crate) enum Attempt {
    Fail(StoreError),
    Stall,
}

/// The server side of one accepted socket.
pub(crate) struct ServerEnd {
    from_client: mpsc::UnboundedReceiver<SocketMessage>,
    to_client: mpsc::UnboundedSender<Result<SocketMessage, StoreError>>,
}

impl ServerEnd {
    /// Next message of any kind.
    pub(crate) async fn recv(&mut self) -> SocketMessage {
        self.from_client.recv().await.expect("client socket closed")
    }

    /// Next text frame as JSON, skipping pings.
    pub(crate) async fn next_frame(&mut self) -> Value {
        loop {
            match self.recv().await {
                SocketMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
                SocketMessage::Ping(_) => continue,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    }

    pub(crate) fn send(&self, message: SocketMessage) {
        let _ = self.to_client.send(Ok(message));
    }

    pub(crate) fn send_json(&self, frame: Value) {
        self.send(SocketMessage::Text(frame.to_string()));
    }
}

/// Hands every accepted socket to the test through a channel.
pub(crate) struct MemoryConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    script: Mutex<VecDeque<Attempt>>,
    urls: Mutex<Vec<Url>>,
}

impl MemoryConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted,
            script: Mutex::new(VecDeque::new()),
            urls: Mutex::new(Vec::new()),
        });
        (connector, rx)
    }

    pub(crate) fn push(&self, attempt: Attempt) {
        self.script.lock().unwrap().push_back(attempt);
    }

    pub(crate) fn refuse_next(&self) {
        self.push(Attempt::Fail(StoreError::connection(
            TransportFailure::Connect,
            "connection refused",
        )));
    }

    /// URLs of every connect attempt, in order.
    pub(crate) fn urls(&self) -> Vec<Url> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SocketConnector for MemoryConnector {
    async fn connect(&self, url: &Url) -> Result<(SocketSink, SocketStream), StoreError> {
        self.urls.lock().unwrap().push(url.clone());
        let attempt = self.script.lock().unwrap().pop_front();
        match attempt {
            Some(Attempt::Fail(err)) => return Err(err),
            Some(Attempt::Stall) => std::future::pending::<()>().await,
            None => {}
        }

        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerEnd {
            from_client,
            to_client,
        });

        let sink = sink::unfold(client_tx, |tx, message: SocketMessage| async move {
            tx.send(message).map_err(|_| {
                StoreError::connection(TransportFailure::Interrupted, "server end dropped")
            })?;
            Ok::<_, StoreError>(tx)
        });
        let stream = stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

pub(crate) fn config() -> ClientConfig {
    ClientConfig::new(Url::parse("https://example.com/store").unwrap())
}

pub(crate) fn credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new(Credentials {
        application_id: "app".into(),
        client_key: Some("client".into()),
        ..Credentials::default()
    }))
}

pub(crate) fn client(
    config: &ClientConfig,
    connector: &Arc<MemoryConnector>,
) -> (LiveQueryClient, Arc<MemorySecretStore>) {
    let secrets = Arc::new(MemorySecretStore::new());
    let client = LiveQueryClient::new(config, connector.clone(), credentials(), secrets.as_ref())
        .unwrap();
    (client, secrets)
}
