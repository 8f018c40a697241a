//! The socket port and its `tokio-tungstenite` implementation.
//!
//! The client actor only sees [`SocketMessage`]s flowing through a boxed
//! sink/stream pair, so tests can substitute an in-memory connector.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use objects::{StoreError, TransportFailure};

/// Messages the client exchanges with the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    /// A JSON frame.
    Text(String),
    /// A transport-level ping with its payload.
    Ping(Vec<u8>),
    /// A transport-level pong echoing a ping payload.
    Pong(Vec<u8>),
    /// The peer is closing the socket.
    Close,
}

/// Outgoing half of a socket.
pub type SocketSink = Pin<Box<dyn Sink<SocketMessage, Error = StoreError> + Send>>;

/// Incoming half of a socket. The stream ends when the socket is gone.
pub type SocketStream = Pin<Box<dyn Stream<Item = Result<SocketMessage, StoreError>> + Send>>;

/// Opens sockets to the live-query endpoint.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    /// Connects to `url`, returning the outgoing and incoming halves.
    ///
    /// Errors are [`StoreError::Connection`] with [`TransportFailure::Connect`].
    async fn connect(&self, url: &Url) -> Result<(SocketSink, SocketStream), StoreError>;
}

/// [`SocketConnector`] over WebSockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<(SocketSink, SocketStream), StoreError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| StoreError::connection(TransportFailure::Connect, e.to_string()))?;
        tracing::debug!(%url, "websocket established");
        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(|e| StoreError::connection(TransportFailure::Interrupted, e.to_string()))
            .with(|message: SocketMessage| future::ready(Ok::<_, StoreError>(to_wire(message))));
        let stream = stream.filter_map(|item| future::ready(from_wire(item)));
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

fn to_wire(message: SocketMessage) -> Message {
    match message {
        SocketMessage::Text(text) => Message::Text(text),
        SocketMessage::Ping(payload) => Message::Ping(payload),
        SocketMessage::Pong(payload) => Message::Pong(payload),
        SocketMessage::Close => Message::Close(None),
    }
}

fn from_wire(
    item: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<SocketMessage, StoreError>> {
    let message = match item {
        Ok(message) => message,
        Err(e) => {
            return Some(Err(StoreError::connection(
                TransportFailure::Interrupted,
                e.to_string(),
            )))
        }
    };
    match message {
        Message::Text(text) => Some(Ok(SocketMessage::Text(text))),
        Message::Binary(data) => Some(
            String::from_utf8(data)
                .map(SocketMessage::Text)
                .map_err(|_| StoreError::protocol("binary live-query frame is not UTF-8")),
        ),
        Message::Ping(payload) => Some(Ok(SocketMessage::Ping(payload))),
        Message::Pong(payload) => Some(Ok(SocketMessage::Pong(payload))),
        Message::Close(_) => Some(Ok(SocketMessage::Close)),
        Message::Frame(_) => None,
    }
}
