//! The live-query client: a cloneable handle in front of a single actor task.
//!
//! Every state transition and registry change happens inside the actor, which
//! serializes caller commands, socket events, and timers through one
//! `select!` loop. The handle only sends commands and reads the published
//! [`ConnectionState`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use objects::{
    installation_id, ClientConfig, ClientId, ConfigError, CredentialProvider, DomainObject,
    InstallationId, LiveQueryConfig, RequestId, SecretStore, StoreError, TransportFailure,
};

use crate::backoff::ReconnectBackoff;
use crate::frames::{ClientFrame, LiveQuery, ServerFrame};
use crate::socket::{SocketConnector, SocketMessage, SocketSink, SocketStream};
use crate::state::ConnectionState;
use crate::subscription::{EventKind, Subscription, SubscriptionEvent};

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Command {
    Open(Reply<Result<(), StoreError>>),
    Close(Reply<()>),
    Subscribe {
        id: RequestId,
        query: LiveQuery,
        events: mpsc::UnboundedSender<SubscriptionEvent>,
    },
    Update {
        id: RequestId,
        query: LiveQuery,
    },
    Unsubscribe(RequestId),
    Ping(Reply<Result<(), StoreError>>),
    Shutdown(Reply<()>),
}

/// Socket activity reported to the actor, tagged with the connection
/// generation it belongs to.
enum SocketEvent {
    Opened {
        generation: u64,
        result: Result<(SocketSink, SocketStream), StoreError>,
    },
    Received {
        generation: u64,
        message: SocketMessage,
    },
    Lost {
        generation: u64,
        reason: StoreError,
    },
}

/// Handle to a live-query connection and its subscriptions.
///
/// Clones share the same connection. The connection is torn down by
/// [`LiveQueryClient::shutdown`] or when the last handle is dropped.
#[derive(Debug, Clone)]
pub struct LiveQueryClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    next_request_id: Arc<AtomicU64>,
    installation_id: InstallationId,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open(_) => "Open",
            Self::Close(_) => "Close",
            Self::Subscribe { .. } => "Subscribe",
            Self::Update { .. } => "Update",
            Self::Unsubscribe(_) => "Unsubscribe",
            Self::Ping(_) => "Ping",
            Self::Shutdown(_) => "Shutdown",
        };
        f.write_str(name)
    }
}

impl LiveQueryClient {
    /// Creates a disconnected client and starts its actor task.
    ///
    /// The installation id is read from `secrets`, or generated and stored
    /// there on first use. Must be called within a Tokio runtime.
    pub fn new(
        config: &ClientConfig,
        connector: Arc<dyn SocketConnector>,
        credentials: Arc<dyn CredentialProvider>,
        secrets: &dyn SecretStore,
    ) -> Result<Self, ConfigError> {
        let url = config.live_query_url()?;
        let installation_id = installation_id(secrets);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let actor = Actor {
            config: config.live,
            url,
            connector,
            credentials,
            installation_id,
            state: state_tx,
            events: events_tx,
            generation: 0,
            sink: None,
            reader: None,
            connecting: None,
            client_id: None,
            subscriptions: BTreeMap::new(),
            open_waiters: Vec::new(),
            pings: Vec::new(),
            next_ping_token: 0,
            next_keep_alive: None,
            reconnect_at: None,
            attempts: 0,
            backoff: ReconnectBackoff::new(config.live.max_reconnect_delay()),
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        Ok(Self {
            commands: commands_tx,
            state: state_rx,
            next_request_id: Arc::new(AtomicU64::new(1)),
            installation_id,
        })
    }

    /// The installation id sent in the `connect` frame.
    pub fn installation_id(&self) -> InstallationId {
        self.installation_id
    }

    /// Opens the socket.
    ///
    /// Resolves once the socket is established; the protocol handshake and
    /// re-sending of subscriptions continue in the background. Resolves
    /// immediately if a socket already exists, and joins the pending attempt
    /// if one is in flight.
    pub async fn open(&self) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Open(reply))?;
        rx.await.unwrap_or(Err(StoreError::Closed))
    }

    /// Closes the socket without reconnecting. Subscriptions are kept and
    /// re-sent by the next [`LiveQueryClient::open`].
    ///
    /// Pending opens and pings fail with [`StoreError::Closed`]. Closing an
    /// already closed client does nothing.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Close(reply)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Tears the client down: closes the socket, ends every subscription
    /// stream, and stops the actor. Later calls fail with
    /// [`StoreError::Closed`].
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Shutdown(reply)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Registers `query` and returns its event stream.
    ///
    /// The subscribe frame goes out immediately when connected, and otherwise
    /// as soon as the connection (or any later reconnection) completes.
    pub fn subscribe(&self, query: LiveQuery) -> Result<Subscription, StoreError> {
        let id = RequestId::new(self.next_request_id.fetch_add(1, Ordering::Relaxed));
        let (events, rx) = mpsc::unbounded_channel();
        self.send(Command::Subscribe { id, query, events })?;
        Ok(Subscription::new(id, rx, self.commands.downgrade()))
    }

    /// Registers `query` and calls `handler` with each of its events.
    ///
    /// The handler runs on its own task, never on the client's.
    pub fn subscribe_with<F>(
        &self,
        query: LiveQuery,
        mut handler: F,
    ) -> Result<RequestId, StoreError>
    where
        F: FnMut(SubscriptionEvent) + Send + 'static,
    {
        let mut subscription = self.subscribe(query)?;
        let id = subscription.id();
        tokio::spawn(async move {
            while let Some(event) = subscription.next_event().await {
                handler(event);
            }
        });
        Ok(id)
    }

    /// Replaces the query of subscription `id`. Unknown ids are ignored.
    pub fn update(&self, id: RequestId, query: LiveQuery) -> Result<(), StoreError> {
        self.send(Command::Update { id, query })
    }

    /// Removes subscription `id` and ends its stream. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: RequestId) {
        let _ = self.send(Command::Unsubscribe(id));
    }

    /// Pings the server and waits for the pong.
    ///
    /// Fails with [`StoreError::Connection`] when no socket is established,
    /// and with [`StoreError::Timeout`] when the pong does not arrive within
    /// the configured ping timeout.
    pub async fn send_ping(&self) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Ping(reply))?;
        rx.await.unwrap_or(Err(StoreError::Closed))
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn send(&self, command: Command) -> Result<(), StoreError> {
        self.commands.send(command).map_err(|_| StoreError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct Registered {
    query: LiveQuery,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
}

struct PendingPing {
    token: Vec<u8>,
    deadline: Instant,
    /// `None` for keep-alive pings.
    reply: Option<Reply<Result<(), StoreError>>>,
}

struct Actor {
    config: LiveQueryConfig,
    url: Url,
    connector: Arc<dyn SocketConnector>,
    credentials: Arc<dyn CredentialProvider>,
    installation_id: InstallationId,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<SocketEvent>,
    /// Bumped whenever a socket or connect attempt is abandoned, so events
    /// from it are ignored.
    generation: u64,
    sink: Option<SocketSink>,
    reader: Option<JoinHandle<()>>,
    connecting: Option<JoinHandle<()>>,
    client_id: Option<ClientId>,
    subscriptions: BTreeMap<RequestId, Registered>,
    open_waiters: Vec<Reply<Result<(), StoreError>>>,
    pings: Vec<PendingPing>,
    next_ping_token: u64,
    next_keep_alive: Option<Instant>,
    reconnect_at: Option<Instant>,
    attempts: u32,
    backoff: ReconnectBackoff,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<SocketEvent>,
    ) {
        loop {
            let wake = self.next_wake();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        commands.close();
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_socket_event(event).await,
                () = sleep_until(wake) => self.handle_timers().await,
            }
        }
        tracing::debug!("live-query actor stopped");
    }

    fn next_wake(&self) -> Option<Instant> {
        self.pings
            .iter()
            .map(|ping| ping.deadline)
            .chain(self.next_keep_alive)
            .chain(self.reconnect_at)
            .min()
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            tracing::debug!(state = %next, "live-query state changed");
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open(reply) => match self.current_state() {
                ConnectionState::SocketEstablished | ConnectionState::Connected => {
                    let _ = reply.send(Ok(()));
                }
                ConnectionState::Connecting => self.open_waiters.push(reply),
                ConnectionState::Disconnected => {
                    self.open_waiters.push(reply);
                    self.reconnect_at = None;
                    self.attempts = 0;
                    self.begin_connect();
                }
            },
            Command::Close(reply) => {
                self.close_socket().await;
                let _ = reply.send(());
            }
            Command::Subscribe { id, query, events } => {
                let frame = ClientFrame::Subscribe {
                    request_id: id,
                    query: query.clone(),
                    session_token: self.credentials.credentials().session_token,
                };
                self.subscriptions.insert(id, Registered { query, events });
                tracing::debug!(request_id = %id, "subscription registered");
                if self.current_state() == ConnectionState::Connected {
                    self.send_frame(&frame).await;
                }
            }
            Command::Update { id, query } => {
                let Some(entry) = self.subscriptions.get_mut(&id) else {
                    tracing::debug!(request_id = %id, "update for unknown subscription ignored");
                    return;
                };
                entry.query = query.clone();
                if self.current_state() == ConnectionState::Connected {
                    let frame = ClientFrame::Update {
                        request_id: id,
                        query,
                        session_token: self.credentials.credentials().session_token,
                    };
                    self.send_frame(&frame).await;
                }
            }
            Command::Unsubscribe(id) => self.remove_subscription(id).await,
            Command::Ping(reply) => {
                if !self.current_state().has_socket() {
                    let _ = reply.send(Err(StoreError::connection(
                        TransportFailure::Connect,
                        "socket not established",
                    )));
                    return;
                }
                self.send_ping(Some(reply)).await;
            }
            Command::Shutdown(_) => {}
        }
    }

    async fn remove_subscription(&mut self, id: RequestId) {
        if self.subscriptions.remove(&id).is_none() {
            return;
        }
        tracing::debug!(request_id = %id, "subscription removed");
        if self.current_state() == ConnectionState::Connected {
            self.send_frame(&ClientFrame::Unsubscribe { request_id: id }).await;
        }
    }

    async fn send_ping(&mut self, reply: Option<Reply<Result<(), StoreError>>>) {
        self.next_ping_token += 1;
        let token = self.next_ping_token.to_be_bytes().to_vec();
        let Some(sink) = self.sink.as_mut() else {
            if let Some(reply) = reply {
                let _ = reply.send(Err(StoreError::connection(
                    TransportFailure::Connect,
                    "socket not established",
                )));
            }
            return;
        };
        match sink.send(SocketMessage::Ping(token.clone())).await {
            Ok(()) => self.pings.push(PendingPing {
                token,
                deadline: Instant::now() + self.config.ping_timeout(),
                reply,
            }),
            Err(err) => {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err.clone()));
                }
                self.connection_lost(err);
            }
        }
    }

    /// Writes `frame`; a failed write counts as a lost connection.
    async fn send_frame(&mut self, frame: &ClientFrame) -> bool {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "cannot encode live-query frame");
                return false;
            }
        };
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        match sink.send(SocketMessage::Text(text)).await {
            Ok(()) => true,
            Err(err) => {
                self.connection_lost(err);
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    fn begin_connect(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        self.set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.url, attempt = self.attempts, "connecting live-query socket");

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let timeout = self.config.connect_timeout();
        let events = self.events.clone();
        self.connecting = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::timeout("connect")),
            };
            let _ = events.send(SocketEvent::Opened { generation, result });
        }));
    }

    async fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened { generation, result } if generation == self.generation => {
                self.connecting = None;
                match result {
                    Ok((sink, stream)) => self.established(sink, stream).await,
                    Err(err) => {
                        tracing::warn!(error = %err, "live-query connect failed");
                        self.set_state(ConnectionState::Disconnected);
                        for waiter in self.open_waiters.drain(..) {
                            let _ = waiter.send(Err(err.clone()));
                        }
                        if self.config.auto_reconnect {
                            self.schedule_reconnect();
                        }
                    }
                }
            }
            SocketEvent::Received {
                generation,
                message,
            } if generation == self.generation => self.handle_message(message).await,
            SocketEvent::Lost { generation, reason } if generation == self.generation => {
                self.connection_lost(reason);
            }
            _ => tracing::trace!("stale socket event ignored"),
        }
    }

    async fn established(&mut self, sink: SocketSink, stream: SocketStream) {
        self.sink = Some(sink);
        self.reader = Some(spawn_reader(self.generation, stream, self.events.clone()));
        self.set_state(ConnectionState::SocketEstablished);
        for waiter in self.open_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        let interval = self.config.ping_interval();
        self.next_keep_alive = (!interval.is_zero()).then(|| Instant::now() + interval);

        let frame = ClientFrame::connect(self.credentials.credentials(), self.installation_id);
        self.send_frame(&frame).await;
    }

    fn schedule_reconnect(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.backoff.delay(self.attempts);
        tracing::info!(
            attempt = self.attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "live-query reconnect scheduled"
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    /// Drops the socket and any in-flight connect, failing pending pings with
    /// `reason`.
    fn teardown(&mut self, reason: &StoreError) {
        self.generation += 1;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(connecting) = self.connecting.take() {
            connecting.abort();
        }
        self.sink = None;
        self.client_id = None;
        self.next_keep_alive = None;
        for ping in self.pings.drain(..) {
            if let Some(reply) = ping.reply {
                let _ = reply.send(Err(reason.clone()));
            }
        }
    }

    /// Unexpected loss of the socket: disconnect and, if enabled, reconnect.
    fn connection_lost(&mut self, reason: StoreError) {
        tracing::warn!(error = %reason, "live-query connection lost");
        self.teardown(&reason);
        self.set_state(ConnectionState::Disconnected);
        if self.config.auto_reconnect {
            self.schedule_reconnect();
        }
    }

    async fn close_socket(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.send(SocketMessage::Close).await;
        }
        self.teardown(&StoreError::Closed);
        self.reconnect_at = None;
        for waiter in self.open_waiters.drain(..) {
            let _ = waiter.send(Err(StoreError::Closed));
        }
        if self.current_state().is_active() {
            tracing::info!("live-query client closed");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn shutdown(&mut self) {
        self.close_socket().await;
        self.subscriptions.clear();
        tracing::info!("live-query client shut down");
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    async fn handle_timers(&mut self) {
        let now = Instant::now();

        let mut keep_alive_expired = false;
        let mut index = 0;
        while index < self.pings.len() {
            if self.pings[index].deadline > now {
                index += 1;
                continue;
            }
            let ping = self.pings.remove(index);
            match ping.reply {
                Some(reply) => {
                    let _ = reply.send(Err(StoreError::timeout("ping")));
                }
                None => keep_alive_expired = true,
            }
        }
        if keep_alive_expired {
            self.connection_lost(StoreError::timeout("keep-alive"));
            return;
        }

        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            if self.current_state() == ConnectionState::Disconnected {
                self.begin_connect();
            }
        }

        if let Some(at) = self.next_keep_alive.filter(|at| *at <= now) {
            self.next_keep_alive = Some(at + self.config.ping_interval());
            tracing::trace!("sending keep-alive ping");
            self.send_ping(None).await;
        }
    }

    // -----------------------------------------------------------------------
    // Incoming frames
    // -----------------------------------------------------------------------

    async fn handle_message(&mut self, message: SocketMessage) {
        match message {
            SocketMessage::Text(text) => match ServerFrame::parse(&text) {
                Ok(frame) => self.handle_frame(frame).await,
                Err(err) => self.connection_lost(err),
            },
            SocketMessage::Pong(payload) => {
                if let Some(index) = self.pings.iter().position(|ping| ping.token == payload) {
                    if let Some(reply) = self.pings.remove(index).reply {
                        let _ = reply.send(Ok(()));
                    }
                }
            }
            SocketMessage::Ping(_) => {}
            SocketMessage::Close => self.connection_lost(StoreError::connection(
                TransportFailure::Interrupted,
                "server closed the socket",
            )),
        }
    }

    async fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Connected { client_id } => {
                tracing::info!(%client_id, "live-query connected");
                self.client_id = Some(client_id);
                self.attempts = 0;
                self.set_state(ConnectionState::Connected);
                self.resubscribe().await;
            }
            ServerFrame::Subscribed { request_id } => {
                self.deliver(request_id, SubscriptionEvent::Subscribed).await;
            }
            ServerFrame::Unsubscribed { request_id } => {
                tracing::debug!(%request_id, "server confirmed unsubscribe");
            }
            ServerFrame::Create { request_id, object } => {
                self.deliver_object(request_id, EventKind::Create, &object).await;
            }
            ServerFrame::Update { request_id, object } => {
                self.deliver_object(request_id, EventKind::Update, &object).await;
            }
            ServerFrame::Delete { request_id, object } => {
                self.deliver_object(request_id, EventKind::Delete, &object).await;
            }
            ServerFrame::Enter { request_id, object } => {
                self.deliver_object(request_id, EventKind::Enter, &object).await;
            }
            ServerFrame::Leave { request_id, object } => {
                self.deliver_object(request_id, EventKind::Leave, &object).await;
            }
            ServerFrame::Error {
                code,
                error,
                request_id: Some(request_id),
                ..
            } => {
                let err = StoreError::Server {
                    code,
                    message: error,
                };
                self.deliver(request_id, SubscriptionEvent::Error(err)).await;
            }
            ServerFrame::Error {
                code,
                error,
                reconnect,
                request_id: None,
            } => {
                let err = StoreError::Server {
                    code,
                    message: error,
                };
                if reconnect {
                    self.connection_lost(err);
                } else {
                    tracing::error!(error = %err, "live-query server refused the connection");
                    self.teardown(&err);
                    self.reconnect_at = None;
                    self.set_state(ConnectionState::Disconnected);
                }
            }
            ServerFrame::Redirect { url } => match Url::parse(&url) {
                Ok(url) => {
                    tracing::info!(%url, "live-query redirected");
                    self.teardown(&StoreError::connection(
                        TransportFailure::Interrupted,
                        "redirected",
                    ));
                    self.url = url;
                    self.reconnect_at = None;
                    self.set_state(ConnectionState::Disconnected);
                    self.begin_connect();
                }
                Err(e) => {
                    self.connection_lost(StoreError::protocol(format!("bad redirect url: {e}")));
                }
            },
        }
    }

    async fn resubscribe(&mut self) {
        // Handles dropped while the actor was busy may not have reported yet.
        self.subscriptions.retain(|_, entry| !entry.events.is_closed());
        let session_token = self.credentials.credentials().session_token;
        let frames: Vec<ClientFrame> = self
            .subscriptions
            .iter()
            .map(|(id, entry)| ClientFrame::Subscribe {
                request_id: *id,
                query: entry.query.clone(),
                session_token: session_token.clone(),
            })
            .collect();
        if !frames.is_empty() {
            tracing::debug!(count = frames.len(), "sending subscriptions");
        }
        for frame in &frames {
            if !self.send_frame(frame).await {
                break;
            }
        }
    }

    async fn deliver_object(
        &mut self,
        id: RequestId,
        kind: EventKind,
        object: &serde_json::Value,
    ) {
        let event = match DomainObject::from_json(object) {
            Ok(object) => SubscriptionEvent::Event { kind, object },
            Err(err) => SubscriptionEvent::Error(err),
        };
        self.deliver(id, event).await;
    }

    async fn deliver(&mut self, id: RequestId, event: SubscriptionEvent) {
        let Some(entry) = self.subscriptions.get(&id) else {
            tracing::trace!(request_id = %id, "event for unknown subscription dropped");
            return;
        };
        if entry.events.send(event).is_err() {
            // The handle was dropped.
            self.remove_subscription(id).await;
        }
    }
}

fn spawn_reader(
    generation: u64,
    mut stream: SocketStream,
    events: mpsc::UnboundedSender<SocketEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = loop {
            match stream.next().await {
                Some(Ok(message)) => {
                    if events
                        .send(SocketEvent::Received {
                            generation,
                            message,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                Some(Err(err)) => break err,
                None => {
                    break StoreError::connection(TransportFailure::Interrupted, "socket closed")
                }
            }
        };
        let _ = events.send(SocketEvent::Lost { generation, reason });
    })
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests;
