//! Stowage live-query client.
//!
//! One persistent socket carries many standing queries. The client owns the
//! socket, its connection state machine, the subscription registry, keep-alive
//! pings, and reconnection with bounded backoff.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | [`LiveQueryClient`] handle and the actor that serializes all state changes |
//! | [`state`] | [`ConnectionState`] |
//! | [`frames`] | Outgoing [`ClientFrame`]s, incoming [`ServerFrame`]s, [`LiveQuery`] |
//! | [`subscription`] | [`Subscription`] streams and [`SubscriptionEvent`]s |
//! | [`socket`] | [`SocketConnector`] port and the WebSocket [`WsConnector`] |
//! | [`backoff`] | [`ReconnectBackoff`] |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Frame decoding produces [`objects::DomainObject`]s and
//! every failure is an [`objects::StoreError`]; nothing here depends on the
//! dispatcher.

#![warn(missing_docs)]

pub mod backoff;
pub mod client;
pub mod frames;
pub mod socket;
pub mod state;
pub mod subscription;

#[cfg(test)]
mod test_support;

pub use backoff::ReconnectBackoff;
pub use client::LiveQueryClient;
pub use frames::{ClientFrame, LiveQuery, ServerFrame};
pub use socket::{SocketConnector, SocketMessage, SocketSink, SocketStream, WsConnector};
pub use state::ConnectionState;
pub use subscription::{EventKind, Subscription, SubscriptionEvent};
