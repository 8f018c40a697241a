//! Connection state of the live-query client.

use serde::Serialize;

/// Where the client's single socket stands.
///
/// `SocketEstablished` means the transport is up; `Connected` means the
/// server has also acknowledged the `connect` frame and assigned a client id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket. Initial state, and the state after `close()`.
    #[default]
    Disconnected,
    /// A socket connect is in flight.
    Connecting,
    /// The socket is open; the protocol handshake is pending.
    SocketEstablished,
    /// The handshake completed.
    Connected,
}

impl ConnectionState {
    /// `true` once the transport-level socket exists.
    pub fn has_socket(self) -> bool {
        matches!(self, Self::SocketEstablished | Self::Connected)
    }

    /// `true` while a socket exists or is being opened.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::SocketEstablished => "socket_established",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}
