//! Port traits implemented by infrastructure crates or supplied by the host
//! application.
//!
//! The domain sees only these traits; HTTP clients, sockets, and keychains
//! live elsewhere.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{CommandDescriptor, InstallationId, TransportOutcome};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Application identity and keys attached to outgoing requests and the
/// live-query `connect` frame. Opaque to this workspace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    /// Application identifier.
    pub application_id: String,
    /// Client key, if the deployment requires one.
    pub client_key: Option<String>,
    /// Master key; bypasses access control.
    pub master_key: Option<String>,
    /// Session token of the signed-in user.
    pub session_token: Option<String>,
    /// Installation identifier of this device.
    pub installation_id: Option<String>,
}

/// Supplies the current [`Credentials`].
///
/// Called per request so a session token change takes effect immediately.
pub trait CredentialProvider: Send + Sync {
    /// Returns the credentials to attach to the next request or frame.
    fn credentials(&self) -> Credentials;
}

/// A [`CredentialProvider`] that always returns the same value.
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    /// Wraps fixed credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Credentials {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// Secret persistence
// ---------------------------------------------------------------------------

/// Key used to cache the installation id.
pub const INSTALLATION_ID_KEY: &str = "installation_id";

/// Get/set persistence for small secrets that must survive restarts.
pub trait SecretStore: Send + Sync {
    /// Returns the stored value for `key`.
    fn get(&self, key: &str) -> Option<String>;
    /// Stores `value` under `key`.
    fn set(&self, key: &str, value: &str);
}

/// Process-local [`SecretStore`]; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_owned(), value.to_owned());
        }
    }
}

/// Returns the cached installation id, generating and caching one if absent
/// or unreadable.
pub fn installation_id(store: &dyn SecretStore) -> InstallationId {
    if let Some(existing) = store
        .get(INSTALLATION_ID_KEY)
        .and_then(|s| InstallationId::parse(&s))
    {
        return existing;
    }
    let fresh = InstallationId::new_random();
    store.set(INSTALLATION_ID_KEY, &fresh.to_string());
    tracing::debug!(installation_id = %fresh, "generated installation id");
    fresh
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// Executes one attempt of a command.
///
/// Implementations return `Ok` for any received response, whatever its
/// status, and `Err` only when no response arrived; the retry policy and error
/// mapper depend on that split.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `command` with `credentials` attached.
    async fn send(
        &self,
        command: &CommandDescriptor,
        credentials: &Credentials,
    ) -> TransportOutcome;
}
