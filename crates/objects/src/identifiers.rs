//! Newtype identifiers.
//!
//! Every identity in the object store is represented as a distinct newtype
//! wrapping a primitive, so a [`ClassName`] can never be passed where an
//! [`ObjectId`] is expected even though both are strings on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for u64-wrapped newtypes (client-assigned counters).
// Generates: struct (Copy), new(), as_u64(), Display.
// ---------------------------------------------------------------------------
macro_rules! u64_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: server-assigned or schema names
// ---------------------------------------------------------------------------

string_id! {
    /// Name of a remote class (the type tag of a stored object), e.g. `"GameScore"`.
    ClassName
}

string_id! {
    /// Server-assigned object identifier.
    ///
    /// Absent until the first successful save; an object without one is unsaved.
    ObjectId
}

string_id! {
    /// Identifier the live-query server assigns to a socket connection in its
    /// `connected` acknowledgment.
    ClientId
}

// ---------------------------------------------------------------------------
// Identifiers: client-assigned
// ---------------------------------------------------------------------------

u64_id! {
    /// Identifies one live-query subscription within a single client instance.
    ///
    /// Assigned monotonically starting at 1; never reused by the same client.
    RequestId
}

/// Identifies this installation of the application to the remote store.
///
/// Generated once and cached through a [`crate::SecretStore`] so it survives
/// process restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(Uuid);

impl InstallationId {
    /// Generates a new random installation identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an identifier previously produced by [`InstallationId::to_string`].
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for InstallationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
