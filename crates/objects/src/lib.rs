//! Core object domain for Stowage.
//!
//! This crate contains the object model, the dependency-ordered encoder, the
//! error taxonomy, the retry policy, and the port traits the dispatcher and
//! live-query client are built against. Infrastructure crates implement the
//! ports; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no I/O. It
//! defines *what* is sent and how outcomes are judged; `dispatch` and
//! `livequery` define *how* bytes move.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ClassName`, `ObjectId`, `RequestId`, ...) |
//! | [`types`] | Structured values (`Timestamp`, `Pointer`, `RemoteFile`, `GeoPoint`) |
//! | [`value`] | Field values and field operations |
//! | [`object`] | `DomainObject` with dirty tracking and server merge |
//! | [`graph`] | Arena owning the objects and attachments of one save |
//! | [`encoder`] | Graph walk producing ordered save steps |
//! | [`command`] | Method, command descriptor, raw transport outcome |
//! | [`error_map`] | Raw outcome to `StoreError` |
//! | [`batch`] | Splitting work into bounded segments |
//! | [`retry`] | Method-aware retry decisions |
//! | [`config`] | Client configuration |
//! | [`ports`] | Transport, credential, and secret-store traits |
//! | [`errors`] | `StoreError` and retry-decision types |

pub mod batch;
pub mod command;
pub mod config;
pub mod encoder;
pub mod error_map;
pub mod errors;
pub mod graph;
pub mod identifiers;
pub mod object;
pub mod ports;
pub mod retry;
pub mod types;
pub mod value;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use batch::split;
pub use command::{
    CommandDescriptor, Method, RawResponse, RequestBody, TransportError, TransportOutcome,
};
pub use config::{ClientConfig, ConfigError, LiveQueryConfig, DEFAULT_BATCH_LIMIT};
pub use encoder::{
    pending_references, resolve_body, DeferredField, Encoded, Encoder, SaveStep, SavedSet,
    SkipPolicy, WireBody, WireValue,
};
pub use error_map::{map_error_body, map_error_value, map_outcome, map_response, ServerErrorBody};
pub use errors::{RetryDecision, StoreError, TransportFailure};
pub use graph::{FileAttachment, FileKey, ObjectGraph, ObjectKey};
pub use identifiers::{ClassName, ClientId, InstallationId, ObjectId, RequestId};
pub use object::{DomainObject, ObjectCodec};
pub use ports::{
    installation_id, CredentialProvider, Credentials, HttpTransport, MemorySecretStore,
    SecretStore, StaticCredentials, INSTALLATION_ID_KEY,
};
pub use retry::RetryPolicy;
pub use types::{GeoPoint, Pointer, RemoteFile, Timestamp};
pub use value::{FieldOperation, FieldValue};
