//! Local records store.
//!
//! SQLite-backed stand-in for the host business-records system: four entity
//! tables matched by natural key, the credential configuration, and the
//! append-only operation log.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{CredentialStore, EntityStore, OperationLog, SqliteRecordStore};
pub use error::StoreError;
pub use types::{EntityKind, EntityWrite, FieldValue, LocalEntity, LogEntry, RunStatus};
