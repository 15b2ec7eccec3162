//! Error taxonomy for the storefront persistence layer.
//!
//! Storage-tier failures during writes are absorbed by the sync engine
//! (degraded mode) and never reach callers unless every tier fails.
//! Reconciliation, validation, and import failures always surface so the
//! admin UI can report them.

use thiserror::Error;

/// Errors produced by the persistence and order layers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The embedded database cannot be provided in this runtime.
    /// Recoverable: the engine runs on the local store alone for the
    /// rest of the session.
    #[error("embedded database unavailable: {0}")]
    UnsupportedStorage(String),

    /// A store read failed. Transient; callers fall back to the other
    /// tier where one exists.
    #[error("storage read failed: {0}")]
    ReadFailure(String),

    /// A store write failed on every available tier.
    #[error("storage write failed: {0}")]
    WriteFailure(String),

    /// The backup slot could not be written.
    #[error("backup write failed: {0}")]
    BackupWriteFailure(String),

    /// Reconciliation could not complete. Surfaced, never retried
    /// automatically; the periodic refresh is the only retry path.
    #[error("sync failed: {0}")]
    SyncFailure(String),

    /// Bad input to order creation.
    #[error("validation failed: {0}")]
    ValidationError(String),

    /// An import document did not match the expected format.
    #[error("invalid import format: {0}")]
    InvalidFormat(String),

    /// A status update referenced an unknown order id.
    #[error("order not found: {0}")]
    NotFound(String),
}
