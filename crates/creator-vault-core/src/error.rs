//! # Error Module
//!
//! The single error type shared by every core module.

use thiserror::Error;

/// Errors produced by the core crate.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Input failed validation (malformed address, bad pattern, empty field).
    #[error("invalid input: {0}")]
    Validation(String),

    /// A record looked up by key does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The wallet already has a pending creator-access request.
    #[error("wallet {wallet} already has pending request #{request_id}")]
    PendingRequestExists { wallet: String, request_id: u64 },

    /// The wallet is already on the creator allowlist.
    #[error("wallet {0} is already allowlisted")]
    AlreadyAllowlisted(String),

    /// A status transition was requested from a non-pending state.
    #[error("request #{id} is {status}, expected pending")]
    InvalidTransition { id: u64, status: String },

    /// A record with the same unique key already exists.
    #[error("{0} already exists")]
    Conflict(String),

    /// Token failed MAC verification, decoding, or expired.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Record (de)serialization failed.
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),

    /// redb failed to open or create the database.
    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// redb failed to begin a transaction.
    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// redb failed to open a table.
    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    /// redb failed a storage operation.
    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    /// redb failed to commit.
    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

impl VaultError {
    /// Shorthand for a [`VaultError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a [`VaultError::NotFound`].
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// True for errors caused by the underlying database rather than input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Codec(_)
                | Self::Database(_)
                | Self::Transaction(_)
                | Self::Table(_)
                | Self::Storage(_)
                | Self::Commit(_)
        )
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, VaultError>;
