//! Error types for EntertainMe.
//!
//! EntertainMe uses a hierarchical error system:
//! - `EntertainMeError` is the top-level error returned by all public APIs
//! - Specific error types (`StorageError`, `ValidationError`, `MigrationError`)
//!   provide detail
//!
//! The migration engine additionally folds errors into a
//! [`MigrationResult`](crate::MigrationResult) so callers that only want a
//! success flag and a message never have to match on these types.
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use entertainme::{Repository, RepositoryConfig, Result};
//!
//! fn example() -> Result<()> {
//!     let repo = Repository::open(RepositoryConfig::default())?;
//!     // ... operations that may fail ...
//!     repo.close()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::migration::SchemaVersion;

/// Result type alias for EntertainMe operations.
pub type Result<T> = std::result::Result<T, EntertainMeError>;

/// Top-level error enum for all EntertainMe operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum EntertainMeError {
    /// Storage layer error (I/O, corruption, transactions, collections).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Schema migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// Requested entity not found.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EntertainMeError {
    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is a migration error.
    pub fn is_migration(&self) -> bool {
        matches!(self, Self::Migration(_))
    }

    /// Returns true if this is a configuration error.
    ///
    /// Malformed, missing or unknown migration inputs count as
    /// configuration errors: they are detected before any I/O happens.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::Migration(MigrationError::MissingConfiguration)
                | Self::Migration(MigrationError::UnknownTargetVersion { .. })
        )
    }
}

/// Storage-related errors.
///
/// These errors indicate problems with the underlying storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Store file or data is corrupted.
    #[error("Store corrupted: {0}")]
    Corrupted(String),

    /// Store file is locked by another process or handle.
    #[error("Store is locked by another writer")]
    StoreLocked,

    /// Transaction failed (commit, rollback, etc.).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Redb(String),

    /// Physical store format doesn't match what this build writes.
    #[error("Store format version mismatch: expected {expected}, found {found}")]
    FormatVersionMismatch {
        /// Expected format version.
        expected: u32,
        /// Actual format version found in the store.
        found: u32,
    },

    /// Collection is not registered in the store catalog.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Collection is already registered in the store catalog.
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Field is already part of the collection schema.
    #[error("Field '{field}' already exists in collection '{collection}'")]
    FieldExists {
        /// Collection name.
        collection: String,
        /// Field name.
        field: String,
    },

    /// A foreign key points at a collection that does not exist.
    #[error("Collection '{collection}' references unknown collection '{references}'")]
    DanglingReference {
        /// Collection declaring the foreign key.
        collection: String,
        /// Referenced collection name.
        references: String,
    },

    /// Version ledger already holds a record for this section.
    #[error("Version record already exists for section '{0}'")]
    VersionRecordExists(String),

    /// Version ledger holds no record for this section.
    #[error("No version record for section '{0}'")]
    VersionRecordMissing(String),
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound(name.into())
    }
}

// Conversions from redb error types
impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Redb(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Redb(format!("Storage error: {}", err))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// Also allow direct conversion to EntertainMeError for convenience
impl From<redb::Error> for EntertainMeError {
    fn from(err: redb::Error) -> Self {
        EntertainMeError::Storage(StorageError::from(err))
    }
}

impl From<redb::DatabaseError> for EntertainMeError {
    fn from(err: redb::DatabaseError) -> Self {
        EntertainMeError::Storage(StorageError::from(err))
    }
}

impl From<redb::TransactionError> for EntertainMeError {
    fn from(err: redb::TransactionError) -> Self {
        EntertainMeError::Storage(StorageError::from(err))
    }
}

impl From<redb::CommitError> for EntertainMeError {
    fn from(err: redb::CommitError) -> Self {
        EntertainMeError::Storage(StorageError::from(err))
    }
}

impl From<redb::TableError> for EntertainMeError {
    fn from(err: redb::TableError) -> Self {
        EntertainMeError::Storage(StorageError::from(err))
    }
}

impl From<redb::StorageError> for EntertainMeError {
    fn from(err: redb::StorageError) -> Self {
        EntertainMeError::Storage(StorageError::from(err))
    }
}

impl From<bincode::Error> for EntertainMeError {
    fn from(err: bincode::Error) -> Self {
        EntertainMeError::Storage(StorageError::from(err))
    }
}

impl From<serde_json::Error> for EntertainMeError {
    fn from(err: serde_json::Error) -> Self {
        EntertainMeError::Storage(StorageError::from(err))
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },
}

impl ValidationError {
    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }
}

/// Errors raised by the migration engine.
///
/// Each variant maps onto one of the three failure classes a caller can
/// react to: configuration (nothing touched), store acquisition (nothing
/// written), and step application (ledger reflects committed steps only).
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Store location and/or target version were not supplied.
    #[error("Store location and/or target version was not supplied")]
    MissingConfiguration,

    /// Requested version is newer than any registered step.
    #[error("Unknown target version {requested} (latest known version is {latest})")]
    UnknownTargetVersion {
        /// Version the caller asked for.
        requested: SchemaVersion,
        /// Highest version in the step registry.
        latest: SchemaVersion,
    },

    /// Creating, deleting or opening the store failed.
    #[error("Failed to acquire store: {reason}")]
    StoreAcquisition {
        /// Underlying failure.
        reason: String,
    },

    /// An existing store carries no version record.
    #[error("Store has no version record for section '{0}'; reopen with hard init")]
    LedgerMissing(String),

    /// A schema step failed while being applied.
    #[error("Schema step {version} failed: {reason}")]
    StepFailed {
        /// Version of the failing step.
        version: SchemaVersion,
        /// Underlying failure.
        reason: String,
    },

    /// Step registry versions are not strictly ascending.
    #[error("Schema steps out of order: {previous} is followed by {next}")]
    UnorderedSteps {
        /// Version of the earlier step.
        previous: SchemaVersion,
        /// Version of the step that follows it.
        next: SchemaVersion,
    },
}

impl MigrationError {
    /// Creates a store acquisition error from any displayable failure.
    pub fn store_acquisition(reason: impl ToString) -> Self {
        Self::StoreAcquisition {
            reason: reason.to_string(),
        }
    }

    /// Creates a step failure error.
    pub fn step_failed(version: SchemaVersion, reason: impl ToString) -> Self {
        Self::StepFailed {
            version,
            reason: reason.to_string(),
        }
    }
}

/// Not found errors for specific entity types.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// Document with given ID not found in a collection.
    #[error("Document {id} not found in collection '{collection}'")]
    Document {
        /// Collection that was searched.
        collection: String,
        /// Missing document ID.
        id: String,
    },

    /// Named entity (type, medium, provider, profile) not found.
    #[error("{kind} not found: {name}")]
    Named {
        /// Kind of entity, e.g. "Medium".
        kind: &'static str,
        /// Name that was looked up.
        name: String,
    },
}

impl NotFoundError {
    /// Creates a document not found error.
    pub fn document(collection: impl Into<String>, id: impl ToString) -> Self {
        Self::Document {
            collection: collection.into(),
            id: id.to_string(),
        }
    }

    /// Creates a named entity not found error.
    pub fn named(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Named {
            kind,
            name: name.into(),
        }
    }
}
