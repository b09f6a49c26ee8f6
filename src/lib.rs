//! # EntertainMe
//!
//! Personal media catalog on an embedded, versioned document store.
//!
//! EntertainMe keeps track of who owns what: profiles, entertainment types
//! (movie, music, book), mediums (DVD, CD, digital, ...), providers (Vudu,
//! Amazon, ...), which type/medium pairs make sense, and owned assets with
//! per-copy details. The store's layout is versioned and brought forward by
//! a small migration engine.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use entertainme::{Repository, RepositoryConfig};
//!
//! // Open (creating and migrating as needed) the store under the
//! // platform data directory
//! let repo = Repository::open(RepositoryConfig {
//!     auto_migrate: true,
//!     ..Default::default()
//! })?;
//!
//! for medium in repo.valid_mediums_for_type("Book")? {
//!     println!("{}", medium.description);
//! }
//!
//! repo.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Schema version
//!
//! Every store carries a schema version (`NN.NN`, compared numerically) in
//! its version ledger. Each registered schema step introduces one version.
//!
//! ### Init and migrate
//!
//! A new store is **initialized** at a target version: the ledger is set
//! and every step up to the target runs in one transaction. An existing
//! store is **migrated**: every step newer than the ledger and not newer
//! than the target runs, each in its own transaction together with the
//! ledger update.
//!
//! ### Store location
//!
//! A store is either a file ([`StoreLocation::Path`]) or lives in memory
//! ([`StoreLocation::InMemory`], parsed from `":memory:"`). An in-memory
//! store is always initialized fresh.
//!
//! ## Logging
//!
//! EntertainMe emits [`tracing`](https://docs.rs/tracing) events and spans
//! but never installs a subscriber; applications choose their own.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod db;
mod error;
mod types;

pub mod catalog;
pub mod migration;
pub mod storage;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main catalog interface
pub use db::Repository;

// Configuration
pub use config::{
    MigratorConfig, RepositoryConfig, StoreLocation, DEFAULT_STORE_FILE, IN_MEMORY_MARKER,
};

// Error handling
pub use error::{
    EntertainMeError, MigrationError, NotFoundError, Result, StorageError, ValidationError,
};

// Core types
pub use types::{RecordId, StoreId, Timestamp};

// Domain types
pub use catalog::{
    Asset, AssetData, BaseEntity, EntertainmentType, Medium, Profile, Provider, TypeMedium,
    ValidCombination,
};

// Migration
pub use migration::{
    MigrationOutcome, MigrationResult, Migrator, SchemaStep, SchemaVersion, StepRegistry,
    DATABASE_SECTION, LATEST_VERSION,
};

// Storage (for advanced users)
pub use storage::{Entity, RedbStore, StoreMetadata};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common EntertainMe usage.
///
/// ```rust
/// use entertainme::prelude::*;
/// ```
pub mod prelude {
    pub use crate::catalog::{Asset, AssetData, EntertainmentType, Medium, Profile, Provider};
    pub use crate::config::{RepositoryConfig, StoreLocation};
    pub use crate::db::Repository;
    pub use crate::error::{EntertainMeError, Result};
    pub use crate::migration::{MigrationResult, Migrator, SchemaVersion};
    pub use crate::types::{RecordId, Timestamp};
}
