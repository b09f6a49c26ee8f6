//! Storage layer for EntertainMe.
//!
//! A store is a redb database holding a small set of fixed tables (store
//! metadata, the version ledger, the collection catalog) plus one table per
//! registered collection. Collections hold JSON documents keyed by
//! [`RecordId`]; their shape is recorded in the catalog as a
//! [`CollectionSchema`] so that schema steps can add collections and fields
//! to a live store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Repository / Migrator                               │
//! │                         │                                    │
//! │                         ▼                                    │
//! │              ┌─────────────────────┐                        │
//! │              │     RedbStore       │  ← reads, lifecycle    │
//! │              └─────────────────────┘                        │
//! │                         │ write(|w| ...)                     │
//! │                         ▼                                    │
//! │              ┌─────────────────────┐                        │
//! │              │    StoreWriter      │  ← one write txn       │
//! │              └─────────────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod redb;
pub mod schema;

pub use self::redb::{RedbStore, StoreWriter};
pub use schema::{
    CollectionSchema, FieldDef, FieldKind, ForeignKey, OnDelete, StoreMetadata,
    STORE_FORMAT_VERSION,
};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::RecordId;

/// A typed document stored in a named collection.
///
/// Implementors serialize to a JSON object carrying an `id` field. Fields
/// the store maintains (`id`, timestamps) should be `#[serde(default)]` so
/// an entity can be built before it has been stored.
///
/// # Example
///
/// ```rust
/// use entertainme::storage::Entity;
/// use entertainme::RecordId;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Tag {
///     #[serde(default)]
///     id: RecordId,
///     name: String,
/// }
///
/// impl Entity for Tag {
///     const COLLECTION: &'static str = "tags";
///     fn id(&self) -> RecordId {
///         self.id
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned {
    /// Collection this entity lives in.
    const COLLECTION: &'static str;

    /// Identifier of this entity (`RecordId::UNASSIGNED` before insert).
    fn id(&self) -> RecordId;
}
