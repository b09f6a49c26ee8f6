//! Store layout, collection schemas and format versioning.
//!
//! This module defines the table structure for the redb storage engine.
//! Fixed tables are compile-time constants; collection tables are derived
//! from the collection name at runtime.
//!
//! # Format Versioning
//!
//! Two versions live in a store and they must not be confused:
//!
//! - [`STORE_FORMAT_VERSION`] describes the physical layout below (which
//!   tables exist, how values are encoded). It is checked on every open and
//!   a mismatch refuses the store.
//! - The schema version in the `versions` ledger describes which schema
//!   steps have run. It is owned by the migration engine.
//!
//! # Table Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ METADATA_TABLE ("metadata")                                  │
//! │   Key: &str        Value: &[u8] (bincode StoreMetadata)      │
//! │   Entries: "store_metadata" -> StoreMetadata                 │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ VERSIONS_TABLE ("versions")                                  │
//! │   Key: &str (section)   Value: &[u8] (bincode VersionRecord) │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ CATALOG_TABLE ("collections")                                │
//! │   Key: &str (name)  Value: &[u8] (bincode CollectionSchema)  │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ "collection.<name>" (one per registered collection)          │
//! │   Key: u64 (RecordId)   Value: &[u8] (JSON object document)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::types::{StoreId, Timestamp};

/// Current physical store format.
///
/// Increment this when the table layout or value encoding changes.
/// The store will refuse to open if versions don't match.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Name of the identity field every document carries.
pub const ID_FIELD: &str = "id";

/// Prefix that keeps collection tables apart from the fixed tables.
const COLLECTION_TABLE_PREFIX: &str = "collection.";

// ============================================================================
// Table Definitions
// ============================================================================

/// Metadata table for store-level information.
pub const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Version ledger table.
///
/// Key: section name (e.g. "database")
/// Value: bincode-serialized VersionRecord
pub const VERSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("versions");

/// Catalog of registered collections.
///
/// Key: collection name
/// Value: bincode-serialized CollectionSchema
pub const CATALOG_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("collections");

/// Returns the redb table name backing a collection.
#[inline]
pub fn collection_table_name(collection: &str) -> String {
    format!("{}{}", COLLECTION_TABLE_PREFIX, collection)
}

/// Builds the table definition for a collection table name.
///
/// Takes the already-prefixed name from [`collection_table_name`] since the
/// definition borrows it.
#[inline]
pub fn collection_table(table_name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(table_name)
}

// ============================================================================
// Collection Schemas
// ============================================================================

/// Kind of value a field holds.
///
/// `CreatedAt` and `UpdatedAt` fields are maintained by the store: the
/// first is stamped once on insert, the second on every insert and update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Identity key, assigned by the store.
    Id,
    /// UTF-8 text.
    Text,
    /// Signed integer.
    Integer,
    /// Boolean flag.
    Boolean,
    /// Identifier of a document in another collection.
    Reference,
    /// Creation time, stamped on insert.
    CreatedAt,
    /// Modification time, stamped on insert and update.
    UpdatedAt,
}

impl FieldKind {
    /// Returns true if the store writes this field itself.
    pub fn is_managed(&self) -> bool {
        matches!(self, Self::Id | Self::CreatedAt | Self::UpdatedAt)
    }
}

/// One field of a collection schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name as it appears in stored documents.
    pub name: String,
    /// Value kind.
    pub kind: FieldKind,
}

impl FieldDef {
    /// Creates a field definition.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// The identity field every collection starts with.
    pub fn id() -> Self {
        Self::new(ID_FIELD, FieldKind::Id)
    }

    /// A text field.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    /// An integer field.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// A boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// A reference to a document in another collection.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Reference)
    }

    /// The standard `created_at` field.
    pub fn created_at() -> Self {
        Self::new("created_at", FieldKind::CreatedAt)
    }

    /// The standard `updated_at` field.
    pub fn updated_at() -> Self {
        Self::new("updated_at", FieldKind::UpdatedAt)
    }
}

/// What happens to referencing documents when the referenced one is deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnDelete {
    /// Referencing documents are deleted too.
    Cascade,
    /// Referencing documents are left as they are.
    #[default]
    NoAction,
}

/// A foreign-key relationship from a field to another collection's id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Field in this collection holding the referenced id.
    pub field: String,
    /// Referenced collection.
    pub references: String,
    /// Delete behaviour.
    pub on_delete: OnDelete,
}

impl ForeignKey {
    /// Creates a cascading foreign key.
    pub fn cascade(field: impl Into<String>, references: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            references: references.into(),
            on_delete: OnDelete::Cascade,
        }
    }
}

/// Registered shape of a collection.
///
/// Documents are JSON objects and are not validated against the field list
/// on write; the schema drives identity assignment, timestamp stamping,
/// field backfill and cascading deletes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Fields in declaration order, starting with the identity field.
    pub fields: Vec<FieldDef>,
    /// Outgoing foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
}

impl CollectionSchema {
    /// Creates a schema holding only the identity field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![FieldDef::id()],
            foreign_keys: Vec::new(),
        }
    }

    /// Adds a field (builder style).
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds the standard `created_at` and `updated_at` fields.
    pub fn timestamps(self) -> Self {
        self.field(FieldDef::created_at())
            .field(FieldDef::updated_at())
    }

    /// Adds a foreign key (builder style).
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Looks up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true if the schema declares the field.
    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    /// Fields of the given kind.
    pub fn fields_of_kind(&self, kind: FieldKind) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(move |f| f.kind == kind)
    }
}

// ============================================================================
// Store Metadata
// ============================================================================

/// Store metadata stored in the metadata table.
///
/// This is serialized with bincode and stored under the key "store_metadata".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Physical format version for compatibility checking.
    pub format_version: u32,

    /// Identity of this store, assigned on creation.
    pub store_id: StoreId,

    /// Timestamp when the store was created.
    pub created_at: Timestamp,

    /// Last time the store was opened (updated on each open).
    pub last_opened_at: Timestamp,
}

impl StoreMetadata {
    /// Creates new metadata for a fresh store.
    pub fn new() -> Self {
        let now = Timestamp::now();
        Self {
            format_version: STORE_FORMAT_VERSION,
            store_id: StoreId::new(),
            created_at: now,
            last_opened_at: now,
        }
    }

    /// Updates the last_opened_at timestamp.
    pub fn touch(&mut self) {
        self.last_opened_at = Timestamp::now();
    }

    /// Checks if this metadata matches the current physical format.
    pub fn is_compatible(&self) -> bool {
        self.format_version == STORE_FORMAT_VERSION
    }
}

impl Default for StoreMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_version() {
        assert_eq!(STORE_FORMAT_VERSION, 1);
    }

    #[test]
    fn test_store_metadata_new() {
        let meta = StoreMetadata::new();
        assert_eq!(meta.format_version, STORE_FORMAT_VERSION);
        assert_eq!(meta.created_at, meta.last_opened_at);
        assert!(meta.is_compatible());
    }

    #[test]
    fn test_store_metadata_touch() {
        let mut meta = StoreMetadata::new();
        let original = meta.last_opened_at;
        std::thread::sleep(std::time::Duration::from_millis(1));
        meta.touch();
        assert!(meta.last_opened_at > original);
    }

    #[test]
    fn test_store_metadata_serialization() {
        let meta = StoreMetadata::new();
        let bytes = bincode::serialize(&meta).unwrap();
        let restored: StoreMetadata = bincode::deserialize(&bytes).unwrap();
        assert_eq!(meta.store_id, restored.store_id);
        assert_eq!(meta.format_version, restored.format_version);
    }

    #[test]
    fn test_collection_table_names_are_prefixed() {
        assert_eq!(collection_table_name("profiles"), "collection.profiles");
        // A collection can't shadow a fixed table
        assert_ne!(collection_table_name("versions"), "versions");
    }

    #[test]
    fn test_schema_builder() {
        let schema = CollectionSchema::new("assets")
            .field(FieldDef::text("title"))
            .field(FieldDef::reference("profile_id"))
            .timestamps()
            .foreign_key(ForeignKey::cascade("profile_id", "profiles"));

        assert_eq!(schema.fields[0], FieldDef::id());
        assert!(schema.has_field("title"));
        assert!(schema.has_field("created_at"));
        assert!(!schema.has_field("year"));
        assert_eq!(schema.fields_of_kind(FieldKind::UpdatedAt).count(), 1);
        assert_eq!(schema.foreign_keys[0].on_delete, OnDelete::Cascade);
    }

    #[test]
    fn test_managed_kinds() {
        assert!(FieldKind::Id.is_managed());
        assert!(FieldKind::CreatedAt.is_managed());
        assert!(FieldKind::UpdatedAt.is_managed());
        assert!(!FieldKind::Reference.is_managed());
    }

    #[test]
    fn test_collection_schema_bincode_roundtrip() {
        let schema = CollectionSchema::new("base_entities")
            .timestamps()
            .field(FieldDef::reference("profile_id"))
            .foreign_key(ForeignKey::cascade("profile_id", "profiles"));
        let bytes = bincode::serialize(&schema).unwrap();
        let restored: CollectionSchema = bincode::deserialize(&bytes).unwrap();
        assert_eq!(schema, restored);
    }
}
