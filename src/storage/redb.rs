//! redb storage engine implementation.
//!
//! This module provides the storage handle for EntertainMe using
//! [redb](https://docs.rs/redb), a pure Rust embedded key-value store.
//!
//! # Features
//!
//! - ACID transactions with MVCC
//! - Single-writer, multiple-reader concurrency
//! - Automatic crash recovery
//! - In-memory backend for throwaway stores
//!
//! # Reads and writes
//!
//! Read methods on [`RedbStore`] each run in their own read transaction.
//! Writes go through a [`StoreWriter`], which wraps one write transaction:
//! [`RedbStore::write`] commits it when the closure returns `Ok` and aborts
//! it otherwise. The single-call helpers (`insert`, `update`, `delete`) are
//! thin wrappers that open and commit one transaction each.

use std::path::Path;

use ::redb::backends::InMemoryBackend;
use ::redb::{Database, ReadableTable, TableError, WriteTransaction};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::schema::{
    collection_table, collection_table_name, CollectionSchema, FieldDef, FieldKind, OnDelete,
    StoreMetadata, CATALOG_TABLE, ID_FIELD, METADATA_TABLE, STORE_FORMAT_VERSION,
};
use super::Entity;
use crate::config::StoreLocation;
use crate::error::{EntertainMeError, NotFoundError, Result, StorageError, ValidationError};
use crate::types::{RecordId, Timestamp};

/// Metadata key in the metadata table.
const METADATA_KEY: &str = "store_metadata";

/// redb-backed store handle.
///
/// Holds the redb database, its cached metadata and where it lives.
/// Dropping the handle releases the file; [`RedbStore::close`] does the
/// same explicitly and consumes the handle.
#[derive(Debug)]
pub struct RedbStore {
    /// The redb database handle.
    db: Database,

    /// Cached store metadata.
    metadata: StoreMetadata,

    /// Where the store lives.
    location: StoreLocation,
}

impl RedbStore {
    /// Opens or creates a store at the given location.
    ///
    /// A missing file is created, parent directories included. An existing
    /// file is validated against [`STORE_FORMAT_VERSION`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path is empty
    /// - The parent directory can't be created
    /// - The store file is corrupted or has a different format version
    /// - The store is already open elsewhere
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use entertainme::{storage::RedbStore, StoreLocation};
    ///
    /// let store = RedbStore::open(&StoreLocation::path("./catalog.db"))?;
    /// ```
    #[instrument(fields(location = %location))]
    pub fn open(location: &StoreLocation) -> Result<Self> {
        location.validate()?;
        let store_exists = Self::exists(location);

        debug!(store_exists = store_exists, "Opening store");

        let db = Self::create_database(location)?;

        if store_exists {
            Self::open_existing(db, location.clone())
        } else {
            Self::initialize_new(db, location.clone())
        }
    }

    /// Returns true if a store file exists at the location.
    ///
    /// Always false for an in-memory location.
    pub fn exists(location: &StoreLocation) -> bool {
        match location {
            StoreLocation::Path(path) => path.is_file(),
            StoreLocation::InMemory => false,
        }
    }

    /// Deletes the store file at the location, if there is one.
    ///
    /// Deleting an absent store or an in-memory location is a no-op.
    #[instrument(fields(location = %location))]
    pub fn delete(location: &StoreLocation) -> Result<()> {
        if let StoreLocation::Path(path) = location {
            if path.is_file() {
                std::fs::remove_file(path)?;
                info!("Store file deleted");
            }
        }
        Ok(())
    }

    /// Creates the redb database with appropriate settings.
    fn create_database(location: &StoreLocation) -> Result<Database> {
        let builder = Database::builder();

        // redb doesn't expose a typed error variant for lock conflicts on
        // every platform, so we detect them via the message.
        let lock_aware = |e: ::redb::DatabaseError| {
            let msg = e.to_string();
            if msg.contains("lock") || msg.contains("already open") {
                StorageError::StoreLocked
            } else {
                StorageError::Redb(msg)
            }
        };

        let db = match location {
            StoreLocation::Path(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                builder.create(path).map_err(lock_aware)?
            }
            StoreLocation::InMemory => builder
                .create_with_backend(InMemoryBackend::new())
                .map_err(lock_aware)?,
        };

        debug!("Store file opened successfully");
        Ok(db)
    }

    /// Initializes a new store with its fixed tables and metadata.
    #[instrument(skip(db), fields(location = %location))]
    fn initialize_new(db: Database, location: StoreLocation) -> Result<Self> {
        info!("Initializing new store");

        let metadata = StoreMetadata::new();

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_bytes = bincode::serialize(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;

            // The catalog starts empty; collections arrive with schema steps
            let _ = write_txn.open_table(CATALOG_TABLE)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            format_version = STORE_FORMAT_VERSION,
            store_id = %metadata.store_id,
            "Store initialized"
        );

        Ok(Self {
            db,
            metadata,
            location,
        })
    }

    /// Opens and validates an existing store.
    #[instrument(skip(db), fields(location = %location))]
    fn open_existing(db: Database, location: StoreLocation) -> Result<Self> {
        info!("Opening existing store");

        let read_txn = db.begin_read().map_err(StorageError::from)?;

        let metadata = {
            let meta_table = read_txn.open_table(METADATA_TABLE).map_err(|e| {
                StorageError::corrupted(format!("Cannot open metadata table: {}", e))
            })?;

            let metadata_bytes = meta_table
                .get(METADATA_KEY)
                .map_err(StorageError::from)?
                .ok_or_else(|| StorageError::corrupted("Missing store metadata"))?;

            bincode::deserialize::<StoreMetadata>(metadata_bytes.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid metadata format: {}", e)))?
        };

        drop(read_txn);

        if !metadata.is_compatible() {
            warn!(
                expected = STORE_FORMAT_VERSION,
                found = metadata.format_version,
                "Store format version mismatch"
            );
            return Err(StorageError::FormatVersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: metadata.format_version,
            }
            .into());
        }

        let mut metadata = metadata;
        metadata.touch();

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_bytes = bincode::serialize(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(store_id = %metadata.store_id, "Store opened successfully");

        Ok(Self {
            db,
            metadata,
            location,
        })
    }

    /// Closes the store, releasing the file.
    ///
    /// redb flushes committed data durably at commit time and releases its
    /// file lock on drop, so this cannot fail today. The `Result` keeps the
    /// signature stable for backends that can report flush errors.
    #[instrument(skip(self), fields(location = %self.location))]
    pub fn close(self) -> Result<()> {
        info!("Closing store");
        drop(self.db);
        info!("Store closed");
        Ok(())
    }

    /// Returns the store metadata.
    #[inline]
    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    /// Returns where this store lives.
    #[inline]
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Returns the path to the store file, if it has one.
    #[inline]
    pub fn path(&self) -> Option<&Path> {
        self.location.as_path()
    }

    /// Returns a reference to the underlying redb database.
    #[inline]
    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// Runs `f` inside one write transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and is aborted (its
    /// writes discarded) when `f` returns `Err`.
    pub fn write<T>(&self, f: impl FnOnce(&StoreWriter<'_>) -> Result<T>) -> Result<T> {
        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        let value = f(&StoreWriter::new(&write_txn))?;
        write_txn.commit().map_err(StorageError::from)?;
        Ok(value)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Returns the registered schema of a collection.
    pub fn collection_schema(&self, name: &str) -> Result<Option<CollectionSchema>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = match read_txn.open_table(CATALOG_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match table.get(name)? {
            Some(value) => Ok(Some(decode_schema(name, value.value())?)),
            None => Ok(None),
        }
    }

    /// Returns true if the collection is registered.
    pub fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collection_schema(name)?.is_some())
    }

    /// Lists all registered collections, ordered by name.
    pub fn collections(&self) -> Result<Vec<CollectionSchema>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = match read_txn.open_table(CATALOG_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut schemas = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry.map_err(StorageError::from)?;
            schemas.push(decode_schema(key.value(), value.value())?);
        }
        Ok(schemas)
    }

    /// Lists the names of all registered collections, ordered by name.
    pub fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.collections()?.into_iter().map(|s| s.name).collect())
    }

    // =========================================================================
    // Document reads
    // =========================================================================

    /// Retrieves an entity by ID.
    ///
    /// Returns `None` if no document with the given ID exists.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if the entity's collection hasn't been
    /// created by a schema step yet.
    pub fn get<E: Entity>(&self, id: RecordId) -> Result<Option<E>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table_name = collection_table_name(E::COLLECTION);
        let table = read_txn
            .open_table(collection_table(&table_name))
            .map_err(|e| collection_error(E::COLLECTION, e))?;

        match table.get(id.get())? {
            Some(value) => Ok(Some(decode_document(value.value())?)),
            None => Ok(None),
        }
    }

    /// Returns every entity in the collection, in ID order.
    pub fn all<E: Entity>(&self) -> Result<Vec<E>> {
        self.find(|_: &E| true)
    }

    /// Returns every entity matching the predicate, in ID order.
    pub fn find<E: Entity>(&self, predicate: impl FnMut(&E) -> bool) -> Result<Vec<E>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table_name = collection_table_name(E::COLLECTION);
        let table = read_txn
            .open_table(collection_table(&table_name))
            .map_err(|e| collection_error(E::COLLECTION, e))?;

        scan_table(&table, predicate)
    }

    /// Returns the first entity matching the predicate.
    pub fn find_one<E: Entity>(&self, predicate: impl FnMut(&E) -> bool) -> Result<Option<E>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table_name = collection_table_name(E::COLLECTION);
        let table = read_txn
            .open_table(collection_table(&table_name))
            .map_err(|e| collection_error(E::COLLECTION, e))?;

        first_in_table(&table, predicate)
    }

    /// Returns the raw JSON documents of a collection, in ID order.
    pub fn documents(&self, collection: &str) -> Result<Vec<Value>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table_name = collection_table_name(collection);
        let table = read_txn
            .open_table(collection_table(&table_name))
            .map_err(|e| collection_error(collection, e))?;

        scan_table(&table, |_: &Value| true)
    }

    /// Counts the documents in a collection.
    pub fn count(&self, collection: &str) -> Result<u64> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table_name = collection_table_name(collection);
        let table = read_txn
            .open_table(collection_table(&table_name))
            .map_err(|e| collection_error(collection, e))?;

        let mut count = 0;
        for entry in table.iter()? {
            entry.map_err(StorageError::from)?;
            count += 1;
        }
        Ok(count)
    }

    // =========================================================================
    // Single-transaction writes
    // =========================================================================

    /// Inserts an entity and returns it with its assigned ID and timestamps.
    pub fn insert<E: Entity>(&self, entity: &E) -> Result<E> {
        self.write(|w| w.insert(entity))
    }

    /// Updates an entity by ID.
    ///
    /// Returns `false` if no document with the entity's ID exists.
    pub fn update<E: Entity>(&self, entity: &E) -> Result<bool> {
        self.write(|w| w.update(entity))
    }

    /// Deletes a document and everything that cascades from it.
    ///
    /// Returns the number of documents removed (0 if the ID was unknown).
    pub fn delete_document(&self, collection: &str, id: RecordId) -> Result<u64> {
        self.write(|w| w.delete(collection, id))
    }
}

// RedbStore is auto Send + Sync: Database, StoreMetadata, and StoreLocation
// are all Send + Sync.

/// Collection-level operations inside one write transaction.
///
/// Obtained from [`RedbStore::write`]. Schema steps receive one of these so
/// a step and its ledger update commit or abort together.
pub struct StoreWriter<'a> {
    pub(crate) txn: &'a WriteTransaction,
}

impl<'a> StoreWriter<'a> {
    pub(crate) fn new(txn: &'a WriteTransaction) -> Self {
        Self { txn }
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Returns the registered schema of a collection.
    pub fn collection_schema(&self, name: &str) -> Result<Option<CollectionSchema>> {
        let table = self.txn.open_table(CATALOG_TABLE)?;
        let schema = match table.get(name)? {
            Some(value) => Some(decode_schema(name, value.value())?),
            None => None,
        };
        Ok(schema)
    }

    /// Returns true if the collection is registered.
    pub fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collection_schema(name)?.is_some())
    }

    /// Lists all registered collections, ordered by name.
    pub fn collections(&self) -> Result<Vec<CollectionSchema>> {
        let table = self.txn.open_table(CATALOG_TABLE)?;
        let mut schemas = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry.map_err(StorageError::from)?;
            schemas.push(decode_schema(key.value(), value.value())?);
        }
        Ok(schemas)
    }

    fn require_schema(&self, name: &str) -> Result<CollectionSchema> {
        self.collection_schema(name)?
            .ok_or_else(|| StorageError::collection_not_found(name).into())
    }

    fn save_schema(&self, schema: &CollectionSchema) -> Result<()> {
        let bytes = bincode::serialize(schema)
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        let mut table = self.txn.open_table(CATALOG_TABLE)?;
        table.insert(schema.name.as_str(), bytes.as_slice())?;
        Ok(())
    }

    /// Registers a new collection and creates its table.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is empty or the schema lacks its identity field
    /// - The collection already exists
    /// - A foreign key references a collection that doesn't exist
    pub fn create_collection(&self, schema: CollectionSchema) -> Result<()> {
        if schema.name.is_empty() {
            return Err(ValidationError::required_field("collection name").into());
        }
        if schema.get_field(ID_FIELD).map(|f| f.kind) != Some(FieldKind::Id) {
            return Err(ValidationError::invalid_field(
                "fields",
                format!("collection '{}' must declare an '{}' field", schema.name, ID_FIELD),
            )
            .into());
        }
        if self.collection_exists(&schema.name)? {
            return Err(StorageError::CollectionExists(schema.name).into());
        }
        for fk in &schema.foreign_keys {
            if fk.references != schema.name && !self.collection_exists(&fk.references)? {
                return Err(StorageError::DanglingReference {
                    collection: schema.name.clone(),
                    references: fk.references.clone(),
                }
                .into());
            }
        }

        self.save_schema(&schema)?;
        let table_name = collection_table_name(&schema.name);
        let _ = self.txn.open_table(collection_table(&table_name))?;

        debug!(collection = %schema.name, fields = schema.fields.len(), "Collection created");
        Ok(())
    }

    /// Adds a field to a collection and backfills existing documents.
    ///
    /// Documents that lack the field (or hold `null`) get `default`.
    /// Timestamp fields ignore `default` and are backfilled with the
    /// current time, replacing zero values as well.
    /// Returns the number of documents backfilled.
    pub fn add_field(&self, collection: &str, field: FieldDef, default: Value) -> Result<u64> {
        let mut schema = self.require_schema(collection)?;
        if field.kind == FieldKind::Id {
            return Err(ValidationError::invalid_field(
                "kind",
                "identity fields can't be added to an existing collection",
            )
            .into());
        }
        if schema.has_field(&field.name) {
            return Err(StorageError::FieldExists {
                collection: collection.to_string(),
                field: field.name,
            }
            .into());
        }

        let is_timestamp = matches!(field.kind, FieldKind::CreatedAt | FieldKind::UpdatedAt);
        let default = if is_timestamp {
            Value::from(Timestamp::now().as_millis())
        } else {
            default
        };

        let table_name = collection_table_name(collection);
        let mut table = self.txn.open_table(collection_table(&table_name))?;

        // Typed writers may have stored an unset timestamp as 0 before the
        // field was part of the schema.
        let mut pending = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry.map_err(StorageError::from)?;
            let object = decode_object(collection, value.value())?;
            let needs_value = match object.get(&field.name) {
                None | Some(Value::Null) => true,
                Some(current) => is_timestamp && current.as_i64() == Some(0),
            };
            if needs_value {
                pending.push((key.value(), object));
            }
        }

        let backfilled = pending.len() as u64;
        for (key, mut object) in pending {
            object.insert(field.name.clone(), default.clone());
            let bytes = serde_json::to_vec(&object).map_err(StorageError::from)?;
            table.insert(key, bytes.as_slice())?;
        }
        drop(table);

        debug!(collection, field = %field.name, backfilled, "Field added");
        schema.fields.push(field);
        self.save_schema(&schema)?;
        Ok(backfilled)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Inserts an entity and returns it with its assigned ID and timestamps.
    ///
    /// The entity's own ID is ignored; the next free ID is assigned.
    pub fn insert<E: Entity>(&self, entity: &E) -> Result<E> {
        let value = serde_json::to_value(entity).map_err(StorageError::from)?;
        let stored = self.insert_value(E::COLLECTION, value)?;
        Ok(serde_json::from_value(stored).map_err(StorageError::from)?)
    }

    /// Inserts a raw JSON object and returns it as stored.
    pub fn insert_value(&self, collection: &str, value: Value) -> Result<Value> {
        let schema = self.require_schema(collection)?;
        let mut object = into_object(collection, value)?;

        // A collection whose ID is a foreign key shares its ID with a parent row
        let parent = schema
            .foreign_keys
            .iter()
            .find(|fk| fk.field == ID_FIELD)
            .map(|fk| fk.references.clone());
        let parent_id = match parent {
            Some(parent) => Some(self.insert_parent(&parent, &object)?),
            None => None,
        };

        let table_name = collection_table_name(collection);
        let mut table = self.txn.open_table(collection_table(&table_name))?;

        let next_id = match parent_id {
            Some(id) => {
                if table.get(id)?.is_some() {
                    return Err(StorageError::corrupted(format!(
                        "{} already holds ID {} of its parent row",
                        collection, id
                    ))
                    .into());
                }
                id
            }
            None => table.last()?.map(|(key, _)| key.value() + 1).unwrap_or(1),
        };
        object.insert(ID_FIELD.to_string(), Value::from(next_id));

        let now = Value::from(Timestamp::now().as_millis());
        for field in schema.fields_of_kind(FieldKind::CreatedAt) {
            let unset = object.get(&field.name).and_then(Value::as_i64).unwrap_or(0) == 0;
            if unset {
                object.insert(field.name.clone(), now.clone());
            }
        }
        for field in schema.fields_of_kind(FieldKind::UpdatedAt) {
            object.insert(field.name.clone(), now.clone());
        }

        let bytes = serde_json::to_vec(&object).map_err(StorageError::from)?;
        table.insert(next_id, bytes.as_slice())?;

        debug!(collection, id = next_id, "Document inserted");
        Ok(Value::Object(object))
    }

    /// Inserts the parent row a child document takes its ID from.
    ///
    /// Parent fields the child also carries are copied over. Missing
    /// references are stored as 0, which points at nothing.
    fn insert_parent(&self, parent: &str, child: &Map<String, Value>) -> Result<u64> {
        let parent_schema = self.require_schema(parent)?;

        let mut row = Map::new();
        for field in parent_schema.fields.iter().filter(|f| !f.kind.is_managed()) {
            match child.get(&field.name) {
                Some(value) => {
                    row.insert(field.name.clone(), value.clone());
                }
                None if field.kind == FieldKind::Reference => {
                    row.insert(field.name.clone(), Value::from(0u64));
                }
                None => {}
            }
        }

        let stored = self.insert_value(parent, Value::Object(row))?;
        stored
            .get(ID_FIELD)
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                StorageError::corrupted(format!("{} row stored without an ID", parent)).into()
            })
    }

    /// Updates an entity by ID.
    ///
    /// Fields present in the stored document but unknown to `E` are kept.
    /// `created_at`-style fields keep their stored value. Returns `false`
    /// if no document with the entity's ID exists.
    pub fn update<E: Entity>(&self, entity: &E) -> Result<bool> {
        let value = serde_json::to_value(entity).map_err(StorageError::from)?;
        self.update_value(E::COLLECTION, entity.id(), value)
    }

    /// Updates a raw JSON document by ID.
    pub fn update_value(&self, collection: &str, id: RecordId, value: Value) -> Result<bool> {
        let schema = self.require_schema(collection)?;
        let changes = into_object(collection, value)?;

        let table_name = collection_table_name(collection);
        let mut table = self.txn.open_table(collection_table(&table_name))?;

        let existing = match table.get(id.get())? {
            Some(value) => decode_object(collection, value.value())?,
            None => return Ok(false),
        };

        let mut merged = existing.clone();
        merged.extend(changes);
        merged.insert(ID_FIELD.to_string(), Value::from(id.get()));

        for field in schema.fields_of_kind(FieldKind::CreatedAt) {
            if let Some(created) = existing.get(&field.name) {
                merged.insert(field.name.clone(), created.clone());
            }
        }
        let now = Value::from(Timestamp::now().as_millis());
        for field in schema.fields_of_kind(FieldKind::UpdatedAt) {
            merged.insert(field.name.clone(), now.clone());
        }

        let bytes = serde_json::to_vec(&merged).map_err(StorageError::from)?;
        table.insert(id.get(), bytes.as_slice())?;

        debug!(collection, id = %id, "Document updated");
        Ok(true)
    }

    /// Updates an entity by ID, failing if it doesn't exist.
    pub fn update_existing<E: Entity>(&self, entity: &E) -> Result<()> {
        if self.update(entity)? {
            Ok(())
        } else {
            Err(NotFoundError::document(E::COLLECTION, entity.id()).into())
        }
    }

    /// Retrieves an entity by ID.
    pub fn get<E: Entity>(&self, id: RecordId) -> Result<Option<E>> {
        self.require_schema(E::COLLECTION)?;
        let table_name = collection_table_name(E::COLLECTION);
        let table = self.txn.open_table(collection_table(&table_name))?;
        let entity = match table.get(id.get())? {
            Some(value) => Some(decode_document(value.value())?),
            None => None,
        };
        Ok(entity)
    }

    /// Returns every entity matching the predicate, in ID order.
    pub fn find<E: Entity>(&self, predicate: impl FnMut(&E) -> bool) -> Result<Vec<E>> {
        self.require_schema(E::COLLECTION)?;
        let table_name = collection_table_name(E::COLLECTION);
        let table = self.txn.open_table(collection_table(&table_name))?;
        scan_table(&table, predicate)
    }

    /// Returns the first entity matching the predicate.
    pub fn find_one<E: Entity>(&self, predicate: impl FnMut(&E) -> bool) -> Result<Option<E>> {
        self.require_schema(E::COLLECTION)?;
        let table_name = collection_table_name(E::COLLECTION);
        let table = self.txn.open_table(collection_table(&table_name))?;
        first_in_table(&table, predicate)
    }

    /// Deletes a document and, through cascading foreign keys, every
    /// document that references it.
    ///
    /// Returns the number of documents removed (0 if the ID was unknown).
    pub fn delete(&self, collection: &str, id: RecordId) -> Result<u64> {
        self.require_schema(collection)?;
        let schemas = self.collections()?;

        let mut pending = vec![(collection.to_string(), id.get())];
        let mut removed = 0u64;

        while let Some((current, key)) = pending.pop() {
            let table_name = collection_table_name(&current);
            let existed = self
                .txn
                .open_table(collection_table(&table_name))?
                .remove(key)?
                .is_some();
            if !existed {
                continue;
            }
            removed += 1;

            // Child rows share their ID with a parent row; drop it as well
            if let Some(schema) = schemas.iter().find(|schema| schema.name == current) {
                for fk in schema.foreign_keys.iter().filter(|fk| fk.field == ID_FIELD) {
                    pending.push((fk.references.clone(), key));
                }
            }

            for schema in &schemas {
                for fk in schema.foreign_keys.iter().filter(|fk| {
                    fk.references == current && fk.on_delete == OnDelete::Cascade
                }) {
                    for child in self.ids_where(&schema.name, &fk.field, key)? {
                        pending.push((schema.name.clone(), child));
                    }
                }
            }
        }

        if removed > 0 {
            debug!(collection, id = %id, removed, "Documents deleted");
        }
        Ok(removed)
    }

    /// IDs of documents whose `field` holds `target`.
    fn ids_where(&self, collection: &str, field: &str, target: u64) -> Result<Vec<u64>> {
        let table_name = collection_table_name(collection);
        let table = self.txn.open_table(collection_table(&table_name))?;

        let mut ids = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry.map_err(StorageError::from)?;
            let object = decode_object(collection, value.value())?;
            if object.get(field).and_then(Value::as_u64) == Some(target) {
                ids.push(key.value());
            }
        }
        Ok(ids)
    }
}

// ============================================================================
// Encoding helpers
// ============================================================================

/// Maps "table missing" onto "collection missing" for document reads.
fn collection_error(collection: &str, err: TableError) -> EntertainMeError {
    match err {
        TableError::TableDoesNotExist(_) => StorageError::collection_not_found(collection).into(),
        other => other.into(),
    }
}

fn decode_schema(name: &str, bytes: &[u8]) -> Result<CollectionSchema> {
    bincode::deserialize(bytes).map_err(|e| {
        StorageError::corrupted(format!("Invalid schema for collection '{}': {}", name, e)).into()
    })
}

fn decode_document<E: DeserializeOwned>(bytes: &[u8]) -> Result<E> {
    Ok(serde_json::from_slice(bytes).map_err(StorageError::from)?)
}

fn decode_object(collection: &str, bytes: &[u8]) -> Result<Map<String, Value>> {
    into_object(collection, decode_document(bytes)?)
}

fn into_object(collection: &str, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(object) => Ok(object),
        other => Err(StorageError::serialization(format!(
            "documents in '{}' must be JSON objects, got {}",
            collection, other
        ))
        .into()),
    }
}

fn scan_table<T, E, F>(table: &T, mut keep: F) -> Result<Vec<E>>
where
    T: ReadableTable<u64, &'static [u8]>,
    E: DeserializeOwned,
    F: FnMut(&E) -> bool,
{
    let mut found = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry.map_err(StorageError::from)?;
        let document: E = decode_document(value.value())?;
        if keep(&document) {
            found.push(document);
        }
    }
    Ok(found)
}

fn first_in_table<T, E, F>(table: &T, mut keep: F) -> Result<Option<E>>
where
    T: ReadableTable<u64, &'static [u8]>,
    E: DeserializeOwned,
    F: FnMut(&E) -> bool,
{
    for entry in table.iter()? {
        let (_, value) = entry.map_err(StorageError::from)?;
        let document: E = decode_document(value.value())?;
        if keep(&document) {
            return Ok(Some(document));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::ForeignKey;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tempfile::tempdir;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Shelf {
        #[serde(default)]
        id: RecordId,
        label: String,
        #[serde(default)]
        created_at: Timestamp,
        #[serde(default)]
        updated_at: Timestamp,
    }

    impl Entity for Shelf {
        const COLLECTION: &'static str = "shelves";
        fn id(&self) -> RecordId {
            self.id
        }
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct Book {
        #[serde(default)]
        id: RecordId,
        title: String,
        shelf_id: RecordId,
    }

    impl Entity for Book {
        const COLLECTION: &'static str = "books";
        fn id(&self) -> RecordId {
            self.id
        }
    }

    fn shelf(label: &str) -> Shelf {
        Shelf {
            label: label.to_string(),
            ..Default::default()
        }
    }

    fn open_memory_with_shelves() -> RedbStore {
        let store = RedbStore::open(&StoreLocation::InMemory).unwrap();
        store
            .write(|w| {
                w.create_collection(
                    CollectionSchema::new("shelves")
                        .field(FieldDef::text("label"))
                        .timestamps(),
                )?;
                w.create_collection(
                    CollectionSchema::new("books")
                        .field(FieldDef::text("title"))
                        .field(FieldDef::reference("shelf_id"))
                        .foreign_key(ForeignKey::cascade("shelf_id", "shelves")),
                )
            })
            .unwrap();
        store
    }

    // ====================================================================
    // Lifecycle
    // ====================================================================

    #[test]
    fn test_open_creates_new_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let location = StoreLocation::path(&path);

        assert!(!RedbStore::exists(&location));

        let store = RedbStore::open(&location).unwrap();

        assert!(path.exists());
        assert!(RedbStore::exists(&location));
        assert_eq!(store.metadata().format_version, STORE_FORMAT_VERSION);
        assert_eq!(store.path(), Some(path.as_path()));

        store.close().unwrap();
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("test.db");

        let store = RedbStore::open(&StoreLocation::path(&path)).unwrap();
        assert!(path.exists());
        store.close().unwrap();
    }

    #[test]
    fn test_open_existing_store() {
        let dir = tempdir().unwrap();
        let location = StoreLocation::path(dir.path().join("test.db"));

        let store = RedbStore::open(&location).unwrap();
        let created_at = store.metadata().created_at;
        let store_id = store.metadata().store_id;
        store.close().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        let store = RedbStore::open(&location).unwrap();

        // created_at and identity should be preserved
        assert_eq!(store.metadata().created_at, created_at);
        assert_eq!(store.metadata().store_id, store_id);
        // last_opened_at should be updated
        assert!(store.metadata().last_opened_at > created_at);

        store.close().unwrap();
    }

    #[test]
    fn test_delete_store() {
        let dir = tempdir().unwrap();
        let location = StoreLocation::path(dir.path().join("test.db"));

        RedbStore::open(&location).unwrap().close().unwrap();
        assert!(RedbStore::exists(&location));

        RedbStore::delete(&location).unwrap();
        assert!(!RedbStore::exists(&location));

        // Deleting again is a no-op
        RedbStore::delete(&location).unwrap();
    }

    #[test]
    fn test_in_memory_store_never_exists() {
        assert!(!RedbStore::exists(&StoreLocation::InMemory));
        RedbStore::delete(&StoreLocation::InMemory).unwrap();

        let store = RedbStore::open(&StoreLocation::InMemory).unwrap();
        assert!(store.path().is_none());
        assert!(store.collections().unwrap().is_empty());
        store.close().unwrap();
    }

    #[test]
    fn test_open_empty_path_rejected() {
        let result = RedbStore::open(&StoreLocation::path(""));
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_second_handle_is_locked_out() {
        let dir = tempdir().unwrap();
        let location = StoreLocation::path(dir.path().join("test.db"));

        let store = RedbStore::open(&location).unwrap();
        let second = RedbStore::open(&location);
        assert!(matches!(
            second,
            Err(EntertainMeError::Storage(StorageError::StoreLocked))
        ));
        store.close().unwrap();
    }

    // ====================================================================
    // Catalog
    // ====================================================================

    #[test]
    fn test_create_collection_registers_schema() {
        let store = open_memory_with_shelves();

        assert!(store.collection_exists("shelves").unwrap());
        assert!(store.collection_exists("books").unwrap());
        assert!(!store.collection_exists("films").unwrap());
        assert_eq!(store.collection_names().unwrap(), vec!["books", "shelves"]);

        let schema = store.collection_schema("books").unwrap().unwrap();
        assert_eq!(schema.foreign_keys[0].references, "shelves");
    }

    #[test]
    fn test_create_collection_twice_fails() {
        let store = open_memory_with_shelves();
        let err = store
            .write(|w| w.create_collection(CollectionSchema::new("shelves")))
            .unwrap_err();
        assert!(matches!(
            err,
            EntertainMeError::Storage(StorageError::CollectionExists(ref name)) if name == "shelves"
        ));
    }

    #[test]
    fn test_create_collection_with_dangling_reference_fails() {
        let store = RedbStore::open(&StoreLocation::InMemory).unwrap();
        let err = store
            .write(|w| {
                w.create_collection(
                    CollectionSchema::new("books")
                        .foreign_key(ForeignKey::cascade("shelf_id", "shelves")),
                )
            })
            .unwrap_err();
        assert!(matches!(
            err,
            EntertainMeError::Storage(StorageError::DanglingReference { .. })
        ));
        assert!(!store.collection_exists("books").unwrap());
    }

    #[test]
    fn test_failed_write_is_rolled_back() {
        let store = RedbStore::open(&StoreLocation::InMemory).unwrap();
        let result: Result<()> = store.write(|w| {
            w.create_collection(CollectionSchema::new("shelves"))?;
            Err(StorageError::corrupted("step blew up").into())
        });
        assert!(result.is_err());
        assert!(!store.collection_exists("shelves").unwrap());
    }

    // ====================================================================
    // Documents
    // ====================================================================

    #[test]
    fn test_insert_assigns_ids_and_timestamps() {
        let store = open_memory_with_shelves();

        let first = store.insert(&shelf("fiction")).unwrap();
        let second = store.insert(&shelf("poetry")).unwrap();

        assert_eq!(first.id, RecordId::new(1));
        assert_eq!(second.id, RecordId::new(2));
        assert!(!first.created_at.is_unset());
        assert_eq!(first.created_at, first.updated_at);

        let loaded: Shelf = store.get(first.id).unwrap().unwrap();
        assert_eq!(loaded, first);
    }

    #[test]
    fn test_insert_into_unknown_collection_fails() {
        let store = RedbStore::open(&StoreLocation::InMemory).unwrap();
        let err = store.insert(&shelf("fiction")).unwrap_err();
        assert!(matches!(
            err,
            EntertainMeError::Storage(StorageError::CollectionNotFound(ref name)) if name == "shelves"
        ));
    }

    #[test]
    fn test_read_unknown_collection_fails() {
        let store = RedbStore::open(&StoreLocation::InMemory).unwrap();
        assert!(store.all::<Shelf>().unwrap_err().is_storage());
        assert!(store.count("shelves").unwrap_err().is_storage());
    }

    #[test]
    fn test_update_keeps_created_and_refreshes_updated() {
        let store = open_memory_with_shelves();
        let mut stored = store.insert(&shelf("fiction")).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        stored.label = "fantasy".to_string();
        stored.created_at = Timestamp::from_millis(1);
        assert!(store.update(&stored).unwrap());

        let loaded: Shelf = store.get(stored.id).unwrap().unwrap();
        assert_eq!(loaded.label, "fantasy");
        assert_ne!(loaded.created_at, Timestamp::from_millis(1));
        assert!(loaded.updated_at > loaded.created_at);
    }

    #[test]
    fn test_update_missing_returns_false() {
        let store = open_memory_with_shelves();
        let ghost = Shelf {
            id: RecordId::new(99),
            ..shelf("ghost")
        };
        assert!(!store.update(&ghost).unwrap());
        assert!(store
            .write(|w| w.update_existing(&ghost))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_update_keeps_unknown_fields() {
        let store = open_memory_with_shelves();
        let stored = store
            .write(|w| w.insert_value("shelves", json!({"label": "rare", "color": "red"})))
            .unwrap();
        let id = RecordId::new(stored["id"].as_u64().unwrap());

        let mut typed: Shelf = store.get(id).unwrap().unwrap();
        typed.label = "very rare".to_string();
        store.update(&typed).unwrap();

        let raw = store.documents("shelves").unwrap();
        assert_eq!(raw[0]["color"], "red");
        assert_eq!(raw[0]["label"], "very rare");
    }

    #[test]
    fn test_find_and_find_one() {
        let store = open_memory_with_shelves();
        for label in ["a", "b", "c"] {
            store.insert(&shelf(label)).unwrap();
        }

        let not_b: Vec<Shelf> = store.find(|s: &Shelf| s.label != "b").unwrap();
        assert_eq!(not_b.len(), 2);

        let c = store.find_one(|s: &Shelf| s.label == "c").unwrap().unwrap();
        assert_eq!(c.id, RecordId::new(3));
        assert!(store.find_one(|s: &Shelf| s.label == "z").unwrap().is_none());
        assert_eq!(store.count("shelves").unwrap(), 3);
    }

    #[test]
    fn test_delete_cascades_through_foreign_keys() {
        let store = open_memory_with_shelves();
        let fiction = store.insert(&shelf("fiction")).unwrap();
        let poetry = store.insert(&shelf("poetry")).unwrap();

        for (title, shelf_id) in [("Dune", fiction.id), ("Emma", fiction.id), ("Odes", poetry.id)] {
            store
                .insert(&Book {
                    title: title.to_string(),
                    shelf_id,
                    ..Default::default()
                })
                .unwrap();
        }

        let removed = store.delete_document("shelves", fiction.id).unwrap();
        assert_eq!(removed, 3);

        let books: Vec<Book> = store.all().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Odes");
        assert!(store.get::<Shelf>(fiction.id).unwrap().is_none());
    }

    #[test]
    fn test_child_takes_parent_id() {
        let store = open_memory_with_shelves();
        store
            .write(|w| {
                w.create_collection(
                    CollectionSchema::new("signed")
                        .field(FieldDef::text("author"))
                        .foreign_key(ForeignKey::cascade(ID_FIELD, "books")),
                )
            })
            .unwrap();
        let shelf = store.insert(&shelf("rare")).unwrap();

        // The child row writes its own parent, so IDs never drift apart
        let signed = store
            .write(|w| {
                w.insert_value("signed", json!({"author": "Le Guin", "title": "Earthsea"}))
            })
            .unwrap();
        let id = RecordId::new(signed["id"].as_u64().unwrap());
        assert_eq!(store.count("books").unwrap(), 1);
        let parent = store.get::<Book>(id).unwrap().unwrap();
        assert_eq!(parent.shelf_id, RecordId::UNASSIGNED);

        // An unrelated parent row gets the next ID, not one a child holds
        let other = store
            .insert(&Book {
                title: "Loose".to_string(),
                shelf_id: shelf.id,
                ..Default::default()
            })
            .unwrap();
        assert_ne!(other.id, id);
        assert_eq!(store.delete_document("shelves", shelf.id).unwrap(), 2);
        assert_eq!(store.count("signed").unwrap(), 1);

        // Deleting the child takes its parent row along
        assert_eq!(store.delete_document("signed", id).unwrap(), 2);
        assert_eq!(store.count("books").unwrap(), 0);
    }

    #[test]
    fn test_delete_missing_document() {
        let store = open_memory_with_shelves();
        assert_eq!(store.delete_document("shelves", RecordId::new(5)).unwrap(), 0);
    }

    #[test]
    fn test_add_field_backfills_documents() {
        let store = RedbStore::open(&StoreLocation::InMemory).unwrap();
        store
            .write(|w| {
                w.create_collection(CollectionSchema::new("tags").field(FieldDef::text("name")))?;
                w.insert_value("tags", json!({"name": "noir"}))?;
                w.insert_value("tags", json!({"name": "jazz", "pinned": true}))?;
                Ok(())
            })
            .unwrap();

        let backfilled = store
            .write(|w| w.add_field("tags", FieldDef::boolean("pinned"), json!(false)))
            .unwrap();
        assert_eq!(backfilled, 1);

        let docs = store.documents("tags").unwrap();
        assert_eq!(docs[0]["pinned"], false);
        assert_eq!(docs[1]["pinned"], true);
        assert!(store
            .collection_schema("tags")
            .unwrap()
            .unwrap()
            .has_field("pinned"));
    }

    #[test]
    fn test_add_timestamp_field_backfills_now() {
        let store = RedbStore::open(&StoreLocation::InMemory).unwrap();
        let before = Timestamp::now();
        store
            .write(|w| {
                w.create_collection(CollectionSchema::new("tags").field(FieldDef::text("name")))?;
                w.insert_value("tags", json!({"name": "noir"}))?;
                w.add_field("tags", FieldDef::created_at(), Value::Null)
            })
            .unwrap();

        let docs = store.documents("tags").unwrap();
        assert!(docs[0]["created_at"].as_i64().unwrap() >= before.as_millis());
    }

    #[test]
    fn test_add_existing_field_fails() {
        let store = open_memory_with_shelves();
        let err = store
            .write(|w| w.add_field("shelves", FieldDef::text("label"), Value::Null))
            .unwrap_err();
        assert!(matches!(
            err,
            EntertainMeError::Storage(StorageError::FieldExists { .. })
        ));
    }

    // ====================================================================
    // ACID Guarantee Tests
    // ====================================================================

    #[test]
    fn test_uncommitted_transaction_is_invisible() {
        let store = open_memory_with_shelves();

        {
            let write_txn = store.database().begin_write().unwrap();
            StoreWriter::new(&write_txn).insert(&shelf("phantom")).unwrap();
            // write_txn is dropped here without commit() -- rolled back
        }

        assert_eq!(store.count("shelves").unwrap(), 0);
    }

    #[test]
    fn test_committed_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let location = StoreLocation::path(dir.path().join("test.db"));

        {
            let store = RedbStore::open(&location).unwrap();
            store
                .write(|w| {
                    w.create_collection(
                        CollectionSchema::new("shelves")
                            .field(FieldDef::text("label"))
                            .timestamps(),
                    )
                })
                .unwrap();
            store.insert(&shelf("durable")).unwrap();
            // NO close() -- simulates crash
        }

        let store = RedbStore::open(&location).unwrap();
        let shelves: Vec<Shelf> = store.all().unwrap();
        assert_eq!(shelves.len(), 1);
        assert_eq!(shelves[0].label, "durable");
        store.close().unwrap();
    }

    // ====================================================================
    // Corruption Detection Tests
    // ====================================================================

    #[test]
    fn test_corruption_detection_invalid_metadata_bytes() {
        let dir = tempdir().unwrap();
        let location = StoreLocation::path(dir.path().join("corrupt.db"));

        let store = RedbStore::open(&location).unwrap();
        let write_txn = store.database().begin_write().unwrap();
        {
            let mut meta = write_txn.open_table(METADATA_TABLE).unwrap();
            meta.insert(METADATA_KEY, b"not-valid-bincode".as_slice())
                .unwrap();
        }
        write_txn.commit().unwrap();
        store.close().unwrap();

        match RedbStore::open(&location).unwrap_err() {
            EntertainMeError::Storage(StorageError::Corrupted(msg)) => {
                assert!(
                    msg.contains("Invalid metadata format"),
                    "Error should mention invalid format, got: {}",
                    msg
                );
            }
            other => panic!("Expected StorageError::Corrupted, got: {:?}", other),
        }
    }

    #[test]
    fn test_corruption_detection_missing_metadata_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign.db");

        // A redb file that isn't one of our stores
        {
            let db = ::redb::Database::create(&path).unwrap();
            let write_txn = db.begin_write().unwrap();
            {
                let dummy: ::redb::TableDefinition<&str, &str> =
                    ::redb::TableDefinition::new("dummy");
                let mut table = write_txn.open_table(dummy).unwrap();
                table.insert("key", "value").unwrap();
            }
            write_txn.commit().unwrap();
        }

        match RedbStore::open(&StoreLocation::path(&path)).unwrap_err() {
            EntertainMeError::Storage(StorageError::Corrupted(msg)) => {
                assert!(msg.contains("Cannot open metadata table"), "got: {}", msg);
            }
            other => panic!("Expected StorageError::Corrupted, got: {:?}", other),
        }
    }

    #[test]
    fn test_format_version_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let location = StoreLocation::path(dir.path().join("future.db"));

        let store = RedbStore::open(&location).unwrap();
        let mut future = store.metadata().clone();
        future.format_version = STORE_FORMAT_VERSION + 1;
        let write_txn = store.database().begin_write().unwrap();
        {
            let mut meta = write_txn.open_table(METADATA_TABLE).unwrap();
            let bytes = bincode::serialize(&future).unwrap();
            meta.insert(METADATA_KEY, bytes.as_slice()).unwrap();
        }
        write_txn.commit().unwrap();
        store.close().unwrap();

        assert!(matches!(
            RedbStore::open(&location).unwrap_err(),
            EntertainMeError::Storage(StorageError::FormatVersionMismatch { .. })
        ));
    }
}
