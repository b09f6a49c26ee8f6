//! Version ledger: one persisted schema-version record per section.
//!
//! The ledger lives in [`VERSIONS_TABLE`]. Records are written through a
//! [`StoreWriter`] so that a schema step and the ledger entry announcing it
//! commit in the same transaction.

use ::redb::{ReadableTable, TableError};
use serde::{Deserialize, Serialize};

use super::SchemaVersion;
use crate::error::{Result, StorageError};
use crate::storage::schema::VERSIONS_TABLE;
use crate::storage::{RedbStore, StoreWriter};

/// Section holding the schema version of the store itself.
pub const DATABASE_SECTION: &str = "database";

/// A persisted `(section, version)` pair.
///
/// The version is kept in its `NN.NN` text form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Section name, e.g. `"database"`.
    pub section: String,

    /// Version text, always formatted `NN.NN`.
    pub version: String,
}

impl VersionRecord {
    /// Creates a record for the given section and version.
    pub fn new(section: impl Into<String>, version: SchemaVersion) -> Self {
        Self {
            section: section.into(),
            version: version.to_string(),
        }
    }

    /// Parses the stored version text.
    ///
    /// # Errors
    /// Returns `StorageError::Corrupted` if the stored text is not a valid
    /// version.
    pub fn schema_version(&self) -> Result<SchemaVersion> {
        SchemaVersion::parse(&self.version).map_err(|e| {
            StorageError::corrupted(format!(
                "Invalid version in ledger section '{}': {}",
                self.section, e
            ))
            .into()
        })
    }
}

fn decode_record(bytes: &[u8]) -> Result<SchemaVersion> {
    let record: VersionRecord = bincode::deserialize(bytes)
        .map_err(|e| StorageError::corrupted(format!("Invalid version record: {}", e)))?;
    record.schema_version()
}

impl StoreWriter<'_> {
    /// Reads the version recorded for a section.
    pub fn read_version(&self, section: &str) -> Result<Option<SchemaVersion>> {
        let table = self.txn.open_table(VERSIONS_TABLE)?;
        let version = match table.get(section)? {
            Some(value) => Some(decode_record(value.value())?),
            None => None,
        };
        Ok(version)
    }

    /// Creates the record for a section.
    ///
    /// # Errors
    /// Returns `StorageError::VersionRecordExists` if the section already
    /// has a record; use [`write_version`](Self::write_version) to change it.
    pub fn create_version(&self, section: &str, version: SchemaVersion) -> Result<()> {
        if self.read_version(section)?.is_some() {
            return Err(StorageError::VersionRecordExists(section.to_string()).into());
        }
        self.put_version(section, version)
    }

    /// Overwrites the record for a section.
    ///
    /// # Errors
    /// Returns `StorageError::VersionRecordMissing` if the section has no
    /// record yet.
    pub fn write_version(&self, section: &str, version: SchemaVersion) -> Result<()> {
        if self.read_version(section)?.is_none() {
            return Err(StorageError::VersionRecordMissing(section.to_string()).into());
        }
        self.put_version(section, version)
    }

    fn put_version(&self, section: &str, version: SchemaVersion) -> Result<()> {
        let bytes = bincode::serialize(&VersionRecord::new(section, version))
            .map_err(|e| StorageError::serialization(e.to_string()))?;
        let mut table = self.txn.open_table(VERSIONS_TABLE)?;
        table.insert(section, bytes.as_slice())?;
        Ok(())
    }
}

impl RedbStore {
    /// Reads the version recorded for a section.
    ///
    /// Returns `None` if the ledger or the section's record doesn't exist.
    pub fn read_version(&self, section: &str) -> Result<Option<SchemaVersion>> {
        let read_txn = self.database().begin_read().map_err(StorageError::from)?;
        let table = match read_txn.open_table(VERSIONS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match table.get(section)? {
            Some(value) => Ok(Some(decode_record(value.value())?)),
            None => Ok(None),
        }
    }

    /// Reads the schema version of the store (the `"database"` section).
    pub fn schema_version(&self) -> Result<Option<SchemaVersion>> {
        self.read_version(DATABASE_SECTION)
    }
}
