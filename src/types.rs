//! Core type definitions for EntertainMe identifiers and timestamps.
//!
//! Documents are keyed by [`RecordId`], a per-collection auto-incrementing
//! integer. A store as a whole is identified by a [`StoreId`] (UUID v7),
//! assigned once when the store file is created.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Store identifier (UUID v7 for time-ordering).
///
/// Written into the store metadata on creation and never changed, so two
/// store files can be told apart even after being renamed or copied.
///
/// # Example
/// ```
/// use entertainme::StoreId;
///
/// let id = StoreId::new();
/// println!("Created store: {}", id);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(pub Uuid);

impl StoreId {
    /// Creates a new StoreId with a UUID v7 (time-ordered).
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a nil (all zeros) StoreId.
    #[inline]
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for StoreId {
    /// Returns a nil (all zeros) StoreId.
    ///
    /// For a new unique ID, use [`StoreId::new()`].
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document identifier within a collection.
///
/// Identifiers start at 1 and increase monotonically per collection.
/// `RecordId(0)` marks an entity that has not been stored yet; inserting
/// such an entity assigns the next free identifier.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    /// The unassigned identifier.
    pub const UNASSIGNED: RecordId = RecordId(0);

    /// Creates a RecordId from a raw key.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw key used in storage.
    #[inline]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns true if this entity has not been stored yet.
    #[inline]
    pub const fn is_unassigned(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in milliseconds.
///
/// Using i64 allows representing dates far into the future and past.
/// `Timestamp(0)` doubles as "not recorded" for documents written before
/// a collection carried timestamp fields.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch (should never happen
    /// in practice), returns a timestamp of 0 (epoch) rather than panicking.
    #[inline]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp from Unix milliseconds.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns true if no time was ever recorded.
    #[inline]
    pub const fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
