//! Catalog entity types.
//!
//! One struct per collection. Every struct implements [`Entity`], so the
//! store's typed read and write helpers work on it directly. Fields the
//! store maintains (`id`, `created_at`, `updated_at`) default to zero and
//! are filled in on insert.

use serde::{Deserialize, Serialize};

use super::{
    ASSETS, ASSET_DATA, BASE_ENTITIES, ENTERTAINMENT_TYPES, MEDIUMS, PROFILES, PROVIDERS,
    VALID_TYPE_MEDIUMS,
};
use crate::storage::Entity;
use crate::types::{RecordId, Timestamp};

/// A user that owns a grouping of entertainment assets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Store-assigned identifier.
    #[serde(default)]
    pub id: RecordId,

    /// Name the profile is looked up by.
    pub username: String,

    /// When the profile was stored.
    #[serde(default)]
    pub created_at: Timestamp,

    /// When the profile was last changed.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Profile {
    /// Creates an unsaved profile.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }
}

impl Entity for Profile {
    const COLLECTION: &'static str = PROFILES;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// Ownership record tying an identifier to a profile.
///
/// Rows whose `profile_id` points at a deleted profile are removed with it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEntity {
    /// Store-assigned identifier.
    #[serde(default)]
    pub id: RecordId,
    /// When the record was stored.
    #[serde(default)]
    pub created_at: Timestamp,
    /// When the record was last changed.
    #[serde(default)]
    pub updated_at: Timestamp,
    /// Owning profile.
    pub profile_id: RecordId,
}

impl Entity for BaseEntity {
    const COLLECTION: &'static str = BASE_ENTITIES;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// Kind of entertainment, such as a movie or a book.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntertainmentType {
    /// Store-assigned identifier.
    #[serde(default)]
    pub id: RecordId,

    /// Display name, e.g. `"Movie"`.
    pub description: String,

    /// When the record was stored.
    #[serde(default)]
    pub created_at: Timestamp,
    /// When the record was last changed.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl EntertainmentType {
    /// Creates an unsaved type.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }
}

impl Entity for EntertainmentType {
    const COLLECTION: &'static str = ENTERTAINMENT_TYPES;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// Where an asset was obtained, such as a store front or the owner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Store-assigned identifier.
    #[serde(default)]
    pub id: RecordId,

    /// Display name, e.g. `"Vudu"`.
    pub description: String,

    /// When the record was stored.
    #[serde(default)]
    pub created_at: Timestamp,
    /// When the record was last changed.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Provider {
    /// Creates an unsaved provider.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }
}

impl Entity for Provider {
    const COLLECTION: &'static str = PROVIDERS;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// Physical or digital form of an asset, such as a DVD.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medium {
    /// Store-assigned identifier.
    #[serde(default)]
    pub id: RecordId,

    /// Display name, e.g. `"Hard Cover"`.
    pub description: String,

    /// Whether assets in this medium record a provider.
    #[serde(default)]
    pub provider_applies: bool,

    /// When the record was stored.
    #[serde(default)]
    pub created_at: Timestamp,
    /// When the record was last changed.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Medium {
    /// Creates an unsaved medium.
    pub fn new(description: impl Into<String>, provider_applies: bool) -> Self {
        Self {
            description: description.into(),
            provider_applies,
            ..Default::default()
        }
    }
}

impl Entity for Medium {
    const COLLECTION: &'static str = MEDIUMS;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// One valid pairing of an entertainment type and a medium.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMedium {
    /// Store-assigned identifier.
    #[serde(default)]
    pub id: RecordId,
    /// Entertainment type of the pair.
    pub type_id: RecordId,
    /// Medium of the pair.
    pub medium_id: RecordId,
    /// When the record was stored.
    #[serde(default)]
    pub created_at: Timestamp,
    /// When the record was last changed.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl TypeMedium {
    /// Creates an unsaved pairing.
    pub fn new(type_id: RecordId, medium_id: RecordId) -> Self {
        Self {
            type_id,
            medium_id,
            ..Default::default()
        }
    }
}

impl Entity for TypeMedium {
    const COLLECTION: &'static str = VALID_TYPE_MEDIUMS;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// A resolved type/medium pairing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidCombination {
    /// The type side of the pair.
    pub entertainment_type: EntertainmentType,
    /// The medium side of the pair.
    pub medium: Medium,
}

/// A title owned by a profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Store-assigned identifier.
    #[serde(default)]
    pub id: RecordId,

    /// Owning profile. Deleting the profile deletes the asset.
    pub profile_id: RecordId,

    /// Title as shown in listings.
    pub title: String,

    /// Free-form notes.
    #[serde(default)]
    pub description: String,

    /// When the record was stored.
    #[serde(default)]
    pub created_at: Timestamp,
    /// When the record was last changed.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Asset {
    /// Creates an unsaved asset for a profile.
    pub fn new(profile_id: RecordId, title: impl Into<String>) -> Self {
        Self {
            profile_id,
            title: title.into(),
            ..Default::default()
        }
    }

    /// Sets the description (builder style).
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Entity for Asset {
    const COLLECTION: &'static str = ASSETS;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// One copy of an asset: its type, medium, provider and release year.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetData {
    /// Store-assigned identifier.
    #[serde(default)]
    pub id: RecordId,

    /// Asset this copy belongs to. Deleting the asset deletes the copy.
    pub asset_id: RecordId,

    /// Entertainment type of this copy.
    pub type_id: RecordId,
    /// Medium of this copy.
    pub medium_id: RecordId,

    /// Set only for mediums where a provider applies.
    #[serde(default)]
    pub provider_id: Option<RecordId>,

    /// Release year.
    #[serde(default)]
    pub year: i32,

    /// When the record was stored.
    #[serde(default)]
    pub created_at: Timestamp,
    /// When the record was last changed.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Entity for AssetData {
    const COLLECTION: &'static str = ASSET_DATA;

    fn id(&self) -> RecordId {
        self.id
    }
}
