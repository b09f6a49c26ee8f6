//! Media catalog: the domain collections and their default contents.
//!
//! Collections are created by schema steps (see [`crate::migration`]), so
//! which of them exist depends on the store's schema version:
//!
//! | Collection | Since |
//! |------------|-------|
//! | `profiles` | 00.01 |
//! | `base_entities` | 00.02 |
//! | `entertainment_types` | 00.03 |
//! | `providers`, `mediums`, `valid_type_mediums` | 00.05 |
//! | `assets`, `asset_data` | 00.06 |

pub mod seed;
pub mod types;
pub(crate) mod validation;

pub use types::{
    Asset, AssetData, BaseEntity, EntertainmentType, Medium, Profile, Provider, TypeMedium,
    ValidCombination,
};

/// User profiles.
pub const PROFILES: &str = "profiles";

/// Ownership records linking identifiers to profiles.
pub const BASE_ENTITIES: &str = "base_entities";

/// Entertainment types (movie, music, book).
pub const ENTERTAINMENT_TYPES: &str = "entertainment_types";

/// Providers (Vudu, Amazon, ...).
pub const PROVIDERS: &str = "providers";

/// Mediums (DVD, CD, digital, ...).
pub const MEDIUMS: &str = "mediums";

/// Valid type/medium pairs.
pub const VALID_TYPE_MEDIUMS: &str = "valid_type_mediums";

/// Owned titles.
pub const ASSETS: &str = "assets";

/// Per-copy asset details.
pub const ASSET_DATA: &str = "asset_data";
