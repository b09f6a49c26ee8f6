//! Input validation for catalog entities.
//!
//! Runs in the repository before anything reaches the store.

use crate::catalog::types::{Asset, AssetData, EntertainmentType, Medium, Profile, Provider};
use crate::error::{EntertainMeError, ValidationError};

/// Rejects empty or whitespace-only text.
fn require_text(field: &str, value: &str) -> Result<(), EntertainMeError> {
    if value.trim().is_empty() {
        return Err(ValidationError::required_field(field).into());
    }
    Ok(())
}

pub(crate) fn validate_profile(profile: &Profile) -> Result<(), EntertainMeError> {
    require_text("username", &profile.username)
}

pub(crate) fn validate_entertainment_type(
    entertainment_type: &EntertainmentType,
) -> Result<(), EntertainMeError> {
    require_text("description", &entertainment_type.description)
}

pub(crate) fn validate_provider(provider: &Provider) -> Result<(), EntertainMeError> {
    require_text("description", &provider.description)
}

pub(crate) fn validate_medium(medium: &Medium) -> Result<(), EntertainMeError> {
    require_text("description", &medium.description)
}

pub(crate) fn validate_asset(asset: &Asset) -> Result<(), EntertainMeError> {
    require_text("title", &asset.title)?;
    if asset.profile_id.is_unassigned() {
        return Err(ValidationError::required_field("profile_id").into());
    }
    Ok(())
}

/// Validates an [`AssetData`] row against the medium it names.
///
/// | Field | Constraint |
/// |-------|------------|
/// | `asset_id`, `type_id`, `medium_id` | Assigned |
/// | `provider_id` | Only when the medium takes a provider |
/// | `year` | Not negative |
pub(crate) fn validate_asset_data(
    data: &AssetData,
    medium: &Medium,
) -> Result<(), EntertainMeError> {
    for (field, id) in [
        ("asset_id", data.asset_id),
        ("type_id", data.type_id),
        ("medium_id", data.medium_id),
    ] {
        if id.is_unassigned() {
            return Err(ValidationError::required_field(field).into());
        }
    }

    if data.provider_id.is_some() && !medium.provider_applies {
        return Err(ValidationError::invalid_field(
            "provider_id",
            format!("medium '{}' does not take a provider", medium.description),
        )
        .into());
    }

    if data.year < 0 {
        return Err(ValidationError::invalid_field(
            "year",
            format!("must not be negative, got {}", data.year),
        )
        .into());
    }

    Ok(())
}
