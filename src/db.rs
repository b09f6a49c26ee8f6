//! Repository: the catalog handle applications work with.
//!
//! The [`Repository`] struct owns an open store that has been brought to
//! the configured schema version. It provides methods for:
//!
//! - Opening (with store acquisition and migration) and closing
//! - Upgrading the held store to the latest schema
//! - Profiles, entertainment types, providers and mediums
//! - Valid type/medium combinations
//! - Assets and per-copy asset data
//!
//! # Quick Start
//!
//! ```rust
//! use entertainme::{Asset, Repository, RepositoryConfig};
//!
//! # fn main() -> entertainme::Result<()> {
//! // Fresh store at the latest schema
//! let repo = Repository::open(RepositoryConfig::in_memory())?;
//!
//! let profile = repo.profile_by_name("default")?.expect("seeded");
//! let asset = repo.save_asset(&Asset::new(profile.id, "Heat"))?;
//! assert_eq!(repo.assets_for_profile(profile.id)?, vec![asset]);
//!
//! let mediums = repo.valid_mediums_for_type("Movie")?;
//! assert_eq!(mediums.len(), 3); // DVD, Digital, Video Cassette
//!
//! repo.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Saving
//!
//! `save_*` methods insert when the entity's `id` is unassigned (zero) and
//! update by id otherwise. Either way the stored entity is returned, with
//! its id and timestamps filled in.

use tracing::{debug, info, instrument};

use crate::catalog::validation::{
    validate_asset, validate_asset_data, validate_entertainment_type, validate_medium,
    validate_profile, validate_provider,
};
use crate::catalog::{
    Asset, AssetData, EntertainmentType, Medium, Profile, Provider, TypeMedium, ValidCombination,
    ASSETS, PROFILES,
};
use crate::config::{MigratorConfig, RepositoryConfig};
use crate::error::{NotFoundError, Result, ValidationError};
use crate::migration::{MigrationOutcome, MigrationResult, Migrator, SchemaVersion};
use crate::storage::{Entity, RedbStore};
use crate::types::RecordId;

/// Case-insensitive name comparison used by all `*_by_name` lookups.
fn names_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// The main EntertainMe catalog handle.
///
/// Create one with [`Repository::open()`] and release it with
/// [`Repository::close()`] (or by dropping it).
///
/// # Ownership
///
/// The repository holds its store open for its whole lifetime, so no
/// other handle can open the same file meanwhile.
#[derive(Debug)]
pub struct Repository {
    /// Open store.
    store: RedbStore,

    /// Engine used for upgrades of the held store.
    migrator: Migrator,

    /// Configuration used to open this repository.
    config: RepositoryConfig,

    /// Schema version of the store.
    current_version: SchemaVersion,

    /// Whether the last migration moved the schema version.
    migration_occurred: bool,
}

impl Repository {
    /// Opens a repository, creating or migrating the store as needed.
    ///
    /// - A missing store (or any store when `hard_init` is set) is created
    ///   and initialized at `target_version`.
    /// - An existing store older than `target_version` is migrated to it.
    /// - With `auto_migrate`, the store is then upgraded to the latest
    ///   known version.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration is invalid (see [`RepositoryConfig::validate`])
    /// - The store can't be deleted, created or opened
    /// - An existing store has no version record
    /// - A schema step fails
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use entertainme::{Repository, RepositoryConfig, StoreLocation};
    ///
    /// let repo = Repository::open(RepositoryConfig {
    ///     location: StoreLocation::path("./catalog.db"),
    ///     auto_migrate: true,
    ///     ..Default::default()
    /// })?;
    /// ```
    #[instrument(skip(config), fields(location = %config.location))]
    pub fn open(config: RepositoryConfig) -> Result<Self> {
        config.validate()?;

        info!("Opening repository");

        let migrator = Migrator::new(MigratorConfig::new(
            config.location.clone(),
            config.target_version.to_string(),
        ));

        let (store, created) = Migrator::acquire_store(&config.location, config.hard_init)?;
        let init = config.hard_init || created;
        let outcome = match migrator.migrate_store(&store, init, config.target_version) {
            Ok(outcome) => outcome,
            Err(e) => {
                if init {
                    Migrator::discard_store(store);
                }
                return Err(e);
            }
        };

        let mut repo = Self {
            store,
            migrator,
            current_version: outcome.current,
            migration_occurred: outcome.migration_occurred(),
            config,
        };

        if repo.config.auto_migrate {
            let latest = repo.migrator.latest_version();
            let upgrade = repo.migrator.migrate_store(&repo.store, false, latest)?;
            let moved = repo.migration_occurred || upgrade.migration_occurred();
            repo.record(&upgrade);
            repo.migration_occurred = moved;
        }

        info!(
            version = %repo.current_version,
            initialized = outcome.initialized,
            migration_occurred = repo.migration_occurred,
            "Repository opened"
        );

        Ok(repo)
    }

    /// Closes the repository, releasing the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend reports a flush failure.
    #[instrument(skip(self))]
    pub fn close(self) -> Result<()> {
        info!("Closing repository");
        self.store.close()?;
        info!("Repository closed");
        Ok(())
    }

    /// Upgrades the held store to the latest known schema version.
    ///
    /// Runs on the already open store. Errors are folded into the result.
    #[instrument(skip(self))]
    pub fn migrate_database(&mut self) -> MigrationResult {
        let latest = self.migrator.latest_version();
        let result = self.migrator.migrate_store(&self.store, false, latest);
        if let Ok(outcome) = &result {
            self.record(outcome);
        }
        MigrationResult::from(result)
    }

    fn record(&mut self, outcome: &MigrationOutcome) {
        self.current_version = outcome.current;
        self.migration_occurred = outcome.migration_occurred();
    }

    /// Returns the configuration used to open this repository.
    #[inline]
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Returns the schema version of the held store.
    #[inline]
    pub fn current_version(&self) -> SchemaVersion {
        self.current_version
    }

    /// Returns true if the last migration moved the schema version.
    #[inline]
    pub fn migration_occurred(&self) -> bool {
        self.migration_occurred
    }

    /// Returns the underlying store for direct collection access.
    #[inline]
    pub fn store(&self) -> &RedbStore {
        &self.store
    }

    /// Inserts or updates an entity and returns it as stored.
    fn save<E: Entity>(&self, entity: &E) -> Result<E> {
        if entity.id().is_unassigned() {
            let stored = self.store.insert(entity)?;
            debug!(collection = E::COLLECTION, id = %stored.id(), "Entity inserted");
            return Ok(stored);
        }

        self.store.write(|w| {
            w.update_existing(entity)?;
            w.get::<E>(entity.id())?
                .ok_or_else(|| NotFoundError::document(E::COLLECTION, entity.id()).into())
        })
    }

    fn require<E: Entity>(&self, id: RecordId) -> Result<E> {
        self.store
            .get::<E>(id)?
            .ok_or_else(|| NotFoundError::document(E::COLLECTION, id).into())
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Inserts or updates a profile.
    pub fn save_profile(&self, profile: &Profile) -> Result<Profile> {
        validate_profile(profile)?;
        self.save(profile)
    }

    /// Looks up a profile by username (case-insensitive).
    pub fn profile_by_name(&self, username: &str) -> Result<Option<Profile>> {
        self.store
            .find_one(|p: &Profile| names_match(&p.username, username))
    }

    /// Returns every profile.
    pub fn profiles(&self) -> Result<Vec<Profile>> {
        self.store.all()
    }

    /// Deletes a profile and everything owned by it.
    ///
    /// Returns the number of documents removed, the profile included.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` if no profile has the given id.
    #[instrument(skip(self))]
    pub fn delete_profile(&self, id: RecordId) -> Result<u64> {
        let removed = self.store.delete_document(PROFILES, id)?;
        if removed == 0 {
            return Err(NotFoundError::document(PROFILES, id).into());
        }
        info!(removed, "Profile deleted");
        Ok(removed)
    }

    // =========================================================================
    // Entertainment types
    // =========================================================================

    /// Returns every entertainment type.
    pub fn entertainment_types(&self) -> Result<Vec<EntertainmentType>> {
        self.store.all()
    }

    /// Looks up an entertainment type by description (case-insensitive).
    pub fn entertainment_type_by_name(&self, name: &str) -> Result<Option<EntertainmentType>> {
        self.store
            .find_one(|t: &EntertainmentType| names_match(&t.description, name))
    }

    /// Inserts or updates an entertainment type.
    pub fn save_entertainment_type(
        &self,
        entertainment_type: &EntertainmentType,
    ) -> Result<EntertainmentType> {
        validate_entertainment_type(entertainment_type)?;
        self.save(entertainment_type)
    }

    // =========================================================================
    // Providers
    // =========================================================================

    /// Returns every provider.
    pub fn providers(&self) -> Result<Vec<Provider>> {
        self.store.all()
    }

    /// Looks up a provider by description (case-insensitive).
    pub fn provider_by_name(&self, name: &str) -> Result<Option<Provider>> {
        self.store
            .find_one(|p: &Provider| names_match(&p.description, name))
    }

    /// Inserts or updates a provider.
    pub fn save_provider(&self, provider: &Provider) -> Result<Provider> {
        validate_provider(provider)?;
        self.save(provider)
    }

    // =========================================================================
    // Mediums
    // =========================================================================

    /// Returns every medium.
    pub fn mediums(&self) -> Result<Vec<Medium>> {
        self.store.all()
    }

    /// Looks up a medium by description (case-insensitive).
    pub fn medium_by_name(&self, name: &str) -> Result<Option<Medium>> {
        self.store
            .find_one(|m: &Medium| names_match(&m.description, name))
    }

    /// Inserts or updates a medium.
    pub fn save_medium(&self, medium: &Medium) -> Result<Medium> {
        validate_medium(medium)?;
        self.save(medium)
    }

    // =========================================================================
    // Valid combinations
    // =========================================================================

    /// Returns the mediums a type can come in.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` if no type has the given name.
    pub fn valid_mediums_for_type(&self, type_name: &str) -> Result<Vec<Medium>> {
        let entertainment_type = self
            .entertainment_type_by_name(type_name)?
            .ok_or_else(|| NotFoundError::named("Entertainment type", type_name))?;

        let medium_ids: Vec<RecordId> = self
            .store
            .find(|pair: &TypeMedium| pair.type_id == entertainment_type.id)?
            .into_iter()
            .map(|pair| pair.medium_id)
            .collect();

        self.store
            .find(|m: &Medium| medium_ids.contains(&m.id))
    }

    /// Returns the types a medium can hold.
    ///
    /// # Errors
    ///
    /// Returns `NotFoundError` if no medium has the given name.
    pub fn valid_types_for_medium(&self, medium_name: &str) -> Result<Vec<EntertainmentType>> {
        let medium = self
            .medium_by_name(medium_name)?
            .ok_or_else(|| NotFoundError::named("Medium", medium_name))?;

        let type_ids: Vec<RecordId> = self
            .store
            .find(|pair: &TypeMedium| pair.medium_id == medium.id)?
            .into_iter()
            .map(|pair| pair.type_id)
            .collect();

        self.store
            .find(|t: &EntertainmentType| type_ids.contains(&t.id))
    }

    /// Returns every valid type/medium pair, resolved.
    ///
    /// Pairs pointing at a missing type or medium are skipped.
    pub fn valid_combinations(&self) -> Result<Vec<ValidCombination>> {
        let types: Vec<EntertainmentType> = self.store.all()?;
        let mediums: Vec<Medium> = self.store.all()?;

        let pairs: Vec<TypeMedium> = self.store.all()?;
        let combinations = pairs
            .into_iter()
            .filter_map(|pair| {
                let entertainment_type = types.iter().find(|t| t.id == pair.type_id)?;
                let medium = mediums.iter().find(|m| m.id == pair.medium_id)?;
                Some(ValidCombination {
                    entertainment_type: entertainment_type.clone(),
                    medium: medium.clone(),
                })
            })
            .collect();
        Ok(combinations)
    }

    /// Returns true if the type may come in the medium.
    pub fn is_valid_combination(&self, type_id: RecordId, medium_id: RecordId) -> Result<bool> {
        Ok(self
            .store
            .find_one(|pair: &TypeMedium| pair.type_id == type_id && pair.medium_id == medium_id)?
            .is_some())
    }

    // =========================================================================
    // Assets
    // =========================================================================

    /// Inserts or updates an asset.
    ///
    /// # Errors
    ///
    /// Returns an error if the title is empty or the owning profile
    /// doesn't exist.
    pub fn save_asset(&self, asset: &Asset) -> Result<Asset> {
        validate_asset(asset)?;
        self.require::<Profile>(asset.profile_id)?;
        self.save(asset)
    }

    /// Returns the assets owned by a profile.
    pub fn assets_for_profile(&self, profile_id: RecordId) -> Result<Vec<Asset>> {
        self.store.find(|a: &Asset| a.profile_id == profile_id)
    }

    /// Deletes an asset and its asset data.
    ///
    /// Returns the number of documents removed.
    pub fn delete_asset(&self, id: RecordId) -> Result<u64> {
        let removed = self.store.delete_document(ASSETS, id)?;
        if removed == 0 {
            return Err(NotFoundError::document(ASSETS, id).into());
        }
        Ok(removed)
    }

    /// Inserts or updates a copy of an asset.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the asset, type, medium or provider doesn't exist
    /// - the type doesn't come in the medium
    /// - a provider is given for a medium that doesn't take one
    pub fn save_asset_data(&self, data: &AssetData) -> Result<AssetData> {
        if data.medium_id.is_unassigned() {
            return Err(ValidationError::required_field("medium_id").into());
        }
        let medium = self.require::<Medium>(data.medium_id)?;
        validate_asset_data(data, &medium)?;

        self.require::<Asset>(data.asset_id)?;
        self.require::<EntertainmentType>(data.type_id)?;
        if let Some(provider_id) = data.provider_id {
            self.require::<Provider>(provider_id)?;
        }

        if !self.is_valid_combination(data.type_id, data.medium_id)? {
            return Err(ValidationError::invalid_field(
                "medium_id",
                format!(
                    "medium '{}' is not valid for type {}",
                    medium.description, data.type_id
                ),
            )
            .into());
        }

        self.save(data)
    }

    /// Returns the copies recorded for an asset.
    pub fn asset_data_for_asset(&self, asset_id: RecordId) -> Result<Vec<AssetData>> {
        self.store.find(|d: &AssetData| d.asset_id == asset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreLocation;
    use crate::migration::LATEST_VERSION;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let repo = Repository::open(RepositoryConfig::new(StoreLocation::path(&path))).unwrap();

        assert!(path.exists());
        assert_eq!(repo.current_version(), LATEST_VERSION);
        assert!(!repo.migration_occurred());

        repo.close().unwrap();
    }

    #[test]
    fn test_open_existing_store() {
        let dir = tempdir().unwrap();
        let config = RepositoryConfig::new(StoreLocation::path(dir.path().join("test.db")));

        let repo = Repository::open(config.clone()).unwrap();
        let profile = repo.save_profile(&Profile::new("kim")).unwrap();
        repo.close().unwrap();

        let repo = Repository::open(config).unwrap();
        assert_eq!(repo.profile_by_name("KIM").unwrap(), Some(profile));
        repo.close().unwrap();
    }

    #[test]
    fn test_config_validation() {
        let result = Repository::open(RepositoryConfig::new(StoreLocation::path("")));
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_names_match() {
        assert!(names_match("Video Cassette", "video cassette"));
        assert!(names_match(" DVD", "dvd "));
        assert!(!names_match("CD", "DVD"));
    }

    #[test]
    fn test_repository_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Repository>();
    }
}
