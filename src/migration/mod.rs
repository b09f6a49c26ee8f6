//! Schema versioning and migration.
//!
//! A store records its schema version in the version ledger. The
//! [`Migrator`] brings a store to a requested version by running the
//! registered [`SchemaStep`]s the store hasn't seen yet.
//!
//! # Modes
//!
//! ```text
//! init     ledger := target, then every step <= target
//!          (all in one write transaction)
//!
//! migrate  for each step with current < step <= target:
//!              apply step, ledger := step    (one write transaction each)
//! ```
//!
//! Init is used for a store that didn't exist (or was deleted on request);
//! migrate for everything else. A failing step aborts the run: in migrate
//! mode the ledger keeps the version of the last step that committed, in
//! init mode nothing of the run is kept.
//!
//! # Example
//!
//! ```rust
//! use entertainme::{Migrator, MigratorConfig, StoreLocation};
//!
//! let migrator = Migrator::new(MigratorConfig::default());
//! let result = migrator.perform_migration(true, Some(&StoreLocation::InMemory), Some("00.03"));
//! assert!(result.success);
//! assert_eq!(result.message, "00.03");
//! ```

pub mod ledger;
pub mod steps;
mod version;

pub use ledger::{VersionRecord, DATABASE_SECTION};
pub use steps::{SchemaStep, StepFn, StepRegistry};
pub use version::SchemaVersion;

use tracing::{debug, info, instrument, warn};

use crate::config::{MigratorConfig, StoreLocation};
use crate::error::{EntertainMeError, MigrationError, Result};
use crate::storage::RedbStore;

/// Version of the newest built-in schema step.
pub const LATEST_VERSION: SchemaVersion = SchemaVersion::from_hundredths(6);

/// What a successful run did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Ledger version before the run. For init, the requested version.
    pub previous: SchemaVersion,

    /// Ledger version after the run.
    pub current: SchemaVersion,

    /// Versions of the steps applied, in order.
    pub applied: Vec<SchemaVersion>,

    /// Whether the run created the store.
    pub initialized: bool,
}

impl MigrationOutcome {
    /// Returns true if the ledger moved forward.
    pub fn migration_occurred(&self) -> bool {
        self.current > self.previous
    }
}

/// Flat result of [`Migrator::perform_migration`].
///
/// `message` holds the resulting version (`NN.NN`) on success and the
/// error text on failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationResult {
    /// Whether the run completed.
    pub success: bool,

    /// Whether the ledger version moved forward.
    pub migration_occurred: bool,

    /// Resulting version or error text.
    pub message: String,
}

impl MigrationResult {
    /// Builds a failed result from an error.
    pub fn failure(err: &EntertainMeError) -> Self {
        Self {
            success: false,
            migration_occurred: false,
            message: err.to_string(),
        }
    }
}

impl From<&MigrationOutcome> for MigrationResult {
    fn from(outcome: &MigrationOutcome) -> Self {
        Self {
            success: true,
            migration_occurred: outcome.migration_occurred(),
            message: outcome.current.to_string(),
        }
    }
}

impl From<Result<MigrationOutcome>> for MigrationResult {
    fn from(result: Result<MigrationOutcome>) -> Self {
        match result {
            Ok(outcome) => Self::from(&outcome),
            Err(err) => Self::failure(&err),
        }
    }
}

/// Migration engine.
///
/// Holds default inputs and the step registry. Each call acquires the
/// store, runs the steps and releases the store again before returning.
#[derive(Debug)]
pub struct Migrator {
    config: MigratorConfig,
    registry: StepRegistry,
}

impl Migrator {
    /// Creates an engine with the built-in steps.
    pub fn new(config: MigratorConfig) -> Self {
        Self::with_registry(config, StepRegistry::standard())
    }

    /// Creates an engine with a custom step registry.
    pub fn with_registry(config: MigratorConfig, registry: StepRegistry) -> Self {
        Self { config, registry }
    }

    /// Returns the engine's default inputs.
    #[inline]
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Returns the step registry.
    #[inline]
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Highest version this engine can migrate to.
    pub fn latest_version(&self) -> SchemaVersion {
        self.registry.latest()
    }

    /// Brings the store at `location` to `target`.
    ///
    /// `location` and `target` fall back to the engine's config. Never
    /// fails: errors are folded into the returned [`MigrationResult`].
    /// Use [`run`](Self::run) for the typed outcome.
    pub fn perform_migration(
        &self,
        init: bool,
        location: Option<&StoreLocation>,
        target: Option<&str>,
    ) -> MigrationResult {
        MigrationResult::from(self.run(init, location, target))
    }

    /// Typed form of [`perform_migration`](Self::perform_migration).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - location or target is missing, or the target is malformed or newer
    ///   than the latest step (nothing is touched)
    /// - the store can't be deleted, created or opened
    /// - a step fails
    #[instrument(skip(self, location, target))]
    pub fn run(
        &self,
        init: bool,
        location: Option<&StoreLocation>,
        target: Option<&str>,
    ) -> Result<MigrationOutcome> {
        let result = self.run_inner(init, location, target);
        match &result {
            Ok(outcome) => info!(
                previous = %outcome.previous,
                current = %outcome.current,
                applied = outcome.applied.len(),
                "Migration finished"
            ),
            Err(e) => warn!(error = %e, "Migration failed"),
        }
        result
    }

    fn run_inner(
        &self,
        init: bool,
        location: Option<&StoreLocation>,
        target: Option<&str>,
    ) -> Result<MigrationOutcome> {
        let (location, target) = self.resolve(location, target)?;
        let (store, created) = Self::acquire_store(&location, init)?;

        let init = init || created;
        match self.migrate_store(&store, init, target) {
            Err(e) if init => {
                Self::discard_store(store);
                Err(e)
            }
            outcome => {
                store.close()?;
                outcome
            }
        }
    }

    /// Applies config fallbacks and validates the inputs.
    fn resolve(
        &self,
        location: Option<&StoreLocation>,
        target: Option<&str>,
    ) -> Result<(StoreLocation, SchemaVersion)> {
        let location = location.or(self.config.location.as_ref());
        let target = target
            .or(self.config.target_version.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let (location, target) = match (location, target) {
            (Some(location), Some(target)) if location.validate().is_ok() => (location, target),
            _ => return Err(MigrationError::MissingConfiguration.into()),
        };

        let target = SchemaVersion::parse(target)
            .map_err(|e| EntertainMeError::config(format!("target version: {}", e)))?;
        let latest = self.registry.latest();
        if target > latest {
            return Err(MigrationError::UnknownTargetVersion {
                requested: target,
                latest,
            }
            .into());
        }

        Ok((location.clone(), target))
    }

    /// Opens the store, deleting it first when `init` is set.
    ///
    /// Returns the store and whether it was created by this call.
    pub(crate) fn acquire_store(location: &StoreLocation, init: bool) -> Result<(RedbStore, bool)> {
        let acquire = || -> Result<(RedbStore, bool)> {
            if init && RedbStore::exists(location) {
                info!(location = %location, "Deleting existing store for init");
                RedbStore::delete(location)?;
            }
            let created = !RedbStore::exists(location);
            let store = RedbStore::open(location)?;
            Ok((store, created))
        };

        acquire().map_err(|e| MigrationError::store_acquisition(e).into())
    }

    /// Closes a store whose init failed and removes its file, so the next
    /// open starts over instead of finding a store without a ledger.
    pub(crate) fn discard_store(store: RedbStore) {
        let location = store.location().clone();
        if let Err(e) = store.close().and_then(|()| RedbStore::delete(&location)) {
            warn!(location = %location, error = %e, "Failed to remove store after failed init");
        }
    }

    /// Runs the migration on an already open store.
    ///
    /// `init` must only be set for a store without a ledger record.
    pub(crate) fn migrate_store(
        &self,
        store: &RedbStore,
        init: bool,
        target: SchemaVersion,
    ) -> Result<MigrationOutcome> {
        if init {
            self.init_store(store, target)
        } else {
            self.upgrade_store(store, target)
        }
    }

    fn init_store(&self, store: &RedbStore, target: SchemaVersion) -> Result<MigrationOutcome> {
        info!(mode = "init", target = %target, "Initializing store");

        let applied = store.write(|w| {
            w.create_version(DATABASE_SECTION, target)?;

            let mut applied = Vec::new();
            for step in self.registry.up_to(target) {
                debug!(mode = "init", version = %step.version, step = step.description, "Applying step");
                step.apply(w)
                    .map_err(|e| MigrationError::step_failed(step.version, e))?;
                applied.push(step.version);
            }
            Ok(applied)
        })?;

        let current = Self::ledger_version(store)?;
        info!(mode = "init", version = %current, steps = applied.len(), "Store initialized");

        Ok(MigrationOutcome {
            previous: target,
            current,
            applied,
            initialized: true,
        })
    }

    fn upgrade_store(&self, store: &RedbStore, target: SchemaVersion) -> Result<MigrationOutcome> {
        let previous = Self::ledger_version(store)?;
        info!(mode = "migrate", from = %previous, to = %target, "Migrating store");

        if target < previous {
            warn!(
                current = %previous,
                requested = %target,
                "Requested version is older than the store; nothing to do"
            );
        }

        let mut applied = Vec::new();
        for step in self.registry.between(previous, target) {
            store
                .write(|w| {
                    step.apply(w)?;
                    w.write_version(DATABASE_SECTION, step.version)
                })
                .map_err(|e| MigrationError::step_failed(step.version, e))?;

            info!(mode = "migrate", version = %step.version, step = step.description, "Step applied");
            applied.push(step.version);
        }

        let current = Self::ledger_version(store)?;
        Ok(MigrationOutcome {
            previous,
            current,
            applied,
            initialized: false,
        })
    }

    fn ledger_version(store: &RedbStore) -> Result<SchemaVersion> {
        store
            .read_version(DATABASE_SECTION)?
            .ok_or_else(|| MigrationError::LedgerMissing(DATABASE_SECTION.to_string()).into())
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new(MigratorConfig::default())
    }
}
