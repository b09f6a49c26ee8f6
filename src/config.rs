//! Configuration types for EntertainMe.
//!
//! Nothing here is process-wide state: every engine and repository is built
//! from an explicit config value.
//!
//! - [`StoreLocation`] says where the store lives (a file or memory)
//! - [`MigratorConfig`] holds the defaults the migration engine falls back to
//! - [`RepositoryConfig`] controls what opening a repository does
//!
//! # Example
//! ```rust
//! use entertainme::{RepositoryConfig, StoreLocation};
//!
//! // Latest schema, store under the platform data directory
//! let config = RepositoryConfig::default();
//!
//! // Throwaway store for tests
//! let config = RepositoryConfig {
//!     location: StoreLocation::InMemory,
//!     ..Default::default()
//! };
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{EntertainMeError, ValidationError};
use crate::migration::{SchemaVersion, LATEST_VERSION};

/// Marker accepted by [`StoreLocation::from_str`] for an in-memory store.
pub const IN_MEMORY_MARKER: &str = ":memory:";

/// Default store file name inside the data directory.
pub const DEFAULT_STORE_FILE: &str = "entertainme.db";

/// Where a store lives.
///
/// Resolved once when an engine or repository is configured. An in-memory
/// store never exists before it is opened and vanishes when its handle is
/// dropped, so opening one always starts a fresh store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    /// A store file on disk.
    Path(PathBuf),

    /// A store held entirely in memory.
    InMemory,
}

impl StoreLocation {
    /// Creates a file-backed location.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Default on-disk location: `<data-local-dir>/entertainme/entertainme.db`.
    ///
    /// Falls back to the current directory when the platform reports no
    /// data directory.
    pub fn default_path() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::Path(base.join("entertainme").join(DEFAULT_STORE_FILE))
    }

    /// Returns the file path, or `None` for an in-memory store.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path.as_path()),
            Self::InMemory => None,
        }
    }

    /// Returns true for an in-memory store.
    pub fn is_in_memory(&self) -> bool {
        matches!(self, Self::InMemory)
    }

    /// Validates the location.
    ///
    /// # Errors
    /// Returns `ValidationError` if the path is empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Path(path) if path.as_os_str().is_empty() => {
                Err(ValidationError::required_field("store path"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for StoreLocation {
    fn default() -> Self {
        Self::default_path()
    }
}

impl FromStr for StoreLocation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::required_field("store path"));
        }
        if s == IN_MEMORY_MARKER {
            return Ok(Self::InMemory);
        }
        Ok(Self::Path(PathBuf::from(s)))
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::InMemory => f.write_str(IN_MEMORY_MARKER),
        }
    }
}

/// Defaults for the migration engine.
///
/// Both fields are optional: a [`Migrator`](crate::Migrator) call may supply
/// its own location and target, and falls back to these when it does not.
/// The target is kept as the raw string the caller handed in; it is parsed
/// when a migration runs so a malformed value surfaces as a failed
/// [`MigrationResult`](crate::MigrationResult) rather than a panic.
#[derive(Clone, Debug, Default)]
pub struct MigratorConfig {
    /// Store to migrate when a call names none.
    pub location: Option<StoreLocation>,

    /// Version to migrate to when a call names none (e.g. `"00.03"`).
    pub target_version: Option<String>,
}

impl MigratorConfig {
    /// Creates a config with both defaults set.
    pub fn new(location: StoreLocation, target_version: impl Into<String>) -> Self {
        Self {
            location: Some(location),
            target_version: Some(target_version.into()),
        }
    }
}

/// Repository construction options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use entertainme::{RepositoryConfig, SchemaVersion};
///
/// let config = RepositoryConfig {
///     target_version: SchemaVersion::from_hundredths(2),
///     auto_migrate: true,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct RepositoryConfig {
    /// Where the store lives.
    pub location: StoreLocation,

    /// Delete any existing store and start over.
    pub hard_init: bool,

    /// Version a newly created store is seeded at.
    ///
    /// Default: the latest registered version.
    pub target_version: SchemaVersion,

    /// After opening, upgrade an older store to the latest version.
    pub auto_migrate: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::default_path(),
            hard_init: false,
            target_version: LATEST_VERSION,
            auto_migrate: false,
        }
    }
}

impl RepositoryConfig {
    /// Creates a config for the given location with default settings.
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            ..Default::default()
        }
    }

    /// Creates a config for a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(StoreLocation::InMemory)
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `Repository::open()`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - the store path is empty
    /// - `target_version` is newer than the latest registered version
    pub fn validate(&self) -> Result<(), EntertainMeError> {
        self.location.validate()?;

        if self.target_version > LATEST_VERSION {
            return Err(ValidationError::invalid_field(
                "target_version",
                format!(
                    "{} is newer than the latest known version {}",
                    self.target_version, LATEST_VERSION
                ),
            )
            .into());
        }

        Ok(())
    }
}
