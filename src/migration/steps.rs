//! Schema steps and the registry that orders them.
//!
//! A step is a forward-only change tagged with the version it introduces.
//! Steps are not idempotent on their own (creating a collection twice
//! fails); the engine's version gate makes sure each runs at most once per
//! store.
//!
//! | Version | Change |
//! |---------|--------|
//! | 00.01 | `profiles` |
//! | 00.02 | `base_entities`, cascading from `profiles` |
//! | 00.03 | `entertainment_types` (IDs shared with `base_entities`), seeded with `Movie` |
//! | 00.04 | timestamps on `profiles` and `entertainment_types` |
//! | 00.05 | `providers`, `mediums`, `valid_type_mediums` and default data |
//! | 00.06 | `assets`, `asset_data` |

use std::fmt;

use serde_json::Value;

use super::SchemaVersion;
use crate::catalog::seed::{
    default_types_for_medium, DEFAULT_MEDIUMS, DEFAULT_PROFILE, DEFAULT_PROVIDERS, DEFAULT_TYPES,
};
use crate::catalog::{
    EntertainmentType, Medium, Profile, Provider, TypeMedium, ASSETS, ASSET_DATA, BASE_ENTITIES,
    ENTERTAINMENT_TYPES, MEDIUMS, PROFILES, PROVIDERS, VALID_TYPE_MEDIUMS,
};
use crate::error::{MigrationError, Result};
use crate::storage::schema::ID_FIELD;
use crate::storage::{CollectionSchema, FieldDef, ForeignKey, StoreWriter};

/// Boxed step action.
pub type StepFn = Box<dyn Fn(&StoreWriter<'_>) -> Result<()> + Send + Sync>;

/// One forward-only schema change.
pub struct SchemaStep {
    /// Version the store is at once this step has run.
    pub version: SchemaVersion,

    /// What the step does, for logs.
    pub description: &'static str,

    apply: StepFn,
}

impl SchemaStep {
    /// Creates a step.
    pub fn new(
        version: SchemaVersion,
        description: &'static str,
        apply: impl Fn(&StoreWriter<'_>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            version,
            description,
            apply: Box::new(apply),
        }
    }

    /// Runs the step inside the caller's write transaction.
    pub fn apply(&self, writer: &StoreWriter<'_>) -> Result<()> {
        (self.apply)(writer)
    }
}

impl fmt::Debug for SchemaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaStep")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Steps in strictly ascending version order.
#[derive(Debug)]
pub struct StepRegistry {
    steps: Vec<SchemaStep>,
}

impl StepRegistry {
    /// Builds a registry from steps already in version order.
    ///
    /// # Errors
    /// Returns `MigrationError::UnorderedSteps` if a version is `00.00`,
    /// repeats, or is lower than the one before it.
    pub fn new(steps: Vec<SchemaStep>) -> std::result::Result<Self, MigrationError> {
        let mut previous = SchemaVersion::ZERO;
        for step in &steps {
            if step.version <= previous {
                return Err(MigrationError::UnorderedSteps {
                    previous,
                    next: step.version,
                });
            }
            previous = step.version;
        }
        Ok(Self { steps })
    }

    /// The built-in catalog steps.
    pub fn standard() -> Self {
        Self {
            steps: standard_steps(),
        }
    }

    /// Highest registered version, or `00.00` when empty.
    pub fn latest(&self) -> SchemaVersion {
        self.steps
            .last()
            .map(|step| step.version)
            .unwrap_or(SchemaVersion::ZERO)
    }

    /// All steps, in order.
    pub fn steps(&self) -> &[SchemaStep] {
        &self.steps
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no steps are registered.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps an init to `target` applies: every step `<= target`.
    pub fn up_to(&self, target: SchemaVersion) -> impl Iterator<Item = &SchemaStep> {
        self.steps.iter().filter(move |step| step.version <= target)
    }

    /// Steps a migration applies: every step with
    /// `current < version <= target`.
    pub fn between(
        &self,
        current: SchemaVersion,
        target: SchemaVersion,
    ) -> impl Iterator<Item = &SchemaStep> {
        self.steps
            .iter()
            .filter(move |step| current < step.version && step.version <= target)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Standard steps
// ============================================================================

fn standard_steps() -> Vec<SchemaStep> {
    vec![
        SchemaStep::new(
            SchemaVersion::from_hundredths(1),
            "create profiles",
            create_profiles,
        ),
        SchemaStep::new(
            SchemaVersion::from_hundredths(2),
            "create base entities",
            create_base_entities,
        ),
        SchemaStep::new(
            SchemaVersion::from_hundredths(3),
            "create entertainment types",
            create_entertainment_types,
        ),
        SchemaStep::new(
            SchemaVersion::from_hundredths(4),
            "timestamp profiles and entertainment types",
            add_timestamps,
        ),
        SchemaStep::new(
            SchemaVersion::from_hundredths(5),
            "create providers and mediums, seed defaults",
            create_mediums_and_providers,
        ),
        SchemaStep::new(
            SchemaVersion::from_hundredths(6),
            "create assets",
            create_assets,
        ),
    ]
}

fn create_profiles(w: &StoreWriter<'_>) -> Result<()> {
    w.create_collection(CollectionSchema::new(PROFILES).field(FieldDef::text("username")))
}

fn create_base_entities(w: &StoreWriter<'_>) -> Result<()> {
    w.create_collection(
        CollectionSchema::new(BASE_ENTITIES)
            .timestamps()
            .field(FieldDef::reference("profile_id"))
            .foreign_key(ForeignKey::cascade("profile_id", PROFILES)),
    )
}

fn create_entertainment_types(w: &StoreWriter<'_>) -> Result<()> {
    w.create_collection(
        CollectionSchema::new(ENTERTAINMENT_TYPES)
            .field(FieldDef::text("description"))
            .foreign_key(ForeignKey::cascade(ID_FIELD, BASE_ENTITIES)),
    )?;
    w.insert(&EntertainmentType::new("Movie"))?;
    Ok(())
}

fn add_timestamps(w: &StoreWriter<'_>) -> Result<()> {
    for collection in [PROFILES, ENTERTAINMENT_TYPES] {
        w.add_field(collection, FieldDef::created_at(), Value::Null)?;
        w.add_field(collection, FieldDef::updated_at(), Value::Null)?;
    }
    Ok(())
}

fn create_mediums_and_providers(w: &StoreWriter<'_>) -> Result<()> {
    w.create_collection(
        CollectionSchema::new(PROVIDERS)
            .field(FieldDef::text("description"))
            .timestamps(),
    )?;
    w.create_collection(
        CollectionSchema::new(MEDIUMS)
            .field(FieldDef::text("description"))
            .field(FieldDef::boolean("provider_applies"))
            .timestamps(),
    )?;
    w.create_collection(
        CollectionSchema::new(VALID_TYPE_MEDIUMS)
            .field(FieldDef::reference("type_id"))
            .field(FieldDef::reference("medium_id"))
            .timestamps()
            .foreign_key(ForeignKey::cascade("type_id", ENTERTAINMENT_TYPES))
            .foreign_key(ForeignKey::cascade("medium_id", MEDIUMS)),
    )?;

    seed_defaults(w)
}

fn create_assets(w: &StoreWriter<'_>) -> Result<()> {
    w.create_collection(
        CollectionSchema::new(ASSETS)
            .field(FieldDef::reference("profile_id"))
            .field(FieldDef::text("title"))
            .field(FieldDef::text("description"))
            .timestamps()
            .foreign_key(ForeignKey::cascade("profile_id", PROFILES)),
    )?;
    w.create_collection(
        CollectionSchema::new(ASSET_DATA)
            .field(FieldDef::reference("asset_id"))
            .field(FieldDef::reference("type_id"))
            .field(FieldDef::reference("medium_id"))
            .field(FieldDef::reference("provider_id"))
            .field(FieldDef::integer("year"))
            .timestamps()
            .foreign_key(ForeignKey::cascade("asset_id", ASSETS)),
    )
}

/// Writes the default profile, types, providers, mediums and type/medium
/// matrix. Rows that already exist (by name) are left alone.
fn seed_defaults(w: &StoreWriter<'_>) -> Result<()> {
    let has_default_profile = w
        .find_one(|p: &Profile| p.username.eq_ignore_ascii_case(DEFAULT_PROFILE))?
        .is_some();
    if !has_default_profile {
        w.insert(&Profile::new(DEFAULT_PROFILE))?;
    }

    let mut types = Vec::with_capacity(DEFAULT_TYPES.len());
    for name in DEFAULT_TYPES {
        let existing =
            w.find_one(|t: &EntertainmentType| t.description.eq_ignore_ascii_case(name))?;
        let stored = match existing {
            Some(stored) => stored,
            None => w.insert(&EntertainmentType::new(name))?,
        };
        types.push(stored);
    }

    for name in DEFAULT_PROVIDERS {
        w.insert(&Provider::new(name))?;
    }

    for (name, provider_applies) in DEFAULT_MEDIUMS {
        let medium = w.insert(&Medium::new(name, provider_applies))?;
        for type_name in default_types_for_medium(name) {
            let Some(entertainment_type) = types
                .iter()
                .find(|t| t.description.eq_ignore_ascii_case(type_name))
            else {
                continue;
            };
            w.insert(&TypeMedium::new(entertainment_type.id, medium.id))?;
        }
    }

    Ok(())
}
