//! Store identifiers, per-store tables and index definitions.
//!
//! The set of stores is closed: every store the application persists is a
//! [`StoreId`] variant, and every per-store setting lives in a [`StoreTable`]
//! that has an entry for each variant by construction.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// Name of the reserved table that buffers pending operations.
pub const PENDING_OPERATIONS_TABLE: &str = "pending_operations";

/// Name of the reserved table holding operations that exhausted their retries.
pub const FAILED_OPERATIONS_TABLE: &str = "failed_operations";

/// Name of the index every store declares on its principal field.
pub const PRINCIPAL_INDEX: &str = "by_principal";

/// A domain store (table) in the local record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreId {
    Profiles,
    Workouts,
    ExerciseSets,
    DailyCheckins,
    BodyMetrics,
    Goals,
    TrainingPlans,
}

impl StoreId {
    /// Number of stores.
    pub const COUNT: usize = 7;

    /// Every store, in declaration order.
    pub const ALL: [StoreId; StoreId::COUNT] = [
        StoreId::Profiles,
        StoreId::Workouts,
        StoreId::ExerciseSets,
        StoreId::DailyCheckins,
        StoreId::BodyMetrics,
        StoreId::Goals,
        StoreId::TrainingPlans,
    ];

    /// Local store name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreId::Profiles => "profiles",
            StoreId::Workouts => "workouts",
            StoreId::ExerciseSets => "exerciseSets",
            StoreId::DailyCheckins => "dailyCheckins",
            StoreId::BodyMetrics => "bodyMetrics",
            StoreId::Goals => "goals",
            StoreId::TrainingPlans => "trainingPlans",
        }
    }

    /// Default name of the matching collection on the remote authority.
    pub fn remote_collection(&self) -> &'static str {
        match self {
            StoreId::Profiles => "user_profiles",
            StoreId::Workouts => "workout_sessions",
            StoreId::ExerciseSets => "exercise_sets",
            StoreId::DailyCheckins => "daily_checkins",
            StoreId::BodyMetrics => "body_metrics",
            StoreId::Goals => "fitness_goals",
            StoreId::TrainingPlans => "training_plans",
        }
    }

    fn position(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StoreId::ALL
            .into_iter()
            .find(|store| store.as_str() == s)
            .ok_or_else(|| Error::UnknownStore(s.to_string()))
    }
}

/// A total map from every [`StoreId`] to a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTable<T> {
    entries: [T; StoreId::COUNT],
}

impl<T> StoreTable<T> {
    /// Build a table by computing the entry for each store.
    pub fn from_fn(mut f: impl FnMut(StoreId) -> T) -> Self {
        Self {
            entries: std::array::from_fn(|i| f(StoreId::ALL[i])),
        }
    }

    /// Build a table with a fallible constructor, stopping at the first error.
    pub fn try_from_fn<E>(
        mut f: impl FnMut(StoreId) -> std::result::Result<T, E>,
    ) -> std::result::Result<Self, E> {
        let mut entries = Vec::with_capacity(StoreId::COUNT);
        for store in StoreId::ALL {
            entries.push(f(store)?);
        }
        match entries.try_into() {
            Ok(entries) => Ok(Self { entries }),
            Err(_) => unreachable!("exactly one entry is built per store"),
        }
    }

    /// Get the entry for a store.
    pub fn get(&self, store: StoreId) -> &T {
        &self.entries[store.position()]
    }

    /// Replace the entry for a store.
    pub fn set(&mut self, store: StoreId, value: T) {
        self.entries[store.position()] = value;
    }

    /// Iterate over `(store, entry)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (StoreId, &T)> {
        StoreId::ALL.into_iter().zip(self.entries.iter())
    }

    /// Map every entry into a new table.
    pub fn map<U>(&self, mut f: impl FnMut(StoreId, &T) -> U) -> StoreTable<U> {
        StoreTable::from_fn(|store| f(store, self.get(store)))
    }
}

impl<T: Clone> StoreTable<T> {
    /// A table with the same value for every store.
    pub fn filled(value: T) -> Self {
        Self::from_fn(|_| value.clone())
    }
}

impl<T> Index<StoreId> for StoreTable<T> {
    type Output = T;

    fn index(&self, store: StoreId) -> &T {
        self.get(store)
    }
}

impl<T> IndexMut<StoreId> for StoreTable<T> {
    fn index_mut(&mut self, store: StoreId) -> &mut T {
        &mut self.entries[store.position()]
    }
}

/// A secondary index over one or more top-level record fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its store
    pub name: String,
    /// Indexed fields, in key order
    pub fields: Vec<String>,
}

impl IndexDef {
    /// Create an index definition.
    ///
    /// Names and fields end up inside SQL identifiers and JSON paths, so they
    /// are restricted to `[A-Za-z0-9_]` and may not start with a digit.
    pub fn new(name: impl Into<String>, fields: &[&str]) -> Result<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(Error::InvalidIndex(name));
        }
        if fields.is_empty() {
            return Err(Error::InvalidIndex(name));
        }
        if let Some(bad) = fields.iter().find(|f| !is_identifier(f)) {
            return Err(Error::InvalidIndex(format!("{name}.{bad}")));
        }
        Ok(Self {
            name,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        })
    }

    /// Whether this index spans more than one field.
    pub fn is_composite(&self) -> bool {
        self.fields.len() > 1
    }

    /// Split a lookup value into one value per indexed field.
    ///
    /// Single-field indexes take a scalar; composite indexes take an array
    /// with exactly one element per field.
    pub fn key_parts<'a>(&self, value: &'a serde_json::Value) -> Result<Vec<&'a serde_json::Value>> {
        if !self.is_composite() {
            return Ok(vec![value]);
        }
        match value {
            serde_json::Value::Array(parts) if parts.len() == self.fields.len() => {
                Ok(parts.iter().collect())
            }
            serde_json::Value::Array(parts) => Err(Error::InvalidIndexValue {
                index: self.name.clone(),
                expected: self.fields.len(),
                got: parts.len(),
            }),
            _ => Err(Error::InvalidIndexValue {
                index: self.name.clone(),
                expected: self.fields.len(),
                got: 1,
            }),
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Declaration of a store: its secondary indexes and optional uniqueness
/// constraint beyond `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDefinition {
    /// The store being defined
    pub store: StoreId,
    /// Non-unique secondary indexes, including the principal index
    pub indexes: Vec<IndexDef>,
    /// At most one uniqueness constraint beyond the primary id
    pub unique: Option<IndexDef>,
}

impl StoreDefinition {
    /// Create a definition with only the principal index.
    pub fn new(store: StoreId, principal_field: &str) -> Result<Self> {
        Ok(Self {
            store,
            indexes: vec![IndexDef::new(PRINCIPAL_INDEX, &[principal_field])?],
            unique: None,
        })
    }

    /// Builder-style method to add a secondary index.
    pub fn with_index(mut self, name: &str, fields: &[&str]) -> Result<Self> {
        if self.index(name).is_some() {
            return Err(Error::InvalidIndex(format!("duplicate index {name}")));
        }
        self.indexes.push(IndexDef::new(name, fields)?);
        Ok(self)
    }

    /// Builder-style method to set the uniqueness constraint.
    pub fn with_unique(mut self, name: &str, fields: &[&str]) -> Result<Self> {
        if self.indexes.iter().any(|i| i.name == name) {
            return Err(Error::InvalidIndex(format!("duplicate index {name}")));
        }
        self.unique = Some(IndexDef::new(name, fields)?);
        Ok(self)
    }

    /// Look up an index (unique or not) by name.
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes
            .iter()
            .chain(self.unique.iter())
            .find(|i| i.name == name)
    }

    /// Look up an index by name, failing with [`Error::UnknownIndex`].
    pub fn require_index(&self, name: &str) -> Result<&IndexDef> {
        self.index(name).ok_or_else(|| Error::UnknownIndex {
            store: self.store.to_string(),
            index: name.to_string(),
        })
    }
}

/// Schema for the entire local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Field holding the owning principal on every record
    pub principal_field: String,
    /// Field holding the last-modified timestamp used for conflict checks
    pub last_modified_field: String,
    /// Definition for every store
    pub stores: StoreTable<StoreDefinition>,
}

impl Schema {
    /// The schema used by the Stride application.
    pub fn standard() -> Result<Self> {
        let principal = "userId";
        let stores = StoreTable::try_from_fn(|store| {
            let def = StoreDefinition::new(store, principal)?;
            match store {
                StoreId::Profiles => Ok(def),
                StoreId::Workouts => def
                    .with_index("by_date", &["date"])?
                    .with_index("by_status", &["status"]),
                StoreId::ExerciseSets => def.with_index("by_workout", &["workoutId"]),
                StoreId::DailyCheckins => def.with_unique("by_principal_date", &[principal, "date"]),
                StoreId::BodyMetrics => def.with_index("by_recorded_on", &["recordedOn"]),
                StoreId::Goals => def.with_index("by_status", &["status"]),
                StoreId::TrainingPlans => def.with_index("by_active", &["isActive"]),
            }
        })?;

        Ok(Self {
            principal_field: principal.to_string(),
            last_modified_field: "lastUpdated".to_string(),
            stores,
        })
    }

    /// Get a store definition.
    pub fn definition(&self, store: StoreId) -> &StoreDefinition {
        &self.stores[store]
    }
}
