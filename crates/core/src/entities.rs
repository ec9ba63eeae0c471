//! Travel entities preserved across language switches

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of extracted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Any airport-code-like token
    AirportCode,
    Origin,
    Destination,
    /// ISO `YYYY-MM-DD` departure date
    Date,
    CabinClass,
    /// `"true"` when the user asked for nonstop flights
    Nonstop,
}

impl EntityKind {
    /// Kinds that hold a single current value (newest wins on merge)
    pub fn is_single_valued(&self) -> bool {
        !matches!(self, EntityKind::AirportCode)
    }
}

/// Map of entity kind to values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreservedEntities(BTreeMap<EntityKind, Vec<String>>);

impl PreservedEntities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value. Single-valued kinds are replaced; airport codes
    /// accumulate without duplicates.
    pub fn insert(&mut self, kind: EntityKind, value: impl Into<String>) {
        let value = value.into();
        let values = self.0.entry(kind).or_default();
        if kind.is_single_valued() {
            values.clear();
            values.push(value);
        } else if !values.contains(&value) {
            values.push(value);
        }
    }

    /// Merge newer entities into this set
    pub fn merge(&mut self, newer: &PreservedEntities) {
        for (kind, values) in &newer.0 {
            for value in values {
                self.insert(*kind, value.clone());
            }
        }
    }

    /// Most recent value for a kind
    pub fn get(&self, kind: EntityKind) -> Option<&str> {
        self.0.get(&kind).and_then(|v| v.last()).map(String::as_str)
    }

    pub fn values(&self, kind: EntityKind) -> &[String] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKind, &Vec<String>)> {
        self.0.iter()
    }
}
