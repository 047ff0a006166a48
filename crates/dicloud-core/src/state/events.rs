//! Normalized state events.
//!
//! Every ingestion path (REST adapters, push listener, optimistic command
//! overlays) reduces its payload to one of these before touching the store.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Where an observation came from. Determines merge precedence together
/// with the observation timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Rest,
    Push,
    Optimistic,
}

/// Named slice of per-vehicle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Realtime,
    Hvac,
    Charging,
    Gps,
    Energy,
}

/// A single field mutation: observed value, or an explicit clear produced
/// by sentinel normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPatch {
    Set(Value),
    Clear,
}

impl FieldPatch {
    /// Convenience for normalized optionals: `None` clears the field.
    #[must_use]
    pub fn from_option<T: Into<Value>>(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Set(v.into()),
            None => Self::Clear,
        }
    }
}

/// A normalized update for one (vin, section).
#[derive(Debug, Clone)]
pub struct StateEvent {
    pub vin: String,
    pub section: Section,
    pub origin: Origin,
    /// When the payload claims the data was observed (epoch ms). Falls back
    /// to receive time when the payload carries no timestamp.
    pub observed_at_ms: i64,
    pub fields: BTreeMap<String, FieldPatch>,
}

impl StateEvent {
    #[must_use]
    pub fn new(vin: impl Into<String>, section: Section, origin: Origin, observed_at_ms: i64) -> Self {
        Self {
            vin: vin.into(),
            section,
            origin,
            observed_at_ms,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, patch: FieldPatch) -> Self {
        self.fields.insert(key.into(), patch);
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: BTreeMap<String, FieldPatch>) -> Self {
        self.fields.extend(fields);
        self
    }
}
