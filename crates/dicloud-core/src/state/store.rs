//! Deterministic per-vehicle state store.
//!
//! The store is the single authority on merged vehicle state. REST and push
//! feed it observations; command success feeds it short-lived optimistic
//! overlays. Merge rules:
//!
//! - per field, a strictly newer `observed_at` wins; equal timestamps are
//!   broken by apply order (a monotonic sequence number)
//! - any non-optimistic update displaces an optimistic entry for the key
//! - sentinel-normalized clears remove the field under the same rules
//! - optimistic entries expire lazily at read time

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::events::{FieldPatch, Origin, Section, StateEvent};

#[derive(Debug, Clone)]
struct FieldEntry {
    value: Value,
    observed_at_ms: i64,
    seq: u64,
    origin: Origin,
    expires_at_ms: Option<i64>,
}

#[derive(Debug, Default)]
struct SectionState {
    fields: BTreeMap<String, FieldEntry>,
    updated_at_ms: Option<i64>,
    last_origin: Option<Origin>,
}

#[derive(Debug, Default)]
struct VehicleState {
    sections: HashMap<Section, SectionState>,
}

/// Owned view of a section with expired overlays removed.
#[derive(Debug, Clone, Default)]
pub struct SectionSnapshot {
    pub fields: BTreeMap<String, Value>,
    pub updated_at_ms: Option<i64>,
    pub last_origin: Option<Origin>,
}

impl SectionSnapshot {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// In-memory sectioned state, keyed by VIN.
pub struct StateStore {
    vehicles: Mutex<HashMap<String, VehicleState>>,
    seq: AtomicU64,
    clock: Clock,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(crate::time::now_ms))
    }

    /// Store with an injected clock (tests).
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            vehicles: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            clock,
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn accepts(stored: &FieldEntry, origin: Origin, observed_at_ms: i64, seq: u64) -> bool {
        if stored.origin == Origin::Optimistic && origin != Origin::Optimistic {
            return true;
        }
        observed_at_ms > stored.observed_at_ms
            || (observed_at_ms == stored.observed_at_ms && seq > stored.seq)
    }

    /// Merge a normalized event. Events for the same (vin, section) are
    /// serialized; observers see a linear history.
    pub fn apply(&self, event: &StateEvent) {
        let seq = self.next_seq();
        let mut vehicles = self.vehicles.lock();
        let section = vehicles
            .entry(event.vin.clone())
            .or_default()
            .sections
            .entry(event.section)
            .or_default();

        for (key, patch) in &event.fields {
            match section.fields.get(key) {
                Some(stored) if !Self::accepts(stored, event.origin, event.observed_at_ms, seq) => {
                    continue;
                }
                _ => {}
            }
            match patch {
                FieldPatch::Set(value) => {
                    section.fields.insert(
                        key.clone(),
                        FieldEntry {
                            value: value.clone(),
                            observed_at_ms: event.observed_at_ms,
                            seq,
                            origin: event.origin,
                            expires_at_ms: None,
                        },
                    );
                }
                FieldPatch::Clear => {
                    section.fields.remove(key);
                }
            }
        }
        section.updated_at_ms = Some(
            section
                .updated_at_ms
                .map_or(event.observed_at_ms, |t| t.max(event.observed_at_ms)),
        );
        section.last_origin = Some(event.origin);
    }

    /// Write optimistic fields for a section; they shadow observations until
    /// `ttl` elapses or a non-optimistic update overrides them.
    pub fn overlay(
        &self,
        vin: &str,
        section: Section,
        fields: BTreeMap<String, Value>,
        ttl: Duration,
    ) {
        let now = (self.clock)();
        let seq = self.next_seq();
        let expires = now + ttl.as_millis() as i64;
        let mut vehicles = self.vehicles.lock();
        let state = vehicles
            .entry(vin.to_string())
            .or_default()
            .sections
            .entry(section)
            .or_default();
        for (key, value) in fields {
            state.fields.insert(
                key,
                FieldEntry {
                    value,
                    observed_at_ms: now,
                    seq,
                    origin: Origin::Optimistic,
                    expires_at_ms: Some(expires),
                },
            );
        }
        state.last_origin = Some(Origin::Optimistic);
    }

    /// Snapshot a section, pruning expired optimistic entries.
    #[must_use]
    pub fn section(&self, vin: &str, section: Section) -> SectionSnapshot {
        let now = (self.clock)();
        let mut vehicles = self.vehicles.lock();
        let Some(state) = vehicles.get_mut(vin).and_then(|v| v.sections.get_mut(&section)) else {
            return SectionSnapshot::default();
        };
        state
            .fields
            .retain(|_, entry| entry.expires_at_ms.map_or(true, |t| now < t));
        SectionSnapshot {
            fields: state
                .fields
                .iter()
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect(),
            updated_at_ms: state.updated_at_ms,
            last_origin: state.last_origin,
        }
    }

    /// VINs with any recorded state.
    #[must_use]
    pub fn vins(&self) -> Vec<String> {
        self.vehicles.lock().keys().cloned().collect()
    }
}
