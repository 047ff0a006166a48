//! Energy consumption section.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::field;
use crate::normalize;
use crate::state::FieldPatch;

#[derive(Debug, Clone, Default)]
pub struct EnergyConsumption {
    pub total_energy: Option<f64>,
    pub avg_energy_consumption: Option<f64>,
    pub electricity_consumption: Option<f64>,
    pub fuel_consumption: Option<f64>,
    pub observed_at_ms: Option<i64>,

    patch: BTreeMap<String, FieldPatch>,
}

impl EnergyConsumption {
    #[must_use]
    pub fn from_value(payload: &Value) -> Self {
        let mut out = Self::default();
        let mut patch = BTreeMap::new();
        let mut num = |key: &str, aliases: &[&str]| -> Option<f64> {
            let raw = field(payload, aliases)?;
            let parsed = normalize::as_f64(raw);
            patch.insert(key.to_string(), FieldPatch::from_option(parsed.map(Value::from)));
            parsed
        };

        out.total_energy = num("totalEnergy", &["totalEnergy"]);
        out.avg_energy_consumption = num("avgEnergyConsumption", &["avgEnergyConsumption"]);
        out.electricity_consumption = num("electricityConsumption", &["electricityConsumption"]);
        out.fuel_consumption = num("fuelConsumption", &["fuelConsumption"]);
        out.observed_at_ms = field(payload, &["time"]).and_then(normalize::as_timestamp_ms);
        out.patch = patch;
        out
    }

    #[must_use]
    pub fn patch(&self) -> BTreeMap<String, FieldPatch> {
        self.patch.clone()
    }
}
