//! Charging section, from the smart-charge home page payload.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::field;
use crate::normalize;
use crate::state::FieldPatch;

/// Smart-charging status. `chargingState == 15` means the gun is plugged in
/// without an active charge.
#[derive(Debug, Clone, Default)]
pub struct ChargingStatus {
    pub soc: Option<i64>,
    pub charging_state: Option<i64>,
    pub connect_state: Option<i64>,
    pub wait_status: Option<i64>,
    pub full_hour: Option<i64>,
    pub full_minute: Option<i64>,
    pub smart_charge_switch: Option<i64>,
    pub observed_at_ms: Option<i64>,

    patch: BTreeMap<String, FieldPatch>,
}

impl ChargingStatus {
    #[must_use]
    pub fn from_value(payload: &Value) -> Self {
        let mut out = Self::default();
        let mut patch = BTreeMap::new();
        let mut int = |key: &str, aliases: &[&str], parse: &dyn Fn(&Value) -> Option<i64>| {
            let raw = field(payload, aliases)?;
            let parsed = parse(raw);
            patch.insert(key.to_string(), FieldPatch::from_option(parsed.map(Value::from)));
            parsed
        };

        out.soc = int("soc", &["soc", "elecPercent"], &normalize::as_i64);
        out.charging_state = int("chargingState", &["chargingState"], &normalize::as_i64);
        out.connect_state = int("connectState", &["connectState"], &normalize::as_i64);
        out.wait_status = int("waitStatus", &["waitStatus"], &normalize::as_i64);
        out.full_hour = int("fullHour", &["fullHour"], &normalize::as_non_negative);
        out.full_minute = int("fullMinute", &["fullMinute"], &normalize::as_non_negative);
        out.smart_charge_switch = int("smartChargeSwitch", &["smartChargeSwitch"], &normalize::as_i64);

        out.observed_at_ms = field(payload, &["updateTime", "time"]).and_then(normalize::as_timestamp_ms);
        out.patch = patch;
        out
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connect_state.is_some_and(|s| s != 0)
    }

    #[must_use]
    pub fn is_charging(&self) -> bool {
        self.charging_state.is_some_and(|s| s > 0 && s != 15)
    }

    #[must_use]
    pub fn patch(&self) -> BTreeMap<String, FieldPatch> {
        self.patch.clone()
    }
}
