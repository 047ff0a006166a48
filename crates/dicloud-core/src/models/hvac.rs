//! HVAC / climate section.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::{coded_enum, field, Coded};
use crate::normalize;
use crate::state::FieldPatch;

coded_enum! {
    /// A/C power state.
    AcSwitch {
        Off = 0,
        On = 1,
    }
}

/// Normalized climate status.
#[derive(Debug, Clone, Default)]
pub struct HvacStatus {
    pub ac_switch: Option<Coded<AcSwitch>>,
    /// Overall status code; `2` observed while active, kept raw otherwise.
    pub status: Option<i64>,
    /// Driver-side target temperature, service scale (1-17).
    pub main_setting_temp: Option<i64>,
    /// Driver-side target temperature in degrees Celsius when reported.
    pub main_setting_temp_c: Option<f64>,
    pub wind_level: Option<i64>,
    /// Circulation mode; `2` is observed but under-documented, kept raw.
    pub air_circulation_mode: Option<i64>,
    pub observed_at_ms: Option<i64>,

    patch: BTreeMap<String, FieldPatch>,
}

impl HvacStatus {
    #[must_use]
    pub fn from_value(payload: &Value) -> Self {
        let mut out = Self::default();
        let mut patch = BTreeMap::new();
        let mut int = |key: &str, aliases: &[&str]| -> Option<i64> {
            let raw = field(payload, aliases)?;
            let parsed = normalize::as_i64(raw);
            patch.insert(key.to_string(), FieldPatch::from_option(parsed.map(Value::from)));
            parsed
        };

        out.status = int("status", &["status"]);
        out.main_setting_temp = int("mainSettingTemp", &["mainSettingTemp"]);
        out.wind_level = int("windLevel", &["windLevel"]);
        out.air_circulation_mode = int("airRunState", &["airRunState", "cycleMode"]);
        out.ac_switch = int("acSwitch", &["acSwitch"]).map(AcSwitch::from_code);

        if let Some(raw) = field(payload, &["mainSettingTempNew"]) {
            let parsed = normalize::as_f64(raw);
            patch.insert(
                "mainSettingTempNew".into(),
                FieldPatch::from_option(parsed.map(Value::from)),
            );
            out.main_setting_temp_c = parsed;
        }

        out.observed_at_ms = field(payload, &["time"]).and_then(normalize::as_timestamp_ms);
        out.patch = patch;
        out
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        matches!(self.ac_switch, Some(Coded::Known(AcSwitch::On)))
    }

    #[must_use]
    pub fn patch(&self) -> BTreeMap<String, FieldPatch> {
        self.patch.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_active_climate() {
        let st = HvacStatus::from_value(&json!({
            "acSwitch": 1,
            "status": 2,
            "mainSettingTemp": 9,
            "mainSettingTempNew": 21.5,
            "airRunState": 2
        }));
        assert!(st.is_on());
        assert_eq!(st.status, Some(2));
        assert_eq!(st.main_setting_temp, Some(9));
        assert_eq!(st.main_setting_temp_c, Some(21.5));
        // Under-documented code kept raw.
        assert_eq!(st.air_circulation_mode, Some(2));
    }

    #[test]
    fn placeholder_temp_clears() {
        let st = HvacStatus::from_value(&json!({"acSwitch": 0, "mainSettingTempNew": "--"}));
        assert!(!st.is_on());
        assert_eq!(st.main_setting_temp_c, None);
        assert_eq!(st.patch().get("mainSettingTempNew"), Some(&FieldPatch::Clear));
    }
}
