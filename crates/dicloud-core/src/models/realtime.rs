//! Realtime telemetry section.
//!
//! Cloud key encodings worth noting: door locks use 1=unlocked / 2=locked;
//! windows use 1=closed / 2=open (the opposite of the door open/closed
//! encoding); cabin temperature reports `-129` while the vehicle is
//! offline. Codes outside these mappings are kept raw.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::{coded_enum, field, Coded};
use crate::normalize;
use crate::state::FieldPatch;

coded_enum! {
    /// Vehicle online/offline state.
    OnlineState {
        Online = 1,
        Offline = 2,
    }
}

coded_enum! {
    /// Door lock state.
    LockState {
        Unlocked = 1,
        Locked = 2,
    }
}

coded_enum! {
    /// Door / trunk open state.
    DoorState {
        Closed = 0,
        Open = 1,
    }
}

coded_enum! {
    /// Window state. Closed/open encoding differs from doors.
    WindowState {
        Closed = 1,
        Open = 2,
    }
}

/// Normalized realtime snapshot for one vehicle.
#[derive(Debug, Clone, Default)]
pub struct RealtimeStatus {
    pub online_state: Option<Coded<OnlineState>>,
    /// Power state; observed `2` is under-documented and kept raw.
    pub vehicle_state: Option<i64>,
    pub request_serial: Option<String>,

    pub elec_percent: Option<f64>,
    pub endurance_mileage: Option<f64>,
    pub total_mileage: Option<f64>,
    pub speed: Option<f64>,
    pub temp_in_car: Option<f64>,
    pub main_setting_temp: Option<i64>,

    pub charging_state: Option<i64>,
    pub full_hour: Option<i64>,
    pub full_minute: Option<i64>,
    pub battery_heat_state: Option<i64>,

    pub doors: BTreeMap<&'static str, Coded<DoorState>>,
    pub locks: BTreeMap<&'static str, Coded<LockState>>,
    pub windows: BTreeMap<&'static str, Coded<WindowState>>,

    /// Seat heat/ventilation levels, raw scale (1=off, 2=low, 3=high;
    /// 0 observed for "feature absent").
    pub seat_climate: BTreeMap<&'static str, i64>,

    /// Payload timestamp (epoch ms) from the `time` field.
    pub observed_at_ms: Option<i64>,

    patch: BTreeMap<String, FieldPatch>,
}

const DOOR_KEYS: [(&str, &[&str]); 5] = [
    ("leftFrontDoor", &["leftFrontDoor"]),
    ("rightFrontDoor", &["rightFrontDoor"]),
    ("leftRearDoor", &["leftRearDoor"]),
    ("rightRearDoor", &["rightRearDoor"]),
    ("trunkLid", &["trunkLid", "backCover"]),
];

const LOCK_KEYS: [&str; 4] = [
    "leftFrontDoorLock",
    "rightFrontDoorLock",
    "leftRearDoorLock",
    "rightRearDoorLock",
];

const WINDOW_KEYS: [&str; 5] = [
    "leftFrontWindow",
    "rightFrontWindow",
    "leftRearWindow",
    "rightRearWindow",
    "skylight",
];

const SEAT_KEYS: [&str; 4] = [
    "mainSeatHeatState",
    "mainSeatVentilationState",
    "copilotSeatHeatState",
    "copilotSeatVentilationState",
];

impl RealtimeStatus {
    /// Normalize a decrypted realtime payload.
    #[must_use]
    pub fn from_value(payload: &Value) -> Self {
        let mut out = Self::default();
        let mut patch = BTreeMap::new();

        // Scalar numerics. A key present with a sentinel value becomes an
        // explicit clear; a missing key produces no patch at all.
        let mut num =
            |key: &str, aliases: &[&str], parse: &dyn Fn(&Value) -> Option<f64>| -> Option<f64> {
                let raw = field(payload, aliases)?;
                let parsed = parse(raw);
                patch.insert(
                    key.to_string(),
                    FieldPatch::from_option(parsed.map(Value::from)),
                );
                parsed
            };

        out.elec_percent = num("elecPercent", &["elecPercent", "powerBattery"], &normalize::as_f64);
        out.endurance_mileage = num(
            "enduranceMileage",
            &["enduranceMileage", "evEndurance"],
            &normalize::as_f64,
        );
        out.total_mileage = num("totalMileage", &["totalMileage"], &normalize::as_f64);
        out.speed = num("speed", &["speed"], &normalize::as_f64);
        out.temp_in_car = num("tempInCar", &["tempInCar"], &normalize::as_temperature);

        let mut int = |key: &str, aliases: &[&str], parse: &dyn Fn(&Value) -> Option<i64>| -> Option<i64> {
            let raw = field(payload, aliases)?;
            let parsed = parse(raw);
            patch.insert(
                key.to_string(),
                FieldPatch::from_option(parsed.map(Value::from)),
            );
            parsed
        };

        out.main_setting_temp = int("mainSettingTemp", &["mainSettingTemp"], &normalize::as_i64);
        out.charging_state = int("chargingState", &["chargingState", "chargeState"], &normalize::as_i64);
        out.full_hour = int("fullHour", &["fullHour"], &normalize::as_non_negative);
        out.full_minute = int("fullMinute", &["fullMinute"], &normalize::as_non_negative);
        out.battery_heat_state = int("batteryHeatState", &["batteryHeatState"], &normalize::as_i64);
        out.vehicle_state = int("vehicleState", &["vehicleState"], &normalize::as_i64);
        out.online_state = int("onlineState", &["onlineState"], &normalize::as_i64)
            .map(OnlineState::from_code);

        for (key, aliases) in DOOR_KEYS {
            if let Some(code) = field(payload, aliases).and_then(normalize::as_i64) {
                out.doors.insert(key, DoorState::from_code(code));
                patch.insert(key.to_string(), FieldPatch::Set(Value::from(code)));
            }
        }
        for key in LOCK_KEYS {
            if let Some(code) = field(payload, &[key]).and_then(normalize::as_i64) {
                out.locks.insert(key, LockState::from_code(code));
                patch.insert(key.to_string(), FieldPatch::Set(Value::from(code)));
            }
        }
        for key in WINDOW_KEYS {
            if let Some(code) = field(payload, &[key]).and_then(normalize::as_i64) {
                out.windows.insert(key, WindowState::from_code(code));
                patch.insert(key.to_string(), FieldPatch::Set(Value::from(code)));
            }
        }
        for key in SEAT_KEYS {
            if let Some(code) = field(payload, &[key]).and_then(normalize::as_i64) {
                out.seat_climate.insert(key, code);
                patch.insert(key.to_string(), FieldPatch::Set(Value::from(code)));
            }
        }

        out.request_serial = field(payload, &["requestSerial"]).and_then(normalize::as_string);
        out.observed_at_ms =
            field(payload, &["time", "timestamp"]).and_then(normalize::as_timestamp_ms);

        out.patch = patch;
        out
    }

    /// Whether the payload carries fresh vehicle data. Trigger/poll
    /// responses report `onlineState=0` until the vehicle has answered.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.online_state, Some(Coded::Known(OnlineState::Online)))
    }

    /// Field patch for the state store.
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
    fn normalizes_scenario_payload() {
        let payload = json!({
            "onlineState": 1,
            "elecPercent": 70,
            "tempInCar": -129,
            "time": 1_770_817_900,
            "requestSerial": "ABC"
        });
        let rt = RealtimeStatus::from_value(&payload);
        assert_eq!(rt.elec_percent, Some(70.0));
        assert_eq!(rt.temp_in_car, None);
        assert_eq!(rt.observed_at_ms, Some(1_770_817_900_000));
        assert_eq!(rt.request_serial.as_deref(), Some("ABC"));
        assert!(rt.is_ready());

        let patch = rt.patch();
        assert_eq!(patch.get("elecPercent"), Some(&FieldPatch::Set(json!(70.0))));
        // Sentinel present in payload -> explicit clear.
        assert_eq!(patch.get("tempInCar"), Some(&FieldPatch::Clear));
        // Missing keys produce no patch.
        assert!(!patch.contains_key("speed"));
    }

    #[test]
    fn pending_and_offline_responses_are_not_ready() {
        let pending = RealtimeStatus::from_value(&json!({
            "onlineState": 0,
            "requestSerial": "ABC"
        }));
        // onlineState 0 is outside the documented mapping; kept raw.
        assert_eq!(pending.online_state, Some(Coded::Raw(0)));
        assert!(!pending.is_ready());

        let offline = RealtimeStatus::from_value(&json!({
            "onlineState": 2,
            "elecPercent": 70
        }));
        assert!(!offline.is_ready());
    }

    #[test]
    fn lock_and_window_encodings() {
        let rt = RealtimeStatus::from_value(&json!({
            "leftFrontDoorLock": 2,
            "leftFrontWindow": 1,
            "leftFrontDoor": 0,
            "backCover": 1,
            "mainSeatHeatState": 3
        }));
        assert_eq!(
            rt.locks.get("leftFrontDoorLock"),
            Some(&Coded::Known(LockState::Locked))
        );
        assert_eq!(
            rt.windows.get("leftFrontWindow"),
            Some(&Coded::Known(WindowState::Closed))
        );
        assert_eq!(rt.doors.get("trunkLid"), Some(&Coded::Known(DoorState::Open)));
        assert_eq!(rt.seat_climate.get("mainSeatHeatState"), Some(&3));
    }

    #[test]
    fn negative_time_to_full_is_absent() {
        let rt = RealtimeStatus::from_value(&json!({"fullHour": -1, "fullMinute": -1}));
        assert_eq!(rt.full_hour, None);
        assert_eq!(rt.full_minute, None);
        assert_eq!(rt.patch().get("fullHour"), Some(&FieldPatch::Clear));
    }

    #[test]
    fn numeric_strings_parse() {
        let rt = RealtimeStatus::from_value(&json!({"elecPercent": "70", "speed": "12.5"}));
        assert_eq!(rt.elec_percent, Some(70.0));
        assert_eq!(rt.speed, Some(12.5));
    }
}
