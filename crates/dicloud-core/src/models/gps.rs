//! GPS section. Location payloads sometimes nest the coordinates under a
//! `data` object and use several timestamp aliases.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::field;
use crate::normalize;
use crate::state::FieldPatch;

/// Normalized location fix.
#[derive(Debug, Clone, Default)]
pub struct GpsInfo {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
    /// Heading in degrees.
    pub direction: Option<f64>,
    pub observed_at_ms: Option<i64>,
    pub request_serial: Option<String>,

    patch: BTreeMap<String, FieldPatch>,
}

impl GpsInfo {
    #[must_use]
    pub fn from_value(payload: &Value) -> Self {
        // Flatten the optional nested `data` object; top-level keys win.
        let flat = payload;
        let nested = payload.get("data").filter(|v| v.is_object());
        let lookup = |aliases: &[&str]| -> Option<Value> {
            field(flat, aliases)
                .or_else(|| nested.and_then(|n| field(n, aliases)))
                .cloned()
        };

        let mut out = Self::default();
        let mut patch = BTreeMap::new();
        let mut num = |key: &str, aliases: &[&str]| -> Option<f64> {
            let raw = lookup(aliases)?;
            let parsed = normalize::as_f64(&raw);
            patch.insert(key.to_string(), FieldPatch::from_option(parsed.map(Value::from)));
            parsed
        };

        out.latitude = num("latitude", &["latitude", "lat", "gpsLatitude"]);
        out.longitude = num("longitude", &["longitude", "lng", "lon", "gpsLongitude"]);
        out.speed = num("speed", &["speed", "gpsSpeed"]);
        out.direction = num("direction", &["direction", "heading", "course"]);

        out.observed_at_ms = lookup(&["gpsTimeStamp", "gpsTimestamp", "gpsTime", "time", "uploadTime"])
            .as_ref()
            .and_then(normalize::as_timestamp_ms);
        if let Some(ts) = out.observed_at_ms {
            patch.insert("gpsTimeStamp".into(), FieldPatch::Set(Value::from(ts)));
        }
        out.request_serial = lookup(&["requestSerial"]).as_ref().and_then(normalize::as_string);

        out.patch = patch;
        out
    }

    /// A location response is ready once it carries anything beyond the
    /// polling serial.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.patch.is_empty()
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
    fn parses_flat_payload() {
        let gps = GpsInfo::from_value(&json!({
            "latitude": 52.37,
            "longitude": 4.89,
            "speed": "0",
            "direction": 270,
            "gpsTimeStamp": 1_770_817_900,
            "requestSerial": "G1"
        }));
        assert_eq!(gps.latitude, Some(52.37));
        assert_eq!(gps.longitude, Some(4.89));
        assert_eq!(gps.speed, Some(0.0));
        assert_eq!(gps.direction, Some(270.0));
        assert_eq!(gps.observed_at_ms, Some(1_770_817_900_000));
        assert!(gps.is_ready());
    }

    #[test]
    fn parses_nested_payload() {
        let gps = GpsInfo::from_value(&json!({
            "requestSerial": "G1",
            "data": {"lat": 51.9, "lng": 4.4, "gpsTime": 1_770_817_000}
        }));
        assert_eq!(gps.latitude, Some(51.9));
        assert_eq!(gps.longitude, Some(4.4));
        assert_eq!(gps.observed_at_ms, Some(1_770_817_000_000));
    }

    #[test]
    fn serial_only_response_is_not_ready() {
        let gps = GpsInfo::from_value(&json!({"requestSerial": "G1"}));
        assert!(!gps.is_ready());
        assert_eq!(gps.request_serial.as_deref(), Some("G1"));
    }
}
