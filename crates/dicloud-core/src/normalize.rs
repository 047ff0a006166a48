//! Field normalization for telemetry payloads.
//!
//! The service pads responses with placeholder values instead of omitting
//! fields. Everything here converts those placeholders to `None` so the
//! state store never records a sentinel as an observation.

use serde_json::Value;

/// Cabin temperature reported while the vehicle is offline.
pub const TEMP_SENTINEL: f64 = -129.0;

/// Whether a raw JSON value is an absent-marker rather than data.
#[must_use]
pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let t = s.trim();
            t.is_empty() || t == "--"
        }
        Value::Number(n) => n.as_f64().is_some_and(f64::is_nan),
        _ => false,
    }
}

/// Parse a number from a JSON number or numeric string.
#[must_use]
pub fn as_f64(value: &Value) -> Option<f64> {
    if is_absent(value) {
        return None;
    }
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Parse an integer, truncating numeric strings like `"70.0"`.
#[must_use]
pub fn as_i64(value: &Value) -> Option<i64> {
    as_f64(value).map(|f| f as i64)
}

/// Parse a non-empty string.
#[must_use]
pub fn as_string(value: &Value) -> Option<String> {
    if is_absent(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Cabin temperature with the offline sentinel removed.
#[must_use]
pub fn as_temperature(value: &Value) -> Option<f64> {
    as_f64(value).filter(|&t| t != TEMP_SENTINEL)
}

/// Duration-component fields (`fullHour`, `remainingMinutes`, ...) use `-1`
/// for "not available".
#[must_use]
pub fn as_non_negative(value: &Value) -> Option<i64> {
    as_i64(value).filter(|&v| v >= 0)
}

/// Normalize a payload timestamp to epoch milliseconds.
///
/// Accepts seconds or milliseconds; zero and negative values are absent.
#[must_use]
pub fn as_timestamp_ms(value: &Value) -> Option<i64> {
    let ts = as_f64(value)?;
    if ts <= 0.0 {
        return None;
    }
    // Anything below ~5e9 is epoch seconds.
    if ts < 100_000_000_000.0 {
        Some((ts * 1000.0) as i64)
    } else {
        Some(ts as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholders_are_absent() {
        for v in [json!(null), json!(""), json!("--"), json!("  ")] {
            assert!(is_absent(&v), "{v:?}");
        }
        assert!(!is_absent(&json!(0)));
        assert!(!is_absent(&json!("0")));
    }

    #[test]
    fn numeric_strings_parse() {
        assert_eq!(as_f64(&json!("70")), Some(70.0));
        assert_eq!(as_f64(&json!(70.5)), Some(70.5));
        assert_eq!(as_f64(&json!("--")), None);
        assert_eq!(as_i64(&json!("12.0")), Some(12));
        assert_eq!(as_i64(&json!("abc")), None);
    }

    #[test]
    fn temperature_sentinel_is_absent() {
        assert_eq!(as_temperature(&json!(-129)), None);
        assert_eq!(as_temperature(&json!(21.5)), Some(21.5));
    }

    #[test]
    fn negative_durations_are_absent() {
        assert_eq!(as_non_negative(&json!(-1)), None);
        assert_eq!(as_non_negative(&json!(0)), Some(0));
        assert_eq!(as_non_negative(&json!(45)), Some(45));
    }

    #[test]
    fn timestamps_normalize_to_millis() {
        assert_eq!(as_timestamp_ms(&json!(1_770_817_900)), Some(1_770_817_900_000));
        assert_eq!(as_timestamp_ms(&json!(1_770_817_900_123i64)), Some(1_770_817_900_123));
        assert_eq!(as_timestamp_ms(&json!(0)), None);
        assert_eq!(as_timestamp_ms(&json!(-1)), None);
        assert_eq!(as_timestamp_ms(&json!("")), None);
    }
}
