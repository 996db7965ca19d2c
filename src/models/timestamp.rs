//! Timestamp parsing and warehouse formatting.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Largest epoch magnitude accepted (roughly year 33658).
const MAX_EPOCH_SECS: f64 = 1.0e12;

/// Parse a raw creation timestamp into a UTC instant.
///
/// Accepts epoch seconds (integer or fractional, as a number or numeric
/// string) and RFC 3339 strings with any offset.
pub fn parse_value(value: &Value) -> Result<DateTime<Utc>, String> {
    match value {
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                from_epoch_secs(secs as f64)
            } else {
                n.as_f64()
                    .ok_or_else(|| format!("unrepresentable number {n}"))
                    .and_then(from_epoch_secs)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<f64>() {
                return from_epoch_secs(secs);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("'{s}' is not a timestamp: {e}"))
        }
        Value::Null => Err("missing timestamp".to_string()),
        other => Err(format!("unexpected timestamp value {other}")),
    }
}

/// Convert fractional epoch seconds to a UTC instant.
pub fn from_epoch_secs(secs: f64) -> Result<DateTime<Utc>, String> {
    if !secs.is_finite() || secs.abs() > MAX_EPOCH_SECS {
        return Err(format!("epoch seconds {secs} out of range"));
    }
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| format!("epoch seconds {secs} out of range"))
}

/// Serde adapter writing instants the way the warehouse loads them
/// (`2024-05-01T12:00:00.000000Z`).
pub mod warehouse {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::SecondsFormat;

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
