//! Timestamp conversion.
//!
//! Windows file times count 100-nanosecond intervals since 1601-01-01 UTC.
//! Generalized time is the `YYYYMMDDHHMMSS.0Z` string syntax.

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::{json_integer, parse_integer, ValueConverter};
use crate::error::{DirectoryError, DirectoryResult};
use crate::value::{AttributeValue, RawValue};

/// Attributes stored as file-time integers.
pub const FILE_TIME_ATTRIBUTES: &[&str] = &[
    "pwdLastSet",
    "lastLogon",
    "lastLogonTimestamp",
    "accountExpires",
    "badPasswordTime",
    "lockoutTime",
];

/// 100ns ticks between 1601-01-01 and 1970-01-01.
const EPOCH_DIFFERENCE: i64 = 116_444_736_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

const GENERALIZED_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Convert a file time to a UTC timestamp. `0` and `i64::MAX` mean "never".
pub fn file_time_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks == 0 || ticks == i64::MAX {
        return None;
    }
    let unix_ticks = ticks.checked_sub(EPOCH_DIFFERENCE)?;
    let seconds = unix_ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (unix_ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(seconds, nanos)
}

/// Convert a UTC timestamp to a file time.
pub fn datetime_to_file_time(timestamp: &DateTime<Utc>) -> Option<i64> {
    timestamp
        .timestamp()
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(i64::from(timestamp.timestamp_subsec_nanos() / 100))?
        .checked_add(EPOCH_DIFFERENCE)
}

/// Parse `YYYYMMDDHHMMSS[.f]Z`.
pub fn parse_generalized_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    let text = text.strip_suffix('Z').unwrap_or(text);
    let (main, fraction) = text.split_once('.').unwrap_or((text, ""));

    let naive = NaiveDateTime::parse_from_str(main, GENERALIZED_TIME_FORMAT).ok()?;
    let nanos = if fraction.is_empty() || fraction.chars().all(|c| c == '0') {
        0
    } else {
        let digits: String = fraction.chars().take(9).collect();
        let scale = 10u32.pow(9 - digits.len() as u32);
        digits.parse::<u32>().ok()? * scale
    };
    Some(naive.and_utc() + Duration::nanoseconds(i64::from(nanos)))
}

fn parse_iso(attribute: &str, text: &str) -> DirectoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DirectoryError::conversion(attribute, format!("'{text}' is not ISO-8601: {e}")))
}

fn iso(timestamp: &DateTime<Utc>) -> Value {
    Value::String(timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// File-time integers <-> ISO-8601 strings, "never" as `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTimeConverter;

impl ValueConverter for FileTimeConverter {
    fn to_external(&self, attribute: &str, raw: &RawValue) -> DirectoryResult<Value> {
        let ticks = parse_integer(attribute, raw)?;
        if ticks == 0 || ticks == i64::MAX {
            return Ok(Value::Null);
        }
        file_time_to_datetime(ticks)
            .map(|dt| iso(&dt))
            .ok_or_else(|| DirectoryError::conversion(attribute, format!("{ticks} is not a valid file time")))
    }

    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue> {
        let ticks = match value {
            Value::Null => 0,
            Value::String(text) => {
                let timestamp = parse_iso(attribute, text)?;
                datetime_to_file_time(&timestamp).ok_or_else(|| {
                    DirectoryError::conversion(attribute, format!("'{text}' is outside the file time range"))
                })?
            }
            other => json_integer(attribute, other)?,
        };
        Ok(AttributeValue::Integer(ticks))
    }
}

/// Generalized time strings <-> ISO-8601 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralizedTimeConverter;

impl ValueConverter for GeneralizedTimeConverter {
    fn to_external(&self, attribute: &str, raw: &RawValue) -> DirectoryResult<Value> {
        let text = raw
            .as_text()
            .ok_or_else(|| DirectoryError::conversion(attribute, "generalized time is not text"))?;
        parse_generalized_time(text)
            .map(|dt| iso(&dt))
            .ok_or_else(|| {
                DirectoryError::conversion(attribute, format!("'{text}' is not a generalized time"))
            })
    }

    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue> {
        let Value::String(text) = value else {
            return Err(DirectoryError::conversion(attribute, "expected an ISO-8601 string"));
        };
        let timestamp = parse_iso(attribute, text)?;
        Ok(AttributeValue::String(
            timestamp.format("%Y%m%d%H%M%S.0Z").to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_time_to_iso() {
        let value = FileTimeConverter
            .to_external("pwdLastSet", &RawValue::from("133170048000000000"))
            .unwrap();
        assert_eq!(value, json!("2023-01-01T00:00:00Z"));
    }

    #[test]
    fn test_sub_second_precision_round_trips() {
        let raw = RawValue::from("133541212291234567");
        let external = FileTimeConverter.to_external("lastLogon", &raw).unwrap();
        assert_eq!(external, json!("2024-03-05T14:07:09.123456700Z"));
        assert_eq!(
            FileTimeConverter.to_protocol("lastLogon", &external).unwrap(),
            AttributeValue::Integer(133_541_212_291_234_567)
        );
    }

    #[test]
    fn test_never_maps_to_null() {
        for raw in ["0", "9223372036854775807"] {
            assert_eq!(
                FileTimeConverter
                    .to_external("accountExpires", &RawValue::from(raw))
                    .unwrap(),
                Value::Null
            );
        }
        assert_eq!(
            FileTimeConverter.to_protocol("accountExpires", &Value::Null).unwrap(),
            AttributeValue::Integer(0)
        );
    }

    #[test]
    fn test_file_time_rejects_garbage() {
        assert!(FileTimeConverter
            .to_external("pwdLastSet", &RawValue::from("yesterday"))
            .is_err());
        assert!(FileTimeConverter
            .to_protocol("pwdLastSet", &json!("not a date"))
            .is_err());
    }

    #[test]
    fn test_generalized_time() {
        let external = GeneralizedTimeConverter
            .to_external("whenCreated", &RawValue::from("20230115103000.0Z"))
            .unwrap();
        assert_eq!(external, json!("2023-01-15T10:30:00Z"));
        assert_eq!(
            GeneralizedTimeConverter.to_protocol("whenCreated", &external).unwrap(),
            AttributeValue::from("20230115103000.0Z")
        );
    }

    #[test]
    fn test_generalized_time_fraction() {
        let parsed = parse_generalized_time("20230115103000.25Z").unwrap();
        assert_eq!(parsed.timestamp_subsec_millis(), 250);
        assert!(parse_generalized_time("2023-01-15").is_none());
    }
}
