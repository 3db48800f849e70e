//! Built-in codecs for the `date`, `date-time`, `byte` and `binary` string
//! formats. Other formats pass through untouched.
use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::value::{format_date, format_date_time, Value};

static DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("Invalid regex"));
static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[Tt]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:[Zz]|[+-]\d{2}:\d{2})$").expect("Invalid regex")
});
static BINARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[01]{8})*$").expect("Invalid regex"));

/// Wire string to native value.
pub(crate) fn deserialize(format: Option<&str>, value: &Value) -> Result<Value, String> {
    let (Some(format), Value::String(s)) = (format, value.inner()) else {
        return Ok(value.clone());
    };
    match format {
        "date" => DATE
            .is_match(s)
            .then(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .flatten()
            .map(Value::Date)
            .ok_or_else(|| format!("Value is not a valid date. Expected format YYYY-MM-DD. Received: {value}")),
        "date-time" => DATE_TIME
            .is_match(s)
            .then(|| DateTime::parse_from_rfc3339(s).ok())
            .flatten()
            .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
            .ok_or_else(|| format!("Value is not a valid date-time. Expected an RFC 3339 timestamp. Received: {value}")),
        "byte" => Base64
            .decode(s)
            .map(Value::binary)
            .map_err(|_| format!("Value is not a valid base64 string. Received: {value}")),
        "binary" => {
            if !BINARY.is_match(s) {
                return Err(format!("Value is not a binary octet string. Received: {value}"));
            }
            let bytes = s
                .as_bytes()
                .chunks(8)
                .map(|octet| octet.iter().fold(0u8, |byte, bit| (byte << 1) | (bit - b'0')))
                .collect::<Vec<u8>>();
            Ok(Value::binary(bytes))
        }
        _ => Ok(value.clone()),
    }
}

/// Native value to wire string. Values already in wire form pass through.
pub(crate) fn serialize(format: Option<&str>, value: &Value) -> Result<Value, String> {
    let Some(format) = format else {
        return Ok(value.clone());
    };
    match (format, value.inner()) {
        (_, Value::String(_)) => Ok(value.clone()),
        ("date", Value::Date(d)) => Ok(Value::String(format_date(d))),
        ("date", Value::DateTime(dt)) => Ok(Value::String(format_date(&dt.date_naive()))),
        ("date-time", Value::DateTime(dt)) => Ok(Value::String(format_date_time(dt))),
        ("date-time", Value::Date(d)) => {
            let midnight = d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
            Ok(Value::String(format_date_time(&midnight)))
        }
        ("byte", Value::Binary(bytes)) => Ok(Value::String(Base64.encode(bytes))),
        ("binary", Value::Binary(bytes)) => {
            Ok(Value::String(bytes.iter().map(|b| format!("{b:08b}")).collect()))
        }
        ("date" | "date-time", _) => Err(format!("Expected a date object. Received: {value}")),
        ("byte" | "binary", _) => Err(format!("Expected a binary value. Received: {value}")),
        _ => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(format: &str, wire: &str) -> Value {
        let native = deserialize(Some(format), &Value::from(wire)).unwrap();
        assert_eq!(serialize(Some(format), &native).unwrap(), Value::from(wire));
        native
    }

    #[test]
    fn wire_strings_round_trip() {
        assert!(matches!(round_trip("date", "2020-02-29"), Value::Date(_)));
        assert!(matches!(round_trip("date-time", "2020-02-29T10:11:12Z"), Value::DateTime(_)));
        assert!(matches!(round_trip("date-time", "2020-02-29T10:11:12.250Z"), Value::DateTime(_)));
        assert_eq!(round_trip("byte", "aGVsbG8="), Value::binary(b"hello".to_vec()));
        assert_eq!(round_trip("binary", "0000000111111111"), Value::binary(vec![1, 255]));
    }

    #[test]
    fn offsets_normalize_to_utc() {
        let native = deserialize(Some("date-time"), &Value::from("2020-01-01T01:00:00+01:00")).unwrap();
        assert_eq!(serialize(Some("date-time"), &native).unwrap(), Value::from("2020-01-01T00:00:00Z"));
    }

    #[test]
    fn malformed_strings_are_rejected() {
        assert!(deserialize(Some("date"), &Value::from("2020-02-30")).is_err());
        assert!(deserialize(Some("date"), &Value::from("2020-1-1")).is_err());
        assert!(deserialize(Some("date-time"), &Value::from("2020-01-01")).is_err());
        assert!(deserialize(Some("byte"), &Value::from("***")).is_err());
        assert!(deserialize(Some("binary"), &Value::from("0101")).is_err());
    }

    #[test]
    fn other_values_pass_through() {
        assert_eq!(deserialize(Some("date"), &Value::from(5)).unwrap(), Value::from(5));
        assert_eq!(deserialize(Some("email"), &Value::from("a")).unwrap(), Value::from("a"));
        assert_eq!(deserialize(None, &Value::from("2020-01-01")).unwrap(), Value::from("2020-01-01"));
        assert!(serialize(Some("date"), &Value::from(5)).is_err());
    }
}
