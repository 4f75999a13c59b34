//! Raw cell values as they arrive from request bodies or loaded files

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Date layouts accepted when promoting text to a timestamp
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// A single untyped cell before encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Nanoseconds since the Unix epoch
    DateTime(i64),
}

impl RawValue {
    /// Convert a JSON value into a raw cell.
    ///
    /// Nested arrays and objects are kept as their JSON text so they end up in a
    /// categorical column instead of failing the whole request.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Bool(*b),
            Value::Number(n) => n.as_f64().map(RawValue::Number).unwrap_or(RawValue::Null),
            Value::String(s) => RawValue::Text(s.clone()),
            other => RawValue::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Number(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Numeric reading of the cell, if one exists
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(v) if !v.is_nan() => Some(*v),
            RawValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            RawValue::Text(s) => parse_number(s),
            RawValue::DateTime(ns) => Some(*ns as f64),
            _ => None,
        }
    }

    /// Timestamp reading of the cell, if one exists
    pub fn as_datetime(&self) -> Option<i64> {
        match self {
            RawValue::DateTime(ns) => Some(*ns),
            RawValue::Text(s) => parse_datetime(s),
            _ => None,
        }
    }

    /// Text used for category identity and label identity
    pub fn label(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Number(v) if v.is_nan() => None,
            RawValue::Bool(b) => Some(if *b { "True".to_string() } else { "False".to_string() }),
            RawValue::Number(v) => Some(format_number(*v)),
            RawValue::Text(s) => Some(s.clone()),
            RawValue::DateTime(ns) => Some(ns.to_string()),
        }
    }

    /// Whether the cell carries no signal: missing, `false`, zero or blank text
    pub fn is_default(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Bool(b) => !b,
            RawValue::Number(v) => v.is_nan() || *v == 0.0,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::DateTime(_) => false,
        }
    }
}

/// Parse text as a finite number
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse text as a timestamp in nanoseconds since the epoch
pub fn parse_datetime(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.timestamp_nanos_opt();
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return dt.and_utc().timestamp_nanos_opt();
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .and_then(|dt| dt.and_utc().timestamp_nanos_opt());
        }
    }

    None
}

/// Render a number the way labels are compared: integral values without a fraction
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        assert_eq!(RawValue::from_json(&json!(null)), RawValue::Null);
        assert_eq!(RawValue::from_json(&json!(true)), RawValue::Bool(true));
        assert_eq!(RawValue::from_json(&json!(2.5)), RawValue::Number(2.5));
        assert_eq!(RawValue::from_json(&json!("a")), RawValue::Text("a".into()));
        assert!(matches!(RawValue::from_json(&json!([1, 2])), RawValue::Text(_)));
    }

    #[test]
    fn test_parse_datetime_formats() {
        let day = parse_datetime("2024-01-02").unwrap();
        assert_eq!(day, 1_704_153_600_000_000_000);
        assert_eq!(parse_datetime("2024/01/02"), Some(day));
        assert_eq!(parse_datetime("02/01/2024"), Some(day));
        assert_eq!(parse_datetime("2024-01-02T00:00:00Z"), Some(day));
        assert!(parse_datetime("2024-01-02 06:00:00").unwrap() > day);
        assert_eq!(parse_datetime("yes"), None);
        assert_eq!(parse_datetime("2024"), None);
    }

    #[test]
    fn test_labels_and_defaults() {
        assert_eq!(RawValue::Number(3.0).label().as_deref(), Some("3"));
        assert_eq!(RawValue::Number(3.5).label().as_deref(), Some("3.5"));
        assert_eq!(RawValue::Null.label(), None);

        assert!(RawValue::Null.is_default());
        assert!(RawValue::Bool(false).is_default());
        assert!(RawValue::Number(0.0).is_default());
        assert!(RawValue::Text("  ".into()).is_default());
        assert!(!RawValue::Bool(true).is_default());
        assert!(!RawValue::Text("cough".into()).is_default());
    }

    #[test]
    fn test_as_number() {
        assert_eq!(RawValue::Text(" 4.25 ".into()).as_number(), Some(4.25));
        assert_eq!(RawValue::Text("abc".into()).as_number(), None);
        assert_eq!(RawValue::Bool(true).as_number(), Some(1.0));
        assert_eq!(RawValue::Number(f64::NAN).as_number(), None);
    }
}
