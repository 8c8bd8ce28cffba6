//! Value converter - SQL scalars to and from typed field values
//!
//! Pass-through when the representation already matches the declared field
//! kind. ISO-8601 text is parsed for date/timestamp targets; any other
//! mismatch is returned unchanged rather than rejected (best-effort contract,
//! not type safety). Only a date or timestamp that fails to parse is an
//! error.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value as SqlValue;

use crate::record::{FieldKind, Value};
use crate::{Error, Result};

/// Convert a scalar field value into its SQL representation.
///
/// Dates and timestamps persist as ISO-8601 text. Reference values never
/// reach this function; the engine resolves them to integer keys first.
pub fn to_sql(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Integer(n) => Ok(SqlValue::Integer(*n)),
        Value::Real(f) => Ok(SqlValue::Real(*f)),
        Value::Text(s) => Ok(SqlValue::Text(s.clone())),
        Value::Date(d) => Ok(SqlValue::Text(d.format("%Y-%m-%d").to_string())),
        Value::Timestamp(t) => Ok(SqlValue::Text(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Value::Record(r) => Err(Error::Conversion(format!(
            "nested {} record reached scalar conversion unresolved",
            r.type_name()
        ))),
    }
}

/// Convert a SQL column value back to a typed field value
pub fn from_sql(value: SqlValue, target: &FieldKind) -> Result<Value> {
    match (value, target) {
        (SqlValue::Null, _) => Ok(Value::Null),
        (SqlValue::Integer(n), FieldKind::Integer) => Ok(Value::Integer(n)),
        (SqlValue::Real(f), FieldKind::Real) => Ok(Value::Real(f)),
        // SQLite stores integers where a REAL column value happens to be whole
        (SqlValue::Integer(n), FieldKind::Real) => Ok(Value::Real(n as f64)),
        (SqlValue::Text(s), FieldKind::Text) => Ok(Value::Text(s)),
        (SqlValue::Text(s), FieldKind::Date) => parse_date(&s).map(Value::Date),
        (SqlValue::Text(s), FieldKind::Timestamp) => parse_timestamp(&s).map(Value::Timestamp),
        // Lenient fallback: hand back whatever the store returned
        (other, _) => Ok(raw_value(other)),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|e| Error::Conversion(format!("invalid date {s:?}: {e}")))
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    s.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| Error::Conversion(format!("invalid timestamp {s:?}: {e}")))
}

fn raw_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(n) => Value::Integer(n),
        SqlValue::Real(f) => Value::Real(f),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Blob(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_roundtrip() {
        let date = NaiveDate::from_ymd_opt(1912, 6, 23).unwrap();
        let sql = to_sql(&Value::Date(date)).unwrap();
        assert_eq!(sql, SqlValue::Text("1912-06-23".to_string()));

        let back = from_sql(sql, &FieldKind::Date).unwrap();
        assert_eq!(back, Value::Date(date));
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap();
        let sql = to_sql(&Value::Timestamp(ts)).unwrap();
        let back = from_sql(sql, &FieldKind::Timestamp).unwrap();
        assert_eq!(back, Value::Timestamp(ts));
    }

    #[test]
    fn test_timestamp_space_separator() {
        let back = from_sql(
            SqlValue::Text("2024-03-01 14:30:05".to_string()),
            &FieldKind::Timestamp,
        )
        .unwrap();
        assert!(matches!(back, Value::Timestamp(_)));
    }

    #[test]
    fn test_invalid_date_is_conversion_error() {
        let err = from_sql(SqlValue::Text("not-a-date".to_string()), &FieldKind::Date).unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }

    #[test]
    fn test_lenient_mismatch_passes_through() {
        // Integer under a Text target comes back unchanged, not as an error
        let back = from_sql(SqlValue::Integer(42), &FieldKind::Text).unwrap();
        assert_eq!(back, Value::Integer(42));
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(from_sql(SqlValue::Null, &FieldKind::Date).unwrap(), Value::Null);
    }
}
