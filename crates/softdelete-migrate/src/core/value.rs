//! SQL value and row types shared by every driver.
//!
//! Rows fetched from the source table are held in memory for the whole
//! migration call (they are planned, rendered twice and bound once), so
//! values are always owned.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

/// Format used for sanitized soft-delete timestamps.
pub const SOFT_DELETE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQL value decoded from, or bound to, a database connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (all integer widths are widened to 64 bits).
    I64(i64),

    /// Unsigned integer (MySQL `... UNSIGNED` columns).
    U64(u64),

    /// Floating point.
    F64(f64),

    /// Exact decimal.
    Decimal(Decimal),

    /// Text data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone, normalized to UTC.
    DateTimeUtc(DateTime<Utc>),

    /// JSON document (MySQL `JSON` columns, config parameters).
    Json(JsonValue),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value, if it is an integer or integral text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I64(v) => Some(*v),
            SqlValue::U64(v) => i64::try_from(*v).ok(),
            SqlValue::Bool(v) => Some(i64::from(*v)),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view of the value. Binary values are accepted when they hold UTF-8,
    /// which is how MySQL reports some `information_schema` columns.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            SqlValue::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Convert a JSON scalar (as found in YAML configs) into a bindable value.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(b) => SqlValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(v) = n.as_i64() {
                    SqlValue::I64(v)
                } else if let Some(v) = n.as_u64() {
                    SqlValue::U64(v)
                } else {
                    SqlValue::F64(n.as_f64().unwrap_or_default())
                }
            }
            JsonValue::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Json(other.clone()),
        }
    }

    /// JSON representation used inside the archive payload column.
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bool(v) => JsonValue::Bool(*v),
            SqlValue::I64(v) => JsonValue::from(*v),
            SqlValue::U64(v) => JsonValue::from(*v),
            SqlValue::F64(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::Decimal(v) => JsonValue::String(v.to_string()),
            SqlValue::Text(v) => JsonValue::String(v.clone()),
            SqlValue::Bytes(v) => match std::str::from_utf8(v) {
                Ok(s) => JsonValue::String(s.to_string()),
                Err(_) => JsonValue::Array(v.iter().map(|b| JsonValue::from(*b)).collect()),
            },
            SqlValue::Date(v) => JsonValue::String(v.to_string()),
            SqlValue::Time(v) => JsonValue::String(v.to_string()),
            SqlValue::DateTime(v) => JsonValue::String(v.to_string()),
            SqlValue::DateTimeUtc(v) => JsonValue::String(v.to_rfc3339()),
            SqlValue::Json(v) => v.clone(),
        }
    }

    /// Normalize a soft-delete column value for the archive table.
    ///
    /// Strings and numbers pass through untouched. Date/time values become
    /// `YYYY-MM-DD HH:MM:SS` with no timezone suffix; timezone-aware values
    /// are rendered in UTC.
    #[must_use]
    pub fn sanitize_timestamp(&self) -> SqlValue {
        match self {
            SqlValue::DateTime(v) => {
                SqlValue::Text(v.format(SOFT_DELETE_TIMESTAMP_FORMAT).to_string())
            }
            SqlValue::DateTimeUtc(v) => SqlValue::Text(
                v.naive_utc()
                    .format(SOFT_DELETE_TIMESTAMP_FORMAT)
                    .to_string(),
            ),
            SqlValue::Date(v) => SqlValue::Text(format!("{} 00:00:00", v)),
            SqlValue::Bytes(_) => match self.as_str() {
                Some(s) => SqlValue::Text(s.to_string()),
                None => self.clone(),
            },
            _ => self.clone(),
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Text(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I64(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::DateTimeUtc(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// A result row: column names in select order with their values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Build a row from parallel column/value vectors.
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Value of a column, matched exactly first and then case-insensitively
    /// (MySQL reports `information_schema` column names in upper case).
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.position(column).map(|idx| &self.values[idx])
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))
    }

    /// Whether the row carries the column.
    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Iterate `(column, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let (columns, values) = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self { columns, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_passes_strings_and_numbers_through() {
        let text = SqlValue::from("2021-03-04T10:00:00Z");
        assert_eq!(text.sanitize_timestamp(), text);

        let epoch = SqlValue::I64(1_614_852_000);
        assert_eq!(epoch.sanitize_timestamp(), epoch);
    }

    #[test]
    fn test_sanitize_formats_naive_datetime() {
        let dt = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_milli_opt(10, 5, 6, 789)
            .unwrap();
        assert_eq!(
            SqlValue::DateTime(dt).sanitize_timestamp(),
            SqlValue::from("2021-03-04 10:05:06")
        );
    }

    #[test]
    fn test_sanitize_converts_aware_datetime_to_utc() {
        let offset = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2021, 3, 4, 1, 0, 0).unwrap();
        let value = SqlValue::DateTimeUtc(local.with_timezone(&Utc));
        assert_eq!(value.sanitize_timestamp(), SqlValue::from("2021-03-03 23:00:00"));
    }

    #[test]
    fn test_sanitize_date_gets_midnight() {
        let d = NaiveDate::from_ymd_opt(2020, 12, 31).unwrap();
        assert_eq!(
            SqlValue::Date(d).sanitize_timestamp(),
            SqlValue::from("2020-12-31 00:00:00")
        );
    }

    #[test]
    fn test_to_json() {
        assert_eq!(SqlValue::I64(7).to_json(), serde_json::json!(7));
        assert_eq!(SqlValue::from("x").to_json(), serde_json::json!("x"));
        assert_eq!(SqlValue::F64(f64::NAN).to_json(), JsonValue::Null);
        assert_eq!(
            SqlValue::Bytes(vec![0xff, 0x00]).to_json(),
            serde_json::json!([255, 0])
        );
    }

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(SqlValue::from_json(&serde_json::json!(3)), SqlValue::I64(3));
        assert_eq!(
            SqlValue::from_json(&serde_json::json!("2022-01-01")),
            SqlValue::from("2022-01-01")
        );
        assert_eq!(SqlValue::from_json(&JsonValue::Null), SqlValue::Null);
    }

    #[test]
    fn test_row_lookup_is_case_insensitive_fallback() {
        let row: Row = vec![("COLUMN_NAME", SqlValue::from("id")), ("id", SqlValue::I64(1))]
            .into_iter()
            .collect();
        assert_eq!(row.get("column_name").and_then(SqlValue::as_str), Some("id"));
        assert_eq!(row.get("id"), Some(&SqlValue::I64(1)));
        assert!(!row.contains("missing"));
        assert_eq!(row.len(), 2);
    }
}
