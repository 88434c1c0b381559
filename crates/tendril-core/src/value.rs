//! Native property values and the scalar representation handed to the store

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Deflated properties of one node or edge, keyed by property name
pub type PropertyMap = BTreeMap<String, StoreValue>;

/// Native field values of one instance, keyed by field name
pub type NodeValues = HashMap<String, Value>;

/// Format used for date properties in the store
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A native, application-facing property value
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Deflate by the value's own type, for properties with no declared schema
    pub fn to_store_value(&self) -> StoreValue {
        match self {
            Value::Null => StoreValue::Null,
            Value::String(s) => StoreValue::String(s.clone()),
            Value::Integer(i) => StoreValue::Integer(*i),
            Value::Float(f) => StoreValue::Float(*f),
            Value::Boolean(b) => StoreValue::Boolean(*b),
            Value::Date(d) => StoreValue::String(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => StoreValue::Integer(dt.timestamp_micros()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<&StoreValue> for Value {
    fn from(v: &StoreValue) -> Self {
        match v {
            StoreValue::Null => Value::Null,
            StoreValue::Boolean(b) => Value::Boolean(*b),
            StoreValue::Integer(i) => Value::Integer(*i),
            StoreValue::Float(f) => Value::Float(*f),
            StoreValue::String(s) => Value::String(s.clone()),
        }
    }
}

/// A store-native scalar
///
/// Numbers compare across `Integer` and `Float`; values of different
/// families (string vs number, etc.) are ordered by family so the type can
/// key a `BTreeMap`, but [`StoreValue::compare`] reports them as unordered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl StoreValue {
    pub fn is_null(&self) -> bool {
        matches!(self, StoreValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoreValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn family(&self) -> u8 {
        match self {
            StoreValue::Null => 0,
            StoreValue::Boolean(_) => 1,
            StoreValue::Integer(_) | StoreValue::Float(_) => 2,
            StoreValue::String(_) => 3,
        }
    }

    /// Ordering between two values of the same family, `None` otherwise
    pub fn compare(&self, other: &StoreValue) -> Option<Ordering> {
        if self.is_null() || other.is_null() || self.family() != other.family() {
            return None;
        }
        Some(self.cmp(other))
    }
}

impl Ord for StoreValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use StoreValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Integer(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Integer(b)) => a.total_cmp(&(*b as f64)),
            (String(a), String(b)) => a.cmp(b),
            _ => self.family().cmp(&other.family()),
        }
    }
}

impl PartialOrd for StoreValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for StoreValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StoreValue {}

impl fmt::Display for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreValue::Null => write!(f, "null"),
            StoreValue::Boolean(b) => write!(f, "{}", b),
            StoreValue::Integer(i) => write!(f, "{}", i),
            StoreValue::Float(fl) => write!(f, "{}", fl),
            StoreValue::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<&str> for StoreValue {
    fn from(s: &str) -> Self {
        StoreValue::String(s.to_string())
    }
}

impl From<String> for StoreValue {
    fn from(s: String) -> Self {
        StoreValue::String(s)
    }
}

impl From<i64> for StoreValue {
    fn from(i: i64) -> Self {
        StoreValue::Integer(i)
    }
}

impl From<f64> for StoreValue {
    fn from(f: f64) -> Self {
        StoreValue::Float(f)
    }
}

impl From<bool> for StoreValue {
    fn from(b: bool) -> Self {
        StoreValue::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_families_compare() {
        assert_eq!(StoreValue::Integer(3), StoreValue::Float(3.0));
        assert_eq!(
            StoreValue::Integer(2).compare(&StoreValue::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(StoreValue::Integer(2).compare(&StoreValue::from("2")), None);
        assert_eq!(StoreValue::Null.compare(&StoreValue::Null), None);
    }

    #[test]
    fn test_store_value_json_shape() {
        let mut props = PropertyMap::new();
        props.insert("age".to_string(), StoreValue::Integer(4));
        props.insert("height".to_string(), StoreValue::Float(1.5));
        props.insert("name".to_string(), StoreValue::from("Jim"));
        props.insert("alive".to_string(), StoreValue::Boolean(true));

        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(json, r#"{"age":4,"alive":true,"height":1.5,"name":"Jim"}"#);

        let back: PropertyMap = serde_json::from_str(&json).unwrap();
        assert!(matches!(back["age"], StoreValue::Integer(4)));
        assert!(matches!(back["height"], StoreValue::Float(_)));
        assert!(matches!(back["alive"], StoreValue::Boolean(true)));
    }

    #[test]
    fn test_natural_deflate_of_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            Value::Date(date).to_store_value(),
            StoreValue::from("2024-02-29")
        );
        let dt = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            Value::DateTime(dt).to_store_value(),
            StoreValue::Integer(1_700_000_000_000_000)
        );
    }
}
