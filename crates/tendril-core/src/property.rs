//! Typed property descriptors: validation, defaults, inflate and deflate

use crate::error::{Error, Result};
use crate::value::{StoreValue, Value, DATE_FORMAT};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::sync::Arc;
use ulid::Ulid;

/// Semantic type of a property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    String,
    Integer,
    Float,
    Boolean,
    /// Stored as a `"YYYY-MM-DD"` string
    Date,
    /// Stored as integer microseconds since the Unix epoch, UTC
    DateTime,
    /// No storage; reads and writes forward to `target` in the same kind
    Alias { target: String },
}

impl PropertyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::String => "string",
            PropertyKind::Integer => "integer",
            PropertyKind::Float => "float",
            PropertyKind::Boolean => "boolean",
            PropertyKind::Date => "date",
            PropertyKind::DateTime => "datetime",
            PropertyKind::Alias { .. } => "alias",
        }
    }
}

/// Default for a property left unset at creation
#[derive(Clone)]
pub enum DefaultValue {
    /// Used as-is
    Literal(Value),
    /// Called once per created instance
    Generator(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Literal(v) => v.clone(),
            DefaultValue::Generator(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            DefaultValue::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

/// Declaration of one property on an entity kind (or on a relationship's edges)
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    name: String,
    kind: PropertyKind,
    owner: String,
    required: bool,
    unique_index: bool,
    index: bool,
    default: Option<DefaultValue>,
    choices: Option<Vec<String>>,
    max_length: Option<usize>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            owner: String::new(),
            required: false,
            unique_index: false,
            index: false,
            default: None,
            choices: None,
            max_length: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Date)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::DateTime)
    }

    pub fn alias(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyKind::Alias {
                target: target.into(),
            },
        )
    }

    /// Unique-indexed string filled with a fresh ULID when left unset
    pub fn unique_id(name: impl Into<String>) -> Self {
        Self::string(name)
            .unique_index()
            .default_with(|| Value::String(Ulid::new().to_string()))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique_index(mut self) -> Self {
        self.unique_index = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_with<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Generator(Arc::new(generator)));
        self
    }

    pub fn choices<I, T>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub(crate) fn set_owner(&mut self, owner: &str) {
        self.owner = owner.to_string();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// `Kind.field`, used in error messages
    pub fn path(&self) -> String {
        if self.owner.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.owner, self.name)
        }
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_unique(&self) -> bool {
        self.unique_index
    }

    /// Unique-indexed properties are searchable through the index too
    pub fn is_indexed(&self) -> bool {
        self.index || self.unique_index
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.kind, PropertyKind::Alias { .. })
    }

    pub fn alias_target(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Alias { target } => Some(target),
            _ => None,
        }
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(DefaultValue::resolve)
    }

    pub fn choice_list(&self) -> Option<&[String]> {
        self.choices.as_deref()
    }

    fn invalid(&self, message: impl Into<String>) -> Error {
        Error::validation(self.path(), message)
    }

    fn unexpected(&self, value: &Value) -> Error {
        self.invalid(format!(
            "expected a {} value, got {} {}",
            self.kind.name(),
            value.type_name(),
            value
        ))
    }

    /// Convert a native value into the store representation, validating it
    pub fn deflate(&self, value: &Value) -> Result<StoreValue> {
        if value.is_null() {
            if self.required {
                return Err(self.invalid("is required"));
            }
            return Ok(StoreValue::Null);
        }

        match &self.kind {
            PropertyKind::Alias { target } => Err(Error::Internal(format!(
                "{} is an alias of {} and has no storage",
                self.path(),
                target
            ))),
            PropertyKind::String => self.deflate_string(value),
            PropertyKind::Integer => match value {
                Value::Integer(i) => Ok(StoreValue::Integer(*i)),
                Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                    Ok(StoreValue::Integer(*f as i64))
                }
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(StoreValue::Integer)
                    .map_err(|_| self.unexpected(value)),
                _ => Err(self.unexpected(value)),
            },
            PropertyKind::Float => match value {
                Value::Float(f) => Ok(StoreValue::Float(*f)),
                Value::Integer(i) => Ok(StoreValue::Float(*i as f64)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(StoreValue::Float)
                    .map_err(|_| self.unexpected(value)),
                _ => Err(self.unexpected(value)),
            },
            PropertyKind::Boolean => match value {
                Value::Boolean(b) => Ok(StoreValue::Boolean(*b)),
                Value::Integer(0) => Ok(StoreValue::Boolean(false)),
                Value::Integer(1) => Ok(StoreValue::Boolean(true)),
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "1" => Ok(StoreValue::Boolean(true)),
                    "false" | "0" => Ok(StoreValue::Boolean(false)),
                    _ => Err(self.unexpected(value)),
                },
                _ => Err(self.unexpected(value)),
            },
            PropertyKind::Date => {
                let date = match value {
                    Value::Date(d) => *d,
                    Value::DateTime(dt) => dt.date_naive(),
                    Value::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                        .map_err(|e| self.invalid(format!("invalid date {}: {}", value, e)))?,
                    _ => return Err(self.unexpected(value)),
                };
                Ok(StoreValue::String(date.format(DATE_FORMAT).to_string()))
            }
            PropertyKind::DateTime => {
                let instant = match value {
                    Value::DateTime(dt) => *dt,
                    Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| self.invalid(format!("invalid datetime {}: {}", value, e)))?,
                    _ => return Err(self.unexpected(value)),
                };
                Ok(StoreValue::Integer(instant.timestamp_micros()))
            }
        }
    }

    fn deflate_string(&self, value: &Value) -> Result<StoreValue> {
        let s = match value {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            _ => return Err(self.unexpected(value)),
        };

        if self.required && s.is_empty() {
            return Err(self.invalid("is required and cannot be empty"));
        }
        if let Some(max) = self.max_length {
            let len = s.chars().count();
            if len > max {
                return Err(self.invalid(format!("too long: {} chars (max {})", len, max)));
            }
        }
        if let Some(choices) = &self.choices {
            if !choices.iter().any(|c| c == &s) {
                return Err(self.invalid(format!(
                    "\"{}\" is not one of [{}]",
                    s,
                    choices.join(", ")
                )));
            }
        }
        Ok(StoreValue::String(s))
    }

    /// Rebuild the native value from its store representation
    pub fn inflate(&self, raw: &StoreValue) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }

        let corrupt = || {
            Error::inflate(
                self.path(),
                format!("cannot read {} as {}", raw, self.kind.name()),
            )
        };

        match (&self.kind, raw) {
            (PropertyKind::Alias { .. }, _) => Err(corrupt()),
            (PropertyKind::String, StoreValue::String(s)) => Ok(Value::String(s.clone())),
            (PropertyKind::Integer, StoreValue::Integer(i)) => Ok(Value::Integer(*i)),
            (PropertyKind::Float, StoreValue::Float(f)) => Ok(Value::Float(*f)),
            (PropertyKind::Float, StoreValue::Integer(i)) => Ok(Value::Float(*i as f64)),
            (PropertyKind::Boolean, StoreValue::Boolean(b)) => Ok(Value::Boolean(*b)),
            (PropertyKind::Date, StoreValue::String(s)) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|_| corrupt()),
            (PropertyKind::DateTime, StoreValue::Integer(micros)) => {
                let secs = micros.div_euclid(1_000_000);
                let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
                DateTime::from_timestamp(secs, nanos)
                    .map(Value::DateTime)
                    .ok_or_else(corrupt)
            }
            _ => Err(corrupt()),
        }
    }
}
