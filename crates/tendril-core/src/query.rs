//! Query model shared by the engine and the stores
//!
//! [`NodeQuery`] and [`Filter`] speak store values and are what a
//! [`GraphStore`](crate::store::GraphStore) evaluates. [`Criteria`] is the
//! application-facing form with native values and lookup suffixes; the
//! engine translates it against a kind before anything reaches the store.

use crate::instance::NodeId;
use crate::relation::Direction;
use crate::store::StoredEdge;
use crate::value::{PropertyMap, StoreValue, Value};
use std::fmt;

/// Comparison applied to one stored property
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(StoreValue),
    Ne(StoreValue),
    Lt(StoreValue),
    Lte(StoreValue),
    Gt(StoreValue),
    Gte(StoreValue),
    In(Vec<StoreValue>),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    IsNull(bool),
}

impl Predicate {
    /// Evaluate against a property that may be absent
    pub fn matches(&self, actual: Option<&StoreValue>) -> bool {
        let actual = actual.filter(|v| !v.is_null());
        let text = || actual.and_then(StoreValue::as_str);
        let ordered = |expected: &StoreValue, accept: fn(std::cmp::Ordering) -> bool| {
            actual
                .and_then(|a| a.compare(expected))
                .map_or(false, accept)
        };

        match self {
            Predicate::Eq(expected) if expected.is_null() => actual.is_none(),
            Predicate::Eq(expected) => actual == Some(expected),
            Predicate::Ne(expected) if expected.is_null() => actual.is_some(),
            Predicate::Ne(expected) => actual != Some(expected),
            Predicate::Lt(expected) => ordered(expected, |o| o.is_lt()),
            Predicate::Lte(expected) => ordered(expected, |o| o.is_le()),
            Predicate::Gt(expected) => ordered(expected, |o| o.is_gt()),
            Predicate::Gte(expected) => ordered(expected, |o| o.is_ge()),
            Predicate::In(options) => actual.map_or(false, |a| options.contains(a)),
            Predicate::StartsWith(prefix) => text().map_or(false, |s| s.starts_with(prefix.as_str())),
            Predicate::EndsWith(suffix) => text().map_or(false, |s| s.ends_with(suffix.as_str())),
            Predicate::Contains(needle) => text().map_or(false, |s| s.contains(needle.as_str())),
            Predicate::IsNull(expected) => actual.is_none() == *expected,
        }
    }

    /// The single value an index can look up directly
    pub fn equality_key(&self) -> Option<&StoreValue> {
        match self {
            Predicate::Eq(v) if !v.is_null() => Some(v),
            _ => None,
        }
    }
}

/// A predicate on a named stored property
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub predicate: Predicate,
}

impl Filter {
    pub fn new(field: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            field: field.into(),
            predicate,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<StoreValue>) -> Self {
        Self::new(field, Predicate::Eq(value.into()))
    }

    pub fn matches(&self, properties: &PropertyMap) -> bool {
        self.predicate.matches(properties.get(&self.field))
    }
}

/// Restricts a query to nodes adjacent to `node` along one edge type
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub node: NodeId,
    pub rel_type: String,
    pub direction: Direction,
}

impl Anchor {
    pub fn new(node: NodeId, rel_type: impl Into<String>, direction: Direction) -> Self {
        Self {
            node,
            rel_type: rel_type.into(),
            direction,
        }
    }

    /// The far endpoint of `edge`, if the edge is incident to the anchor in its direction
    pub fn other_endpoint<'e>(&self, edge: &'e StoredEdge) -> Option<&'e NodeId> {
        if edge.rel_type != self.rel_type {
            return None;
        }
        let outgoing = edge.from_id == self.node;
        let incoming = edge.to_id == self.node;
        match self.direction {
            Direction::Outgoing if outgoing => Some(&edge.to_id),
            Direction::Incoming if incoming => Some(&edge.from_id),
            Direction::Either if outgoing => Some(&edge.to_id),
            Direction::Either if incoming => Some(&edge.from_id),
            _ => None,
        }
    }
}

/// A node lookup as evaluated by a store
///
/// Results are distinct nodes whose label is one of `labels` (any label
/// when empty), adjacent to the anchor when one is set, and matching every
/// filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeQuery {
    pub labels: Vec<String>,
    pub anchor: Option<Anchor>,
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
}

impl NodeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_labels<I, T>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn anchored(mut self, anchor: Anchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn accepts_label(&self, label: &str) -> bool {
        self.labels.is_empty() || self.labels.iter().any(|l| l == label)
    }

    /// Label and filter check for one node (the anchor is the store's job)
    pub fn matches(&self, label: &str, properties: &PropertyMap) -> bool {
        self.accepts_label(label) && self.filters.iter().all(|f| f.matches(properties))
    }
}

/// Lookup operator of a search criterion (`field__op` suffix)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    StartsWith,
    EndsWith,
    Contains,
    IsNull,
}

impl Lookup {
    pub fn parse(suffix: &str) -> Option<Self> {
        let lookup = match suffix {
            "exact" => Lookup::Exact,
            "ne" => Lookup::Ne,
            "lt" => Lookup::Lt,
            "lte" => Lookup::Lte,
            "gt" => Lookup::Gt,
            "gte" => Lookup::Gte,
            "in" => Lookup::In,
            "startswith" => Lookup::StartsWith,
            "endswith" => Lookup::EndsWith,
            "contains" => Lookup::Contains,
            "isnull" => Lookup::IsNull,
            _ => return None,
        };
        Some(lookup)
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Lookup::Exact => "exact",
            Lookup::Ne => "ne",
            Lookup::Lt => "lt",
            Lookup::Lte => "lte",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::In => "in",
            Lookup::StartsWith => "startswith",
            Lookup::EndsWith => "endswith",
            Lookup::Contains => "contains",
            Lookup::IsNull => "isnull",
        }
    }
}

/// One term of a [`Criteria`]
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Term {
        field: String,
        lookup: Lookup,
        values: Vec<Value>,
    },
    /// A filter built elsewhere, already in store values
    Expression(Filter),
}

/// Search criteria on native values, combined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    terms: Vec<Criterion>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    fn term(mut self, field: impl Into<String>, lookup: Lookup, values: Vec<Value>) -> Self {
        self.terms.push(Criterion::Term {
            field: field.into(),
            lookup,
            values,
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.term(field, Lookup::Exact, vec![value.into()])
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.term(field, Lookup::Ne, vec![value.into()])
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.term(field, Lookup::Lt, vec![value.into()])
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.term(field, Lookup::Lte, vec![value.into()])
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.term(field, Lookup::Gt, vec![value.into()])
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.term(field, Lookup::Gte, vec![value.into()])
    }

    pub fn is_in<I, T>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.term(field, Lookup::In, values.into_iter().map(Into::into).collect())
    }

    pub fn starts_with(self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.term(field, Lookup::StartsWith, vec![Value::String(prefix.into())])
    }

    pub fn ends_with(self, field: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.term(field, Lookup::EndsWith, vec![Value::String(suffix.into())])
    }

    pub fn contains(self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.term(field, Lookup::Contains, vec![Value::String(needle.into())])
    }

    pub fn is_null(self, field: impl Into<String>, null: bool) -> Self {
        self.term(field, Lookup::IsNull, vec![Value::Boolean(null)])
    }

    /// Add a term from a `field__op` key; a key without a known suffix is an exact match
    pub fn lookup(self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if let Some((field, suffix)) = key.rsplit_once("__") {
            if let Some(lookup) = Lookup::parse(suffix) {
                let values = match (lookup, value) {
                    (Lookup::In, Value::String(list)) => {
                        list.split(',').map(|s| Value::String(s.trim().to_string())).collect()
                    }
                    (_, value) => vec![value],
                };
                return self.term(field, lookup, values);
            }
        }
        self.term(key, Lookup::Exact, vec![value])
    }

    /// Add a prebuilt store-level filter
    pub fn expression(mut self, filter: Filter) -> Self {
        self.terms.push(Criterion::Expression(filter));
        self
    }

    pub fn terms(&self) -> &[Criterion] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for term in &self.terms {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            match term {
                Criterion::Term { field, lookup: Lookup::Exact, values } => {
                    write!(f, "{}=", field)?;
                    write_values(f, values)?;
                }
                Criterion::Term { field, lookup, values } => {
                    write!(f, "{}__{}=", field, lookup.suffix())?;
                    write_values(f, values)?;
                }
                Criterion::Expression(filter) => write!(f, "{} {:?}", filter.field, filter.predicate)?,
            }
        }
        Ok(())
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    match values {
        [single] => write!(f, "{}", single),
        many => {
            let parts: Vec<String> = many.iter().map(ToString::to_string).collect();
            write!(f, "[{}]", parts.join(", "))
        }
    }
}
