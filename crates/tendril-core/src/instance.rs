//! Node instances: in-memory projections of one stored node

use crate::error::{Error, Result};
use crate::kind::EntityKind;
use crate::store::StoredNode;
use crate::value::{NodeValues, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use ulid::Ulid;

static NULL: Value = Value::Null;

/// Store identity of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Ulid);

impl NodeId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_string(s: &str) -> std::result::Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One node of a given kind, saved or not
///
/// Instances are owned by the caller; the engine never shares one between
/// concurrent operations.
#[derive(Debug, Clone)]
pub struct NodeInstance {
    kind: Arc<EntityKind>,
    values: NodeValues,
    id: Option<NodeId>,
    dirty: BTreeSet<String>,
    deleted: bool,
}

impl NodeInstance {
    /// Create a new, unsaved instance
    pub fn new(kind: Arc<EntityKind>) -> Self {
        Self {
            kind,
            values: NodeValues::new(),
            id: None,
            dirty: BTreeSet::new(),
            deleted: false,
        }
    }

    /// Build a saved instance from a stored row
    pub fn from_stored(kind: Arc<EntityKind>, row: &StoredNode) -> Result<Self> {
        if row.label != kind.label() {
            return Err(Error::inflate(
                kind.label(),
                format!("node {} is labelled {}", row.id, row.label),
            ));
        }
        let values = kind.inflate(&row.properties)?;
        Ok(Self {
            kind,
            values,
            id: Some(row.id.clone()),
            dirty: BTreeSet::new(),
            deleted: false,
        })
    }

    /// Builder-style `set`
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Set a field (aliases write through to their target)
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let name = self.kind.resolve(field)?.name().to_string();
        self.values.insert(name.clone(), value.into());
        self.dirty.insert(name);
        Ok(())
    }

    /// Read a field (aliases read their target); unset fields read as null
    pub fn get(&self, field: &str) -> Result<&Value> {
        let prop = self.kind.resolve(field)?;
        Ok(self.values.get(prop.name()).unwrap_or(&NULL))
    }

    pub fn kind(&self) -> &Arc<EntityKind> {
        &self.kind
    }

    pub fn label(&self) -> &str {
        self.kind.label()
    }

    pub fn values(&self) -> &NodeValues {
        &self.values
    }

    pub fn id(&self) -> Option<&NodeId> {
        self.id.as_ref()
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Fields changed since the last save or refresh
    pub fn dirty_fields(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    /// The store identity, or `InstanceNotSaved`
    pub fn require_id(&self) -> Result<&NodeId> {
        self.id
            .as_ref()
            .ok_or_else(|| Error::InstanceNotSaved(self.describe()))
    }

    /// Short human-readable identity, e.g. `Person(01H...)` or `Person(unsaved, name="Jim")`
    pub fn describe(&self) -> String {
        let key = self
            .kind
            .identity_property()
            .and_then(|p| self.values.get(p.name()).map(|v| (p.name(), v)))
            .filter(|(_, v)| !v.is_null());

        match (&self.id, key) {
            (Some(id), _) => format!("{}({})", self.kind.label(), id),
            (None, Some((name, value))) => {
                format!("{}(unsaved, {}={})", self.kind.label(), name, value)
            }
            (None, None) => format!("{}(unsaved)", self.kind.label()),
        }
    }

    /// Fill unset fields from their defaults; each default is resolved at most once
    pub(crate) fn apply_defaults(&mut self) {
        let kind = self.kind.clone();
        for prop in kind.stored_properties() {
            let unset = self.values.get(prop.name()).map_or(true, Value::is_null);
            if unset {
                if let Some(value) = prop.default_value() {
                    self.values.insert(prop.name().to_string(), value);
                    self.dirty.insert(prop.name().to_string());
                }
            }
        }
    }

    pub(crate) fn assign_identity(&mut self, id: NodeId) -> Result<()> {
        if let Some(existing) = &self.id {
            return Err(Error::Internal(format!(
                "{} already has identity {}, refusing {}",
                self.kind.label(),
                existing,
                id
            )));
        }
        self.id = Some(id);
        Ok(())
    }

    /// Replace all values with freshly inflated ones
    pub(crate) fn load(&mut self, values: NodeValues) {
        self.values = values;
        self.dirty.clear();
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.id = None;
        self.deleted = true;
    }
}
