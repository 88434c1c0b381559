//! Relationship (edge) descriptors and edge types

use crate::cardinality::Cardinality;
use crate::error::{Error, Result};
use crate::instance::NodeId;
use crate::property::PropertyDescriptor;
use crate::value::{NodeValues, PropertyMap, Value};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub Ulid);

impl EdgeId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_string(s: &str) -> std::result::Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a relationship, seen from the instance that declares it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    #[serde(alias = "both")]
    Either,
}

impl Direction {
    /// The same edges seen from the other endpoint
    pub fn reverse(&self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
            Direction::Either => Direction::Either,
        }
    }

    /// Whether an edge stored `from -> to` leaves `node` in this direction toward `other`
    pub fn matches(&self, from: &NodeId, to: &NodeId, node: &NodeId, other: Option<&NodeId>) -> bool {
        let forward = from == node && other.map_or(true, |o| to == o);
        let backward = to == node && other.map_or(true, |o| from == o);
        match self {
            Direction::Outgoing => forward,
            Direction::Incoming => backward,
            Direction::Either => forward || backward,
        }
    }
}

/// A typed edge kind declared on an entity kind
#[derive(Debug, Clone)]
pub struct RelationshipDescriptor {
    name: String,
    rel_type: String,
    direction: Direction,
    targets: Vec<String>,
    cardinality: Cardinality,
    edge_properties: Vec<PropertyDescriptor>,
    owner: String,
}

impl RelationshipDescriptor {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            name: name.into(),
            rel_type: rel_type.into(),
            direction,
            targets: vec![target.into()],
            cardinality: Cardinality::ZeroOrMore,
            edge_properties: Vec::new(),
            owner: String::new(),
        }
    }

    /// Edges leaving the declaring instance
    pub fn outgoing(
        name: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self::new(name, target, rel_type, Direction::Outgoing)
    }

    /// Edges arriving at the declaring instance
    pub fn incoming(
        name: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self::new(name, target, rel_type, Direction::Incoming)
    }

    /// Edges in either direction
    pub fn either(
        name: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self::new(name, target, rel_type, Direction::Either)
    }

    /// Accept another target kind (polymorphic relationship)
    pub fn or_target(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
        self
    }

    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Declare a property carried by the edges themselves
    pub fn edge_property(mut self, property: PropertyDescriptor) -> Self {
        self.edge_properties.push(property);
        self
    }

    pub(crate) fn set_owner(&mut self, owner: &str) {
        self.owner = owner.to_string();
        let path = self.path();
        for prop in &mut self.edge_properties {
            prop.set_owner(&path);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn cardinality_constraint(&self) -> Cardinality {
        self.cardinality
    }

    pub fn edge_properties(&self) -> &[PropertyDescriptor] {
        &self.edge_properties
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// `Kind.relationship`, used in error messages
    pub fn path(&self) -> String {
        if self.owner.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.owner, self.name)
        }
    }

    pub fn accepts(&self, label: &str) -> bool {
        self.targets.iter().any(|t| t == label)
    }

    /// Whether `other` describes the same edges from the far endpoint
    pub fn is_reciprocal(&self, other: &RelationshipDescriptor) -> bool {
        other.rel_type == self.rel_type
            && other.direction == self.direction.reverse()
            && other.accepts(&self.owner)
            && self.accepts(&other.owner)
    }

    /// Validate and deflate the properties given for a new edge
    pub fn deflate_edge_properties(&self, values: &NodeValues) -> Result<PropertyMap> {
        let mut props = PropertyMap::new();

        if self.edge_properties.is_empty() {
            for (key, value) in values {
                if !value.is_null() {
                    props.insert(key.clone(), value.to_store_value());
                }
            }
            return Ok(props);
        }

        if let Some(unknown) = values
            .keys()
            .find(|k| !self.edge_properties.iter().any(|p| p.name() == k.as_str()))
        {
            return Err(Error::validation(
                format!("{}.{}", self.path(), unknown),
                "not a declared edge property",
            ));
        }

        for prop in &self.edge_properties {
            let value = match values.get(prop.name()) {
                Some(v) if !v.is_null() => v.clone(),
                _ => prop.default_value().unwrap_or(Value::Null),
            };
            let stored = prop.deflate(&value)?;
            if !stored.is_null() {
                props.insert(prop.name().to_string(), stored);
            }
        }
        Ok(props)
    }

    /// Inflate stored edge properties, by schema when one is declared
    pub fn inflate_edge_properties(&self, props: &PropertyMap) -> Result<NodeValues> {
        let mut values = NodeValues::new();
        for (key, raw) in props {
            let value = match self.edge_properties.iter().find(|p| p.name() == key) {
                Some(prop) => prop.inflate(raw)?,
                None => Value::from(raw),
            };
            values.insert(key.clone(), value);
        }
        Ok(values)
    }
}

/// An edge between two saved instances, as stored (`from -> to`)
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipEdge {
    pub id: EdgeId,
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub rel_type: String,
    pub properties: NodeValues,
}
