//! The graph store abstraction the engine runs on

use crate::error::{Error, Result};
use crate::instance::NodeId;
use crate::query::{Anchor, NodeQuery};
use crate::relation::{Direction, EdgeId};
use crate::value::{PropertyMap, StoreValue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node as the store holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNode {
    pub id: NodeId,
    pub label: String,
    pub properties: PropertyMap,
}

/// An edge as the store holds it, always oriented `from -> to`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEdge {
    pub id: EdgeId,
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub rel_type: String,
    pub properties: PropertyMap,
}

/// Bound on the number of edges incident to one node, checked inside the
/// same store transaction as the edge write it accompanies
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeGuard {
    pub anchor: Anchor,
    /// Labels of the far endpoint that count; empty counts every edge
    pub other_labels: Vec<String>,
    pub min: usize,
    pub max: Option<usize>,
    /// `Kind.relationship`, for the error message
    pub relationship: String,
}

impl EdgeGuard {
    /// Check the incident edge count as it stands after the write
    pub fn check(&self, count: usize) -> Result<()> {
        let over = self.max.map_or(false, |max| count > max);
        if count < self.min || over {
            return Err(Error::AttemptedCardinalityViolation {
                relationship: self.relationship.clone(),
                message: format!(
                    "write would leave {} connection(s) on {} (allowed {}..{})",
                    count,
                    self.anchor.node,
                    self.min,
                    self.max.map_or_else(|| "".to_string(), |m| m.to_string())
                ),
            });
        }
        Ok(())
    }

    pub fn counts_label(&self, label: &str) -> bool {
        self.other_labels.is_empty() || self.other_labels.iter().any(|l| l == label)
    }
}

/// Category edge written in the same transaction as the node(s) it links
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub category: NodeId,
    pub rel_type: String,
}

impl Membership {
    pub fn new(category: NodeId, rel_type: impl Into<String>) -> Self {
        Self {
            category,
            rel_type: rel_type.into(),
        }
    }

    /// The `category -> member` edge
    pub fn edge_to(&self, member: &NodeId) -> StoredEdge {
        EdgeWrite::new(
            self.category.clone(),
            member.clone(),
            self.rel_type.clone(),
            Direction::Outgoing,
        )
        .to_edge()
    }
}

/// Request to create one edge
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeWrite {
    pub source: NodeId,
    pub target: NodeId,
    pub rel_type: String,
    /// Direction seen from `source`; `Either` stores `source -> target`
    pub direction: Direction,
    pub properties: PropertyMap,
    pub guards: Vec<EdgeGuard>,
}

impl EdgeWrite {
    pub fn new(source: NodeId, target: NodeId, rel_type: impl Into<String>, direction: Direction) -> Self {
        Self {
            source,
            target,
            rel_type: rel_type.into(),
            direction,
            properties: PropertyMap::new(),
            guards: Vec::new(),
        }
    }

    /// Stored orientation `(from, to)`
    pub fn endpoints(&self) -> (&NodeId, &NodeId) {
        match self.direction {
            Direction::Incoming => (&self.target, &self.source),
            Direction::Outgoing | Direction::Either => (&self.source, &self.target),
        }
    }

    pub fn to_edge(&self) -> StoredEdge {
        let (from, to) = self.endpoints();
        StoredEdge {
            id: EdgeId::new(),
            from_id: from.clone(),
            to_id: to.clone(),
            rel_type: self.rel_type.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// Request to remove one edge between two nodes
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDelete {
    pub source: NodeId,
    pub target: NodeId,
    pub rel_type: String,
    pub direction: Direction,
    pub guards: Vec<EdgeGuard>,
}

impl EdgeDelete {
    pub fn matches(&self, edge: &StoredEdge) -> bool {
        edge.rel_type == self.rel_type
            && self
                .direction
                .matches(&edge.from_id, &edge.to_id, &self.source, Some(&self.target))
    }
}

/// A value in a raw query result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowValue {
    Node(StoredNode),
    Edge(StoredEdge),
    Scalar(StoreValue),
}

/// One raw query result row, keyed by column name
pub type Row = BTreeMap<String, RowValue>;

/// Storage backend for the object-graph engine
///
/// Unique indexes are enforced by the store: a write that would duplicate a
/// unique value fails with [`Error::StoreConstraintViolation`] whose
/// `constraint` is `Label.property`. Multi-step writes (`create_nodes`,
/// guarded edge writes) are atomic.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────
    // Schema
    // ─────────────────────────────────────────────────────────────

    /// Install an index (idempotent); `unique` also installs the constraint
    async fn ensure_index(&self, label: &str, property: &str, unique: bool) -> Result<()>;

    // ─────────────────────────────────────────────────────────────
    // Nodes
    // ─────────────────────────────────────────────────────────────

    /// Create a node, linked from `membership`'s category node when given;
    /// both writes commit together or not at all
    async fn create_node(
        &self,
        label: &str,
        properties: PropertyMap,
        membership: Option<&Membership>,
    ) -> Result<StoredNode>;

    /// Create many nodes of one label, with their memberships; all or nothing
    async fn create_nodes(
        &self,
        label: &str,
        rows: Vec<PropertyMap>,
        membership: Option<&Membership>,
    ) -> Result<Vec<StoredNode>>;

    async fn get_node(&self, id: &NodeId) -> Result<Option<StoredNode>>;

    /// Merge properties into a node; `Null` removes the property
    async fn update_node(&self, id: &NodeId, properties: PropertyMap) -> Result<StoredNode>;

    /// Remove a node (idempotent); its edges must already be gone
    async fn delete_node(&self, id: &NodeId) -> Result<()>;

    /// Remove every edge touching a node, returning how many went
    async fn delete_edges(&self, id: &NodeId) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────
    // Edges
    // ─────────────────────────────────────────────────────────────

    /// Create an edge; fails if either endpoint is missing or a guard trips
    async fn create_edge(&self, write: EdgeWrite) -> Result<StoredEdge>;

    /// Remove exactly one matching edge; `false` when none matched
    async fn delete_edge(&self, delete: EdgeDelete) -> Result<bool>;

    /// Edges between two nodes, seen from `source` in `direction`
    async fn find_edges(
        &self,
        source: &NodeId,
        target: &NodeId,
        rel_type: &str,
        direction: Direction,
    ) -> Result<Vec<StoredEdge>>;

    // ─────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────

    async fn query(&self, query: &NodeQuery) -> Result<Vec<StoredNode>>;

    async fn count(&self, query: &NodeQuery) -> Result<usize> {
        Ok(self.query(query).await?.len())
    }

    /// Run a backend-specific query text
    async fn execute_raw(&self, text: &str, _params: &PropertyMap) -> Result<Vec<Row>> {
        Err(Error::Unsupported(format!(
            "this store does not run raw queries ({})",
            text
        )))
    }

    async fn health_check(&self) -> Result<()>;
}
