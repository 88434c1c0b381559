//! Relationship traversal bound to one source instance
//!
//! Cardinality is checked twice on every write: first against a count read
//! from the store, which gives a precise error before anything changes, then
//! by [`EdgeGuard`]s evaluated inside the store's write so a concurrent
//! writer cannot push a node past its cap or floor.

use crate::cardinality::Cardinality;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::index;
use crate::instance::{NodeId, NodeInstance};
use crate::query::{Anchor, Criteria, NodeQuery};
use crate::relation::{RelationshipDescriptor, RelationshipEdge};
use crate::store::{EdgeDelete, EdgeGuard, EdgeWrite, GraphStore, StoredEdge};
use crate::value::NodeValues;

/// A relationship descriptor bound to a (possibly unsaved) source instance
pub struct TraversalHandle<'a, S: GraphStore + ?Sized> {
    db: &'a Database<S>,
    descriptor: RelationshipDescriptor,
    source: Option<NodeId>,
    source_desc: String,
}

/// One endpoint's view of the edges a write touches
struct Side {
    relationship: String,
    cardinality: Cardinality,
    anchor: Anchor,
    other_labels: Vec<String>,
}

impl Side {
    fn of(descriptor: &RelationshipDescriptor, node: &NodeId) -> Self {
        Self {
            relationship: descriptor.path(),
            cardinality: descriptor.cardinality_constraint(),
            anchor: Anchor::new(node.clone(), descriptor.rel_type(), descriptor.direction()),
            other_labels: descriptor.targets().to_vec(),
        }
    }

    fn query(&self) -> NodeQuery {
        NodeQuery::new()
            .with_labels(self.other_labels.iter().cloned())
            .anchored(self.anchor.clone())
    }

    fn guard(&self) -> EdgeGuard {
        EdgeGuard {
            anchor: self.anchor.clone(),
            other_labels: self.other_labels.clone(),
            min: self.cardinality.min(),
            max: self.cardinality.max(),
            relationship: self.relationship.clone(),
        }
    }
}

impl<'a, S: GraphStore + ?Sized> TraversalHandle<'a, S> {
    pub(crate) fn new(
        db: &'a Database<S>,
        descriptor: RelationshipDescriptor,
        source: Option<NodeId>,
        source_desc: String,
    ) -> Self {
        Self {
            db,
            descriptor,
            source,
            source_desc,
        }
    }

    pub fn descriptor(&self) -> &RelationshipDescriptor {
        &self.descriptor
    }

    fn source_id(&self) -> Result<&NodeId> {
        self.source.as_ref().ok_or_else(|| {
            Error::InstanceNotSaved(format!(
                "{} must be saved before using {}",
                self.source_desc,
                self.descriptor.path()
            ))
        })
    }

    fn source_side(&self) -> Result<Side> {
        Ok(Side::of(&self.descriptor, self.source_id()?))
    }

    /// The saved id of `target`, after checking it is a declared target kind
    fn target_id<'t>(&self, target: &'t NodeInstance) -> Result<&'t NodeId> {
        if !self.descriptor.accepts(target.label()) {
            return Err(Error::validation(
                self.descriptor.path(),
                format!(
                    "expected {}, got {}",
                    self.descriptor.targets().join(" or "),
                    target.label()
                ),
            ));
        }
        target.require_id()
    }

    /// The target's reciprocal declaration, when it constrains anything
    fn target_side(&self, target: &NodeInstance, target_id: &NodeId) -> Option<Side> {
        self.db
            .registry()
            .reciprocal(&self.descriptor, target.label())
            .filter(|r| r.cardinality_constraint().is_constrained())
            .map(|r| Side::of(r, target_id))
    }

    async fn count_side(&self, side: &Side) -> Result<usize> {
        self.db.store().count(&side.query()).await
    }

    async fn edges_to(&self, target_id: &NodeId) -> Result<Vec<StoredEdge>> {
        self.db
            .store()
            .find_edges(
                self.source_id()?,
                target_id,
                self.descriptor.rel_type(),
                self.descriptor.direction(),
            )
            .await
    }

    fn to_edge(&self, edge: StoredEdge) -> Result<RelationshipEdge> {
        Ok(RelationshipEdge {
            properties: self.descriptor.inflate_edge_properties(&edge.properties)?,
            id: edge.id,
            from_id: edge.from_id,
            to_id: edge.to_id,
            rel_type: edge.rel_type,
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────

    /// Connect the source to `target`, with optional edge properties
    pub async fn connect(
        &self,
        target: &NodeInstance,
        properties: NodeValues,
    ) -> Result<RelationshipEdge> {
        let source = self.source_side()?;
        let target_id = self.target_id(target)?.clone();
        let edge_props = self.descriptor.deflate_edge_properties(&properties)?;

        let mut guards = Vec::new();
        for side in std::iter::once(source).chain(self.target_side(target, &target_id)) {
            if side.cardinality.max().is_some() {
                let current = self.count_side(&side).await?;
                side.cardinality
                    .check_connect(&side.relationship, current)
                    .map_err(|e| on_node(e, &side.anchor.node))?;
                guards.push(side.guard());
            }
        }

        let write = EdgeWrite {
            source: self.source_id()?.clone(),
            target: target_id,
            rel_type: self.descriptor.rel_type().to_string(),
            direction: self.descriptor.direction(),
            properties: edge_props,
            guards,
        };
        let edge = self.db.store().create_edge(write).await?;
        tracing::debug!(
            "Connected {} -[{}]-> {}",
            edge.from_id,
            edge.rel_type,
            edge.to_id
        );
        self.to_edge(edge)
    }

    /// Remove one edge to `target`; a no-op when none exists
    pub async fn disconnect(&self, target: &NodeInstance) -> Result<()> {
        self.remove_one(target).await.map(|_| ())
    }

    async fn remove_one(&self, target: &NodeInstance) -> Result<bool> {
        let source = self.source_side()?;
        let target_id = self.target_id(target)?.clone();
        let parallel = self.edges_to(&target_id).await?.len();
        if parallel == 0 {
            return Ok(false);
        }

        let mut guards = Vec::new();
        for side in std::iter::once(source).chain(self.target_side(target, &target_id)) {
            if side.cardinality.min() > 0 {
                // With parallel edges the endpoint stays connected
                if parallel == 1 {
                    let current = self.count_side(&side).await?;
                    side.cardinality
                        .check_disconnect(&side.relationship, current)
                        .map_err(|e| on_node(e, &side.anchor.node))?;
                }
                guards.push(side.guard());
            }
        }

        let delete = EdgeDelete {
            source: self.source_id()?.clone(),
            target: target_id,
            rel_type: self.descriptor.rel_type().to_string(),
            direction: self.descriptor.direction(),
            guards,
        };
        let removed = self.db.store().delete_edge(delete).await?;
        if removed {
            tracing::debug!("Disconnected {} from {}", self.source_desc, target.describe());
        }
        Ok(removed)
    }

    /// Remove every edge of this relationship; returns the number removed
    pub async fn disconnect_all(&self) -> Result<usize> {
        let cardinality = self.descriptor.cardinality_constraint();
        if cardinality.min() > 0 {
            return Err(Error::AttemptedCardinalityViolation {
                relationship: self.descriptor.path(),
                message: format!("{} cannot be emptied; use reconnect", cardinality),
            });
        }

        let mut removed = 0;
        for target in self.all().await? {
            while self.remove_one(&target).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Point the edge to `old` at `new` instead, keeping its properties
    ///
    /// The source's count never changes, so this works on `One`.
    pub async fn reconnect(&self, old: &NodeInstance, new: &NodeInstance) -> Result<RelationshipEdge> {
        let source_id = self.source_id()?.clone();
        let old_id = self.target_id(old)?.clone();
        let new_id = self.target_id(new)?.clone();

        let existing = self
            .edges_to(&old_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::InstanceNotFound(format!(
                    "{} is not connected to {} via {}",
                    self.source_desc,
                    old.describe(),
                    self.descriptor.path()
                ))
            })?;
        if old_id == new_id {
            return self.to_edge(existing);
        }

        let mut create_guards = Vec::new();
        if let Some(side) = self.target_side(new, &new_id) {
            if side.cardinality.max().is_some() {
                let current = self.count_side(&side).await?;
                side.cardinality
                    .check_connect(&side.relationship, current)
                    .map_err(|e| on_node(e, &new_id))?;
                create_guards.push(side.guard());
            }
        }
        // The source must end the swap where it started
        let source = Side::of(&self.descriptor, &source_id);
        let mut delete_guards = Vec::new();
        if source.cardinality.is_constrained() {
            delete_guards.push(source.guard());
        }
        if let Some(side) = self.target_side(old, &old_id) {
            if side.cardinality.min() > 0 {
                let current = self.count_side(&side).await?;
                side.cardinality
                    .check_disconnect(&side.relationship, current)
                    .map_err(|e| on_node(e, &old_id))?;
                delete_guards.push(side.guard());
            }
        }

        let write = EdgeWrite {
            source: source_id.clone(),
            target: new_id.clone(),
            rel_type: self.descriptor.rel_type().to_string(),
            direction: self.descriptor.direction(),
            properties: existing.properties.clone(),
            guards: create_guards,
        };
        let created = self.db.store().create_edge(write).await?;

        let delete = EdgeDelete {
            source: source_id.clone(),
            target: old_id,
            rel_type: self.descriptor.rel_type().to_string(),
            direction: self.descriptor.direction(),
            guards: delete_guards,
        };
        let failure = match self.db.store().delete_edge(delete).await {
            Ok(true) => None,
            // Another writer moved or removed the old edge first
            Ok(false) => Some(Error::InstanceNotFound(format!(
                "{} is no longer connected to {} via {}",
                self.source_desc,
                old.describe(),
                self.descriptor.path()
            ))),
            Err(e) => Some(e),
        };
        if let Some(e) = failure {
            self.undo_create(&source_id, &new_id).await;
            return Err(e);
        }

        tracing::debug!(
            "Reconnected {} from {} to {}",
            self.descriptor.path(),
            old.describe(),
            new.describe()
        );
        self.to_edge(created)
    }

    /// Remove the edge a failed reconnect created
    async fn undo_create(&self, source: &NodeId, target: &NodeId) {
        let undo = EdgeDelete {
            source: source.clone(),
            target: target.clone(),
            rel_type: self.descriptor.rel_type().to_string(),
            direction: self.descriptor.direction(),
            guards: Vec::new(),
        };
        if let Err(e) = self.db.store().delete_edge(undo).await {
            tracing::error!("Could not undo reconnect on {}: {}", self.descriptor.path(), e);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────

    /// Every connected endpoint, each inflated to its own kind
    pub async fn all(&self) -> Result<Vec<NodeInstance>> {
        let side = self.source_side()?;
        let rows = self.db.store().query(&side.query()).await?;
        let instances = rows
            .iter()
            .map(|row| self.db.inflate(row))
            .collect::<Result<Vec<_>>>()?;

        if let Err(e) = side
            .cardinality
            .validate_existing(&side.relationship, instances.len())
        {
            tracing::warn!("{} on {}", e, self.source_desc);
        }
        Ok(instances)
    }

    /// The single connected endpoint
    pub async fn single(&self) -> Result<Option<NodeInstance>> {
        let mut all = self.all().await?;
        let cardinality = self.descriptor.cardinality_constraint();
        let too_many = cardinality.max() == Some(1) && all.len() > 1;
        let missing = cardinality.min() > 0 && all.is_empty();
        if too_many || missing {
            return Err(Error::CardinalityViolation {
                relationship: self.descriptor.path(),
                message: format!(
                    "{} but {} has {} connection(s)",
                    cardinality,
                    self.source_desc,
                    all.len()
                ),
            });
        }
        Ok(if all.is_empty() { None } else { Some(all.remove(0)) })
    }

    pub async fn is_connected(&self, target: &NodeInstance) -> Result<bool> {
        let target_id = self.target_id(target)?;
        Ok(!self.edges_to(target_id).await?.is_empty())
    }

    /// The edge to `target`, if any
    pub async fn relationship(&self, target: &NodeInstance) -> Result<Option<RelationshipEdge>> {
        let target_id = self.target_id(target)?;
        match self.edges_to(target_id).await?.into_iter().next() {
            Some(edge) => Ok(Some(self.to_edge(edge)?)),
            None => Ok(None),
        }
    }

    /// Connected endpoints matching `criteria`, searched per target kind
    ///
    /// Target kinds that lack a field named in `criteria` are skipped; it is
    /// an error only when no target kind has them all.
    pub async fn search(&self, criteria: &Criteria) -> Result<Vec<NodeInstance>> {
        let side = self.source_side()?;
        let mut kinds = Vec::new();
        for label in self.descriptor.targets() {
            let kind = self.db.kind(label)?;
            if index::applies(&kind, criteria) {
                kinds.push(kind);
            }
        }
        if kinds.is_empty() {
            return Err(Error::validation(
                self.descriptor.path(),
                format!("no target kind has every field in {}", criteria),
            ));
        }

        let mut found = Vec::new();
        for kind in &kinds {
            let mut rows = self
                .db
                .find(kind, Some(side.anchor.clone()), criteria, None)
                .await?;
            found.append(&mut rows);
        }
        Ok(found)
    }

    /// Number of connected endpoints, counted by the store
    pub async fn count(&self) -> Result<usize> {
        let side = self.source_side()?;
        self.count_side(&side).await
    }

    /// Check stored data against the declared cardinality
    pub async fn validate_existing(&self) -> Result<()> {
        let side = self.source_side()?;
        let count = self.count_side(&side).await?;
        side.cardinality
            .validate_existing(&side.relationship, count)
            .map_err(|e| on_node(e, &side.anchor.node))
    }
}

/// Name the node whose count was checked in a cardinality error
fn on_node(err: Error, node: &NodeId) -> Error {
    match err {
        Error::AttemptedCardinalityViolation {
            relationship,
            message,
        } => Error::AttemptedCardinalityViolation {
            relationship,
            message: format!("{} (node {})", message, node),
        },
        Error::CardinalityViolation {
            relationship,
            message,
        } => Error::CardinalityViolation {
            relationship,
            message: format!("{} (node {})", message, node),
        },
        other => other,
    }
}
