//! Per-kind category nodes

use crate::database::{Database, INSTANCE_REL_TYPE};
use crate::error::Result;
use crate::instance::{NodeId, NodeInstance};
use crate::kind::EntityKind;
use crate::query::{Anchor, NodeQuery};
use crate::relation::Direction;
use crate::store::GraphStore;
use std::sync::Arc;

/// The category node of one kind, linked to every saved instance
///
/// Reads are not cached; each call asks the store again.
pub struct CategoryNode<'a, S: GraphStore + ?Sized> {
    db: &'a Database<S>,
    kind: Arc<EntityKind>,
    id: NodeId,
}

impl<'a, S: GraphStore + ?Sized> CategoryNode<'a, S> {
    pub(crate) fn new(db: &'a Database<S>, kind: Arc<EntityKind>, id: NodeId) -> Self {
        Self { db, kind, id }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> &Arc<EntityKind> {
        &self.kind
    }

    fn query(&self) -> NodeQuery {
        NodeQuery::new()
            .with_label(self.kind.label())
            .anchored(Anchor::new(self.id.clone(), INSTANCE_REL_TYPE, Direction::Outgoing))
    }

    /// Every saved instance of the kind, in store order
    pub async fn instances(&self) -> Result<Vec<NodeInstance>> {
        let rows = self.db.store().query(&self.query()).await?;
        rows.iter()
            .map(|row| NodeInstance::from_stored(self.kind.clone(), row))
            .collect()
    }

    pub async fn count(&self) -> Result<usize> {
        self.db.store().count(&self.query()).await
    }
}
