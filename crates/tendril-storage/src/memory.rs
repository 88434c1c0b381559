//! In-memory graph store
//!
//! Useful for tests and throwaway graphs. The whole graph sits behind one
//! `RwLock`, so each trait call is a single atomic step.

use crate::error::StorageError;
use crate::index::PropertyIndex;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tendril_core::{
    Direction, EdgeDelete, EdgeGuard, EdgeId, EdgeWrite, Error, GraphStore, Membership, NodeId,
    NodeQuery, PropertyMap, Result, Row, StoredEdge, StoredNode,
};

/// A raw query handler registered under a name
pub type Procedure = Arc<dyn Fn(&MemoryGraph, &PropertyMap) -> Result<Vec<Row>> + Send + Sync>;

/// The graph held by a [`MemoryStore`]
#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: BTreeMap<NodeId, StoredNode>,
    edges: BTreeMap<EdgeId, StoredEdge>,
    /// (label, property) -> index
    indexes: HashMap<(String, String), PropertyIndex>,
}

impl MemoryGraph {
    pub fn node(&self, id: &NodeId) -> Option<&StoredNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &StoredNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &StoredEdge> {
        self.edges.values()
    }

    /// Fail if `properties` would duplicate a unique value held by another node
    fn check_unique(&self, label: &str, properties: &PropertyMap, except: Option<&NodeId>) -> Result<()> {
        for ((index_label, field), index) in &self.indexes {
            if index_label != label || !index.is_unique() {
                continue;
            }
            if let Some(value) = properties.get(field).filter(|v| !v.is_null()) {
                if let Some(holder) = index.holder_other_than(value, except) {
                    return Err(Error::StoreConstraintViolation {
                        constraint: format!("{}.{}", label, field),
                        message: format!("{} = {} already held by node {}", field, value, holder),
                    });
                }
            }
        }
        Ok(())
    }

    fn index_node(&mut self, node: &StoredNode) {
        for ((label, field), index) in self.indexes.iter_mut() {
            if *label == node.label {
                if let Some(value) = node.properties.get(field) {
                    index.insert(value.clone(), node.id.clone());
                }
            }
        }
    }

    fn unindex_node(&mut self, node: &StoredNode) {
        for ((label, field), index) in self.indexes.iter_mut() {
            if *label == node.label {
                if let Some(value) = node.properties.get(field) {
                    index.remove(value, &node.id);
                }
            }
        }
    }

    fn insert_node(&mut self, label: &str, properties: PropertyMap) -> Result<StoredNode> {
        let properties: PropertyMap = properties.into_iter().filter(|(_, v)| !v.is_null()).collect();
        self.check_unique(label, &properties, None)?;
        let node = StoredNode {
            id: NodeId::new(),
            label: label.to_string(),
            properties,
        };
        self.index_node(&node);
        self.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    fn remove_node(&mut self, id: &NodeId) -> Option<StoredNode> {
        let node = self.nodes.remove(id)?;
        self.unindex_node(&node);
        Some(node)
    }

    /// Insert rows and their category edges, leaving nothing behind on failure
    fn insert_members(
        &mut self,
        label: &str,
        rows: Vec<PropertyMap>,
        membership: Option<&Membership>,
    ) -> Result<Vec<StoredNode>> {
        if let Some(m) = membership {
            if !self.nodes.contains_key(&m.category) {
                return Err(Error::InstanceNotFound(format!("category node {}", m.category)));
            }
        }

        let mut created: Vec<StoredNode> = Vec::with_capacity(rows.len());
        for properties in rows {
            match self.insert_node(label, properties) {
                Ok(node) => created.push(node),
                Err(e) => {
                    for node in &created {
                        self.remove_node(&node.id);
                    }
                    return Err(e);
                }
            }
        }
        if let Some(m) = membership {
            for node in &created {
                let edge = m.edge_to(&node.id);
                self.edges.insert(edge.id.clone(), edge);
            }
        }
        Ok(created)
    }

    /// Incident edges counted by a guard
    fn guard_count(&self, guard: &EdgeGuard) -> usize {
        self.edges
            .values()
            .filter_map(|edge| guard.anchor.other_endpoint(edge))
            .filter(|other| {
                self.nodes
                    .get(*other)
                    .map_or(false, |n| guard.counts_label(&n.label))
            })
            .count()
    }

    fn check_guards(&self, guards: &[EdgeGuard]) -> Result<()> {
        for guard in guards {
            guard.check(self.guard_count(guard))?;
        }
        Ok(())
    }

    /// Node ids a query could return, before label and filter checks
    fn candidates(&self, query: &NodeQuery) -> Vec<NodeId> {
        if let Some(anchor) = &query.anchor {
            let adjacent: BTreeSet<NodeId> = self
                .edges
                .values()
                .filter_map(|edge| anchor.other_endpoint(edge))
                .cloned()
                .collect();
            return adjacent.into_iter().collect();
        }

        if let [label] = query.labels.as_slice() {
            for filter in &query.filters {
                let key = (label.clone(), filter.field.clone());
                if let Some(ids) = self
                    .indexes
                    .get(&key)
                    .and_then(|index| index.candidates(&filter.predicate))
                {
                    return ids;
                }
            }
        }
        self.nodes.keys().cloned().collect()
    }

    pub fn query(&self, query: &NodeQuery) -> Vec<StoredNode> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for id in self.candidates(query) {
            if query.limit.map_or(false, |l| result.len() >= l) {
                break;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if query.matches(&node.label, &node.properties) && seen.insert(id) {
                result.push(node.clone());
            }
        }
        result
    }
}

/// In-memory graph store
#[derive(Default)]
pub struct MemoryStore {
    graph: RwLock<MemoryGraph>,
    procedures: RwLock<HashMap<String, Procedure>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `execute_raw` calls whose text is `name`
    pub fn register_procedure<F>(&self, name: &str, procedure: F) -> Result<()>
    where
        F: Fn(&MemoryGraph, &PropertyMap) -> Result<Vec<Row>> + Send + Sync + 'static,
    {
        let mut procedures = self
            .procedures
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        procedures.insert(name.trim().to_string(), Arc::new(procedure));
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryGraph>> {
        Ok(self
            .graph
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryGraph>> {
        Ok(self
            .graph
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn ensure_index(&self, label: &str, property: &str, unique: bool) -> Result<()> {
        let mut graph = self.write()?;
        let key = (label.to_string(), property.to_string());
        if let Some(existing) = graph.indexes.get_mut(&key) {
            if unique && !existing.is_unique() {
                if existing.has_duplicates() {
                    return Err(Error::StoreConstraintViolation {
                        constraint: format!("{}.{}", label, property),
                        message: "existing nodes already share a value".to_string(),
                    });
                }
                existing.make_unique();
            }
            return Ok(());
        }

        let mut index = PropertyIndex::new(unique);
        for node in graph.nodes.values().filter(|n| n.label == label) {
            if let Some(value) = node.properties.get(property) {
                index.insert(value.clone(), node.id.clone());
            }
        }
        if unique && index.has_duplicates() {
            return Err(Error::StoreConstraintViolation {
                constraint: format!("{}.{}", label, property),
                message: "existing nodes already share a value".to_string(),
            });
        }
        graph.indexes.insert(key, index);
        tracing::debug!("Created {}index on {}.{}", if unique { "unique " } else { "" }, label, property);
        Ok(())
    }

    async fn create_node(
        &self,
        label: &str,
        properties: PropertyMap,
        membership: Option<&Membership>,
    ) -> Result<StoredNode> {
        let mut graph = self.write()?;
        graph
            .insert_members(label, vec![properties], membership)?
            .pop()
            .ok_or_else(|| Error::Internal(format!("created no {} node", label)))
    }

    async fn create_nodes(
        &self,
        label: &str,
        rows: Vec<PropertyMap>,
        membership: Option<&Membership>,
    ) -> Result<Vec<StoredNode>> {
        let mut graph = self.write()?;
        graph.insert_members(label, rows, membership)
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<StoredNode>> {
        Ok(self.read()?.nodes.get(id).cloned())
    }

    async fn update_node(&self, id: &NodeId, properties: PropertyMap) -> Result<StoredNode> {
        let mut graph = self.write()?;
        let current = graph
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| Error::InstanceNotFound(format!("node {}", id)))?;

        let mut updated = current.clone();
        for (key, value) in properties {
            if value.is_null() {
                updated.properties.remove(&key);
            } else {
                updated.properties.insert(key, value);
            }
        }
        graph.check_unique(&updated.label, &updated.properties, Some(id))?;

        graph.unindex_node(&current);
        graph.index_node(&updated);
        graph.nodes.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete_node(&self, id: &NodeId) -> Result<()> {
        let mut graph = self.write()?;
        if graph.edges.values().any(|e| e.from_id == *id || e.to_id == *id) {
            return Err(Error::Internal(format!("node {} still has edges", id)));
        }
        graph.remove_node(id);
        Ok(())
    }

    async fn delete_edges(&self, id: &NodeId) -> Result<usize> {
        let mut graph = self.write()?;
        let before = graph.edges.len();
        graph.edges.retain(|_, e| e.from_id != *id && e.to_id != *id);
        Ok(before - graph.edges.len())
    }

    async fn create_edge(&self, write: EdgeWrite) -> Result<StoredEdge> {
        let mut graph = self.write()?;
        for id in [&write.source, &write.target] {
            if !graph.nodes.contains_key(id) {
                return Err(Error::InstanceNotFound(format!("node {}", id)));
            }
        }

        let edge = write.to_edge();
        graph.edges.insert(edge.id.clone(), edge.clone());
        if let Err(e) = graph.check_guards(&write.guards) {
            graph.edges.remove(&edge.id);
            return Err(e);
        }
        Ok(edge)
    }

    async fn delete_edge(&self, delete: EdgeDelete) -> Result<bool> {
        let mut graph = self.write()?;
        let Some(id) = graph
            .edges
            .values()
            .find(|e| delete.matches(e))
            .map(|e| e.id.clone())
        else {
            return Ok(false);
        };

        let Some(edge) = graph.edges.remove(&id) else {
            return Ok(false);
        };
        if let Err(e) = graph.check_guards(&delete.guards) {
            graph.edges.insert(id, edge);
            return Err(e);
        }
        Ok(true)
    }

    async fn find_edges(
        &self,
        source: &NodeId,
        target: &NodeId,
        rel_type: &str,
        direction: Direction,
    ) -> Result<Vec<StoredEdge>> {
        let graph = self.read()?;
        Ok(graph
            .edges
            .values()
            .filter(|e| e.rel_type == rel_type)
            .filter(|e| direction.matches(&e.from_id, &e.to_id, source, Some(target)))
            .cloned()
            .collect())
    }

    async fn query(&self, query: &NodeQuery) -> Result<Vec<StoredNode>> {
        Ok(self.read()?.query(query))
    }

    async fn execute_raw(&self, text: &str, params: &PropertyMap) -> Result<Vec<Row>> {
        let procedure = {
            let procedures = self
                .procedures
                .read()
                .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
            procedures.get(text.trim()).cloned()
        };
        let procedure = procedure.ok_or_else(|| {
            Error::Unsupported(format!("no procedure registered as '{}'", text.trim()))
        })?;

        let graph = self.read()?;
        procedure(&graph, params)
    }

    async fn health_check(&self) -> Result<()> {
        self.read().map(|_| ())
    }
}
