//! ReDB graph store
//!
//! Rows are stored as JSON. Every trait call runs in one redb transaction;
//! unique keys and edge guards are checked inside the write transaction, and
//! any failure aborts it, so a rejected write leaves no trace.

use crate::error::{StorageError, StorageResult};
use crate::migration::Migratable;
use async_trait::async_trait;
use redb::{Database, ReadableTable, Table, TableDefinition, WriteTransaction};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tendril_core::{
    Direction, EdgeDelete, EdgeGuard, EdgeWrite, Error, GraphStore, Membership, NodeId,
    NodeQuery, PropertyMap, Result, StoreValue, StoredEdge, StoredNode,
};

// Table definitions
const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
const EDGES: TableDefinition<&str, &[u8]> = TableDefinition::new("edges");
/// "label\x1fproperty" -> 1 for unique, 0 for plain
const INDEXES: TableDefinition<&str, u8> = TableDefinition::new("indexes");
/// "label\x1fproperty\x1fjson value" -> node id
const UNIQUE: TableDefinition<&str, &str> = TableDefinition::new("unique_keys");
const META: TableDefinition<&str, u32> = TableDefinition::new("meta");

const SCHEMA_VERSION_KEY: &str = "schema_version";
const SEP: char = '\u{1f}';

/// ReDB graph store
pub struct RedbStore {
    db: Mutex<Database>,
}

impl RedbStore {
    /// Open or create a store file at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let db = Database::create(path)?;
        let store = Self { db: Mutex::new(db) };
        store.migrate_to_latest()?;
        tracing::info!("Opened redb store at {}", path.display());
        Ok(store)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))
    }

    /// Run `op` in a write transaction, committing only if it succeeds
    fn write<T>(&self, op: impl FnOnce(&WriteTransaction) -> StorageResult<T>) -> StorageResult<T> {
        let db = self.lock()?;
        let txn = db.begin_write()?;
        match op(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    tracing::warn!("Failed to abort redb transaction: {}", abort);
                }
                Err(e)
            }
        }
    }
}

impl Migratable for RedbStore {
    fn get_schema_version(&self) -> StorageResult<u32> {
        self.write(|txn| {
            let meta = txn.open_table(META)?;
            let version = meta.get(SCHEMA_VERSION_KEY)?.map(|v| v.value()).unwrap_or(0);
            Ok(version)
        })
    }

    fn set_schema_version(&self, version: u32) -> StorageResult<()> {
        self.write(|txn| {
            let mut meta = txn.open_table(META)?;
            meta.insert(SCHEMA_VERSION_KEY, version)?;
            Ok(())
        })
    }

    fn run_migration(&self, version: u32) -> StorageResult<()> {
        match version {
            1 => self.write(|txn| {
                txn.open_table(NODES)?;
                txn.open_table(EDGES)?;
                txn.open_table(INDEXES)?;
                txn.open_table(UNIQUE)?;
                Ok(())
            }),
            other => Err(StorageError::Migration(format!(
                "no migration defined for version {}",
                other
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Row helpers, shared by read and write transactions
// ─────────────────────────────────────────────────────────────

fn index_key(label: &str, property: &str) -> String {
    format!("{}{}{}", label, SEP, property)
}

fn unique_key(label: &str, property: &str, value: &StoreValue) -> StorageResult<String> {
    Ok(format!(
        "{}{}{}",
        index_key(label, property),
        SEP,
        serde_json::to_string(value)?
    ))
}

fn load_node<T>(nodes: &T, id: &NodeId) -> StorageResult<Option<StoredNode>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let key = id.to_string();
    let node = match nodes.get(key.as_str())? {
        Some(raw) => Some(serde_json::from_slice(raw.value())?),
        None => None,
    };
    Ok(node)
}

fn all_nodes<T>(nodes: &T) -> StorageResult<Vec<StoredNode>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut result = Vec::new();
    for entry in nodes.iter()? {
        let (_, value) = entry?;
        result.push(serde_json::from_slice(value.value())?);
    }
    Ok(result)
}

fn all_edges<T>(edges: &T) -> StorageResult<Vec<StoredEdge>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut result = Vec::new();
    for entry in edges.iter()? {
        let (_, value) = entry?;
        result.push(serde_json::from_slice(value.value())?);
    }
    Ok(result)
}

/// Unique properties declared for a label
fn unique_fields<T>(indexes: &T, label: &str) -> StorageResult<Vec<String>>
where
    T: ReadableTable<&'static str, u8>,
{
    let prefix = format!("{}{}", label, SEP);
    let mut fields = Vec::new();
    for entry in indexes.iter()? {
        let (key, unique) = entry?;
        if unique.value() == 1 {
            if let Some(field) = key.value().strip_prefix(prefix.as_str()) {
                fields.push(field.to_string());
            }
        }
    }
    Ok(fields)
}

/// The node holding a unique value, when the query pins a unique field of its one label
fn unique_lookup<N, I, U>(
    nodes: &N,
    indexes: &I,
    unique: &U,
    query: &NodeQuery,
) -> StorageResult<Option<Vec<StoredNode>>>
where
    N: ReadableTable<&'static str, &'static [u8]>,
    I: ReadableTable<&'static str, u8>,
    U: ReadableTable<&'static str, &'static str>,
{
    let [label] = query.labels.as_slice() else {
        return Ok(None);
    };
    for filter in &query.filters {
        let Some(value) = filter.predicate.equality_key() else {
            continue;
        };
        let key = index_key(label, &filter.field);
        let is_unique = indexes.get(key.as_str())?.map(|v| v.value()) == Some(1);
        if !is_unique {
            continue;
        }

        let key = unique_key(label, &filter.field, value)?;
        let holder = unique.get(key.as_str())?.map(|h| h.value().to_string());
        let node = match holder {
            Some(holder) => {
                let id = NodeId::from_string(&holder)
                    .map_err(|e| StorageError::Database(format!("bad node id {}: {}", holder, e)))?;
                load_node(nodes, &id)?
            }
            None => None,
        };
        return Ok(Some(node.into_iter().collect()));
    }
    Ok(None)
}

fn run_query<N, E, I, U>(
    nodes: &N,
    edges: &E,
    indexes: &I,
    unique: &U,
    query: &NodeQuery,
) -> StorageResult<Vec<StoredNode>>
where
    N: ReadableTable<&'static str, &'static [u8]>,
    E: ReadableTable<&'static str, &'static [u8]>,
    I: ReadableTable<&'static str, u8>,
    U: ReadableTable<&'static str, &'static str>,
{
    let candidates = match &query.anchor {
        Some(anchor) => {
            let adjacent: BTreeSet<NodeId> = all_edges(edges)?
                .iter()
                .filter_map(|edge| anchor.other_endpoint(edge))
                .cloned()
                .collect();
            let mut found = Vec::with_capacity(adjacent.len());
            for id in &adjacent {
                if let Some(node) = load_node(nodes, id)? {
                    found.push(node);
                }
            }
            found
        }
        None => match unique_lookup(nodes, indexes, unique, query)? {
            Some(found) => found,
            None => all_nodes(nodes)?,
        },
    };

    let mut result = Vec::new();
    for node in candidates {
        if query.limit.map_or(false, |l| result.len() >= l) {
            break;
        }
        if query.matches(&node.label, &node.properties) {
            result.push(node);
        }
    }
    Ok(result)
}

fn check_guards<N, E>(nodes: &N, edges: &E, guards: &[EdgeGuard]) -> StorageResult<()>
where
    N: ReadableTable<&'static str, &'static [u8]>,
    E: ReadableTable<&'static str, &'static [u8]>,
{
    if guards.is_empty() {
        return Ok(());
    }
    let edges = all_edges(edges)?;
    for guard in guards {
        let mut count = 0;
        for other in edges.iter().filter_map(|e| guard.anchor.other_endpoint(e)) {
            if let Some(node) = load_node(nodes, other)? {
                if guard.counts_label(&node.label) {
                    count += 1;
                }
            }
        }
        guard.check(count)?;
    }
    Ok(())
}

fn put_node(nodes: &mut Table<'_, &'static str, &'static [u8]>, node: &StoredNode) -> StorageResult<()> {
    let key = node.id.to_string();
    let value = serde_json::to_vec(node)?;
    nodes.insert(key.as_str(), value.as_slice())?;
    Ok(())
}

fn put_edge(edges: &mut Table<'_, &'static str, &'static [u8]>, edge: &StoredEdge) -> StorageResult<()> {
    let key = edge.id.to_string();
    let value = serde_json::to_vec(edge)?;
    edges.insert(key.as_str(), value.as_slice())?;
    Ok(())
}

/// Record the node's unique values, failing if another node holds one
fn claim_unique(
    unique: &mut Table<'_, &'static str, &'static str>,
    fields: &[String],
    node: &StoredNode,
) -> StorageResult<()> {
    let id = node.id.to_string();
    for field in fields {
        let Some(value) = node.properties.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let key = unique_key(&node.label, field, value)?;
        let holder = unique.get(key.as_str())?.map(|h| h.value().to_string());
        match holder {
            Some(holder) if holder != id => {
                return Err(Error::StoreConstraintViolation {
                    constraint: format!("{}.{}", node.label, field),
                    message: format!("{} = {} already held by node {}", field, value, holder),
                }
                .into());
            }
            Some(_) => {}
            None => {
                unique.insert(key.as_str(), id.as_str())?;
            }
        }
    }
    Ok(())
}

/// Drop the node's unique values
fn release_unique(
    unique: &mut Table<'_, &'static str, &'static str>,
    fields: &[String],
    node: &StoredNode,
) -> StorageResult<()> {
    let id = node.id.to_string();
    for field in fields {
        let Some(value) = node.properties.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let key = unique_key(&node.label, field, value)?;
        let held = unique.get(key.as_str())?.map(|h| h.value() == id).unwrap_or(false);
        if held {
            unique.remove(key.as_str())?;
        }
    }
    Ok(())
}

fn insert_nodes(
    txn: &WriteTransaction,
    label: &str,
    rows: Vec<PropertyMap>,
    membership: Option<&Membership>,
) -> StorageResult<Vec<StoredNode>> {
    let indexes = txn.open_table(INDEXES)?;
    let fields = unique_fields(&indexes, label)?;
    let mut nodes = txn.open_table(NODES)?;
    let mut unique = txn.open_table(UNIQUE)?;
    let mut edges = txn.open_table(EDGES)?;

    if let Some(m) = membership {
        if load_node(&nodes, &m.category)?.is_none() {
            return Err(Error::InstanceNotFound(format!("category node {}", m.category)).into());
        }
    }

    let mut created = Vec::with_capacity(rows.len());
    for properties in rows {
        let node = StoredNode {
            id: NodeId::new(),
            label: label.to_string(),
            properties: properties.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        };
        claim_unique(&mut unique, &fields, &node)?;
        put_node(&mut nodes, &node)?;
        if let Some(m) = membership {
            put_edge(&mut edges, &m.edge_to(&node.id))?;
        }
        created.push(node);
    }
    Ok(created)
}

#[async_trait]
impl GraphStore for RedbStore {
    async fn ensure_index(&self, label: &str, property: &str, unique: bool) -> Result<()> {
        self.write(|txn| {
            let mut indexes = txn.open_table(INDEXES)?;
            let key = index_key(label, property);
            let existing = indexes.get(key.as_str())?.map(|v| v.value());
            if existing == Some(1) || (existing == Some(0) && !unique) {
                return Ok(());
            }
            indexes.insert(key.as_str(), u8::from(unique))?;

            if unique {
                let nodes = txn.open_table(NODES)?;
                let mut keys = txn.open_table(UNIQUE)?;
                let fields = vec![property.to_string()];
                for node in all_nodes(&nodes)?.iter().filter(|n| n.label == label) {
                    claim_unique(&mut keys, &fields, node)?;
                }
            }
            tracing::debug!("Created {}index on {}.{}", if unique { "unique " } else { "" }, label, property);
            Ok(())
        })?;
        Ok(())
    }

    async fn create_node(
        &self,
        label: &str,
        properties: PropertyMap,
        membership: Option<&Membership>,
    ) -> Result<StoredNode> {
        let mut created = self.write(|txn| insert_nodes(txn, label, vec![properties], membership))?;
        created
            .pop()
            .ok_or_else(|| Error::Internal(format!("redb created no {} node", label)))
    }

    async fn create_nodes(
        &self,
        label: &str,
        rows: Vec<PropertyMap>,
        membership: Option<&Membership>,
    ) -> Result<Vec<StoredNode>> {
        Ok(self.write(|txn| insert_nodes(txn, label, rows, membership))?)
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<StoredNode>> {
        let db = self.lock()?;
        let txn = db.begin_read().map_err(StorageError::from)?;
        let nodes = txn.open_table(NODES).map_err(StorageError::from)?;
        Ok(load_node(&nodes, id)?)
    }

    async fn update_node(&self, id: &NodeId, properties: PropertyMap) -> Result<StoredNode> {
        Ok(self.write(|txn| {
            let mut nodes = txn.open_table(NODES)?;
            let current = load_node(&nodes, id)?
                .ok_or_else(|| Error::InstanceNotFound(format!("node {}", id)))?;

            let mut updated = current.clone();
            for (key, value) in properties {
                if value.is_null() {
                    updated.properties.remove(&key);
                } else {
                    updated.properties.insert(key, value);
                }
            }

            let indexes = txn.open_table(INDEXES)?;
            let fields = unique_fields(&indexes, &current.label)?;
            let mut unique = txn.open_table(UNIQUE)?;
            release_unique(&mut unique, &fields, &current)?;
            claim_unique(&mut unique, &fields, &updated)?;
            put_node(&mut nodes, &updated)?;
            Ok(updated)
        })?)
    }

    async fn delete_node(&self, id: &NodeId) -> Result<()> {
        Ok(self.write(|txn| {
            let mut nodes = txn.open_table(NODES)?;
            let Some(node) = load_node(&nodes, id)? else {
                return Ok(());
            };
            let edges = txn.open_table(EDGES)?;
            if all_edges(&edges)?.iter().any(|e| e.from_id == *id || e.to_id == *id) {
                return Err(Error::Internal(format!("node {} still has edges", id)).into());
            }

            let indexes = txn.open_table(INDEXES)?;
            let fields = unique_fields(&indexes, &node.label)?;
            let mut unique = txn.open_table(UNIQUE)?;
            release_unique(&mut unique, &fields, &node)?;
            let key = id.to_string();
            nodes.remove(key.as_str())?;
            Ok(())
        })?)
    }

    async fn delete_edges(&self, id: &NodeId) -> Result<usize> {
        Ok(self.write(|txn| {
            let mut edges = txn.open_table(EDGES)?;
            let doomed: Vec<String> = all_edges(&edges)?
                .into_iter()
                .filter(|e| e.from_id == *id || e.to_id == *id)
                .map(|e| e.id.to_string())
                .collect();
            for key in &doomed {
                edges.remove(key.as_str())?;
            }
            Ok(doomed.len())
        })?)
    }

    async fn create_edge(&self, write: EdgeWrite) -> Result<StoredEdge> {
        Ok(self.write(|txn| {
            let nodes = txn.open_table(NODES)?;
            for id in [&write.source, &write.target] {
                if load_node(&nodes, id)?.is_none() {
                    return Err(Error::InstanceNotFound(format!("node {}", id)).into());
                }
            }

            let mut edges = txn.open_table(EDGES)?;
            let edge = write.to_edge();
            put_edge(&mut edges, &edge)?;
            check_guards(&nodes, &edges, &write.guards)?;
            Ok(edge)
        })?)
    }

    async fn delete_edge(&self, delete: EdgeDelete) -> Result<bool> {
        Ok(self.write(|txn| {
            let nodes = txn.open_table(NODES)?;
            let mut edges = txn.open_table(EDGES)?;
            let Some(edge) = all_edges(&edges)?.into_iter().find(|e| delete.matches(e)) else {
                return Ok(false);
            };
            let key = edge.id.to_string();
            edges.remove(key.as_str())?;
            check_guards(&nodes, &edges, &delete.guards)?;
            Ok(true)
        })?)
    }

    async fn find_edges(
        &self,
        source: &NodeId,
        target: &NodeId,
        rel_type: &str,
        direction: Direction,
    ) -> Result<Vec<StoredEdge>> {
        let db = self.lock()?;
        let txn = db.begin_read().map_err(StorageError::from)?;
        let edges = txn.open_table(EDGES).map_err(StorageError::from)?;
        Ok(all_edges(&edges)?
            .into_iter()
            .filter(|e| e.rel_type == rel_type)
            .filter(|e| direction.matches(&e.from_id, &e.to_id, source, Some(target)))
            .collect())
    }

    async fn query(&self, query: &NodeQuery) -> Result<Vec<StoredNode>> {
        let db = self.lock()?;
        let txn = db.begin_read().map_err(StorageError::from)?;
        let nodes = txn.open_table(NODES).map_err(StorageError::from)?;
        let edges = txn.open_table(EDGES).map_err(StorageError::from)?;
        let indexes = txn.open_table(INDEXES).map_err(StorageError::from)?;
        let unique = txn.open_table(UNIQUE).map_err(StorageError::from)?;
        Ok(run_query(&nodes, &edges, &indexes, &unique, query)?)
    }

    async fn health_check(&self) -> Result<()> {
        let db = self.lock()?;
        let txn = db.begin_read().map_err(StorageError::from)?;
        txn.open_table(NODES).map_err(StorageError::from)?;
        Ok(())
    }
}
