//! B-Tree property index for the in-memory store

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use tendril_core::{NodeId, Predicate, StoreValue};

/// Index for one property on one label
#[derive(Debug, Clone, Default)]
pub struct PropertyIndex {
    unique: bool,
    /// Value -> nodes holding it
    entries: BTreeMap<StoreValue, BTreeSet<NodeId>>,
}

impl PropertyIndex {
    pub fn new(unique: bool) -> Self {
        Self {
            unique,
            entries: BTreeMap::new(),
        }
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn make_unique(&mut self) {
        self.unique = true;
    }

    pub fn insert(&mut self, value: StoreValue, node_id: NodeId) {
        if value.is_null() {
            return;
        }
        self.entries.entry(value).or_default().insert(node_id);
    }

    pub fn remove(&mut self, value: &StoreValue, node_id: &NodeId) {
        if let Some(nodes) = self.entries.get_mut(value) {
            nodes.remove(node_id);
            if nodes.is_empty() {
                self.entries.remove(value);
            }
        }
    }

    pub fn get(&self, value: &StoreValue) -> Vec<NodeId> {
        self.entries
            .get(value)
            .map(|nodes| nodes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// A node other than `except` already holding `value`
    pub fn holder_other_than(&self, value: &StoreValue, except: Option<&NodeId>) -> Option<&NodeId> {
        self.entries
            .get(value)?
            .iter()
            .find(|id| Some(*id) != except)
    }

    /// Whether any value is held by more than one node
    pub fn has_duplicates(&self) -> bool {
        self.entries.values().any(|nodes| nodes.len() > 1)
    }

    pub fn range(&self, range: (Bound<&StoreValue>, Bound<&StoreValue>)) -> Vec<NodeId> {
        let mut result = Vec::new();
        for (_, nodes) in self.entries.range::<StoreValue, _>(range) {
            result.extend(nodes.iter().cloned());
        }
        result
    }

    /// Candidate nodes for a predicate, `None` when the index cannot narrow it
    ///
    /// Candidates are a superset; callers still evaluate the predicate.
    pub fn candidates(&self, predicate: &Predicate) -> Option<Vec<NodeId>> {
        use Bound::*;
        let found = match predicate {
            Predicate::Eq(v) if !v.is_null() => self.get(v),
            Predicate::In(values) => {
                let mut ids: Vec<NodeId> = values.iter().flat_map(|v| self.get(v)).collect();
                ids.sort();
                ids.dedup();
                ids
            }
            Predicate::Lt(v) => self.range((Unbounded, Excluded(v))),
            Predicate::Lte(v) => self.range((Unbounded, Included(v))),
            Predicate::Gt(v) => self.range((Excluded(v), Unbounded)),
            Predicate::Gte(v) => self.range((Included(v), Unbounded)),
            _ => return None,
        };
        Some(found)
    }
}
