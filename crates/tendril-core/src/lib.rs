//! Tendril Core - Object-graph mapping engine
//!
//! This crate provides the schema types (properties, entity kinds,
//! relationships), the cardinality rules, the query model, the
//! [`GraphStore`] trait a backend implements, and the [`Database`] engine
//! that drives instance lifecycle and traversal on top of it.

pub mod cardinality;
pub mod category;
pub mod database;
pub mod error;
pub mod hooks;
pub mod index;
pub mod instance;
pub mod kind;
pub mod limits;
pub mod property;
pub mod query;
pub mod registry;
pub mod relation;
pub mod store;
pub mod traversal;
pub mod value;

pub use cardinality::Cardinality;
pub use category::CategoryNode;
pub use database::{Database, CATEGORY_NAME_FIELD, INSTANCE_REL_TYPE, SELF_PARAM};
pub use error::{Error, Result};
pub use hooks::{Hook, HookDispatcher, HookEvent};
pub use index::IndexBinding;
pub use instance::{NodeId, NodeInstance};
pub use kind::{EntityKind, EntityKindBuilder};
pub use limits::CATEGORY_LABEL;
pub use property::{DefaultValue, PropertyDescriptor, PropertyKind};
pub use query::{Anchor, Criteria, Criterion, Filter, Lookup, NodeQuery, Predicate};
pub use registry::Registry;
pub use relation::{Direction, EdgeId, RelationshipDescriptor, RelationshipEdge};
pub use store::{
    EdgeDelete, EdgeGuard, EdgeWrite, GraphStore, Membership, Row, RowValue, StoredEdge, StoredNode,
};
pub use traversal::TraversalHandle;
pub use value::{NodeValues, PropertyMap, StoreValue, Value};
