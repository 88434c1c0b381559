//! The object-graph engine: instance lifecycle on top of a [`GraphStore`]

use crate::category::CategoryNode;
use crate::error::{Error, Result};
use crate::hooks::{Hook, HookDispatcher, HookEvent};
use crate::index::{translate, IndexBinding};
use crate::instance::{NodeId, NodeInstance};
use crate::kind::EntityKind;
use crate::limits::{self, CATEGORY_LABEL};
use crate::query::{Anchor, Criteria, Filter, NodeQuery};
use crate::registry::Registry;
use crate::store::{GraphStore, Membership, Row, StoredNode};
use crate::traversal::TraversalHandle;
use crate::value::{NodeValues, PropertyMap, StoreValue};
use std::sync::Arc;

/// Property holding the kind label on category nodes
pub const CATEGORY_NAME_FIELD: &str = "name";

/// Edge type linking a category node to each instance of its kind
pub const INSTANCE_REL_TYPE: &str = "INSTANCE";

/// Raw query parameter bound to the calling instance's id
pub const SELF_PARAM: &str = "self";

/// An opened database: a store, the registered kinds and the hooks
pub struct Database<S: GraphStore + ?Sized = dyn GraphStore> {
    store: Arc<S>,
    registry: Arc<Registry>,
    hooks: HookDispatcher,
}

impl<S: GraphStore + ?Sized> Database<S> {
    /// Open a database and install every declared index and constraint
    pub async fn open(store: Arc<S>, registry: Registry) -> Result<Self> {
        let db = Self {
            store,
            registry: Arc::new(registry),
            hooks: HookDispatcher::new(),
        };
        db.install_schema().await?;
        Ok(db)
    }

    /// Install indexes and unique constraints; safe to repeat
    pub async fn install_schema(&self) -> Result<()> {
        self.store
            .ensure_index(CATEGORY_LABEL, CATEGORY_NAME_FIELD, true)
            .await?;

        for kind in self.registry.kinds() {
            let mut installed = 0;
            for prop in kind.indexed_properties() {
                self.store
                    .ensure_index(kind.label(), prop.name(), prop.is_unique())
                    .await?;
                installed += 1;
            }
            tracing::info!("Installed {} index(es) for {}", installed, kind.label());
        }
        Ok(())
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn kind(&self, label: &str) -> Result<Arc<EntityKind>> {
        self.registry.get(label)
    }

    /// A new, unsaved instance of a registered kind
    pub fn instance(&self, label: &str) -> Result<NodeInstance> {
        Ok(NodeInstance::new(self.kind(label)?))
    }

    /// Register a lifecycle hook for one kind, or every kind when `kind` is `None`
    pub fn on<F>(&self, event: HookEvent, kind: Option<&str>, hook: F)
    where
        F: Fn(&mut NodeInstance) -> Result<()> + Send + Sync + 'static,
    {
        let hook: Hook = Arc::new(hook);
        self.hooks.register(event, kind, hook);
    }

    /// Run a post-write hook; the write already committed, so failures are logged
    fn after_commit(&self, event: HookEvent, instance: &mut NodeInstance) {
        for e in self.hooks.dispatch_all(event, instance) {
            tracing::warn!("{:?} hook failed on {}: {}", event, instance.describe(), e);
        }
    }

    async fn membership(&self, kind: &EntityKind) -> Result<Membership> {
        let category = self.category_id(kind.label()).await?;
        Ok(Membership::new(category, INSTANCE_REL_TYPE))
    }

    fn check_registered(&self, instance: &NodeInstance) -> Result<Arc<EntityKind>> {
        if !self.registry.contains(instance.label()) {
            return Err(Error::Schema(format!(
                "{} is not a registered kind",
                instance.label()
            )));
        }
        Ok(instance.kind().clone())
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Create the instance in the store, or update it if it is already saved
    pub async fn save(&self, instance: &mut NodeInstance) -> Result<()> {
        if instance.is_deleted() {
            return Err(Error::InstanceDeleted(instance.describe()));
        }
        let kind = self.check_registered(instance)?;
        match instance.id().cloned() {
            None => self.create(&kind, instance).await,
            Some(id) => self.update(&kind, instance, &id).await,
        }
    }

    async fn create(&self, kind: &Arc<EntityKind>, instance: &mut NodeInstance) -> Result<()> {
        instance.apply_defaults();
        kind.deflate_all(instance.values())?;
        self.hooks.dispatch(HookEvent::PreSave, instance)?;

        let properties = kind.deflate_all(instance.values())?;
        let membership = self.membership(kind).await?;
        tracing::debug!(
            "Creating {} with {} properties",
            kind.label(),
            properties.len()
        );
        let stored = self
            .store
            .create_node(kind.label(), properties, Some(&membership))
            .await
            .map_err(|e| surface_unique(kind, e))?;

        instance.assign_identity(stored.id.clone())?;
        instance.load(kind.inflate(&stored.properties)?);
        self.after_commit(HookEvent::PostCreate, instance);
        self.after_commit(HookEvent::PostSave, instance);
        Ok(())
    }

    async fn update(
        &self,
        kind: &Arc<EntityKind>,
        instance: &mut NodeInstance,
        id: &NodeId,
    ) -> Result<()> {
        kind.deflate_fields(instance.values(), instance.dirty_fields())?;
        self.hooks.dispatch(HookEvent::PreSave, instance)?;

        let properties = kind.deflate_fields(instance.values(), instance.dirty_fields())?;
        tracing::debug!(
            "Updating {} ({} changed properties)",
            instance.describe(),
            properties.len()
        );
        let stored = self
            .store
            .update_node(id, properties)
            .await
            .map_err(|e| surface_unique(kind, e))?;

        instance.load(kind.inflate(&stored.properties)?);
        self.after_commit(HookEvent::PostSave, instance);
        Ok(())
    }

    /// Remove the instance and all its edges; the instance cannot be saved again
    pub async fn delete(&self, instance: &mut NodeInstance) -> Result<()> {
        let id = instance.require_id()?.clone();
        self.hooks.dispatch(HookEvent::PreDelete, instance)?;

        let edges = self.store.delete_edges(&id).await?;
        self.store.delete_node(&id).await?;
        tracing::debug!("Deleted {} and {} edge(s)", instance.describe(), edges);

        self.after_commit(HookEvent::PostDelete, instance);
        instance.mark_deleted();
        Ok(())
    }

    /// Reload the instance from the store, discarding unsaved edits
    pub async fn refresh(&self, instance: &mut NodeInstance) -> Result<()> {
        let id = instance.require_id()?.clone();
        let row = self
            .store
            .get_node(&id)
            .await?
            .filter(|row| row.label == instance.label())
            .ok_or_else(|| Error::InstanceNotFound(format!("{} no longer exists", instance.describe())))?;

        let values = instance.kind().inflate(&row.properties)?;
        instance.load(values);
        Ok(())
    }

    /// Create many instances of one kind in a single store request
    ///
    /// Every row is validated before anything is written; one bad row fails
    /// the whole batch. The nodes and their category edges are written by a
    /// single store request.
    pub async fn batch_create<I>(&self, label: &str, rows: I) -> Result<Vec<NodeInstance>>
    where
        I: IntoIterator<Item = NodeValues>,
    {
        let kind = self.kind(label)?;
        let rows: Vec<NodeValues> = rows.into_iter().collect();
        limits::validate_batch_rows(rows.len())
            .map_err(|e| Error::validation(label, e.to_string()))?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut instances = Vec::with_capacity(rows.len());
        for (row, values) in rows.into_iter().enumerate() {
            let mut instance = NodeInstance::new(kind.clone());
            for (field, value) in values {
                instance.set(&field, value).map_err(|e| in_row(row, e))?;
            }
            instance.apply_defaults();
            kind.deflate_all(instance.values()).map_err(|e| in_row(row, e))?;
            instances.push(instance);
        }

        let mut deflated = Vec::with_capacity(instances.len());
        for (row, instance) in instances.iter_mut().enumerate() {
            self.hooks.dispatch(HookEvent::PreSave, instance)?;
            deflated.push(kind.deflate_all(instance.values()).map_err(|e| in_row(row, e))?);
        }

        let membership = self.membership(&kind).await?;
        tracing::debug!("Batch creating {} {} node(s)", deflated.len(), label);
        let stored = self
            .store
            .create_nodes(kind.label(), deflated, Some(&membership))
            .await
            .map_err(|e| surface_unique(&kind, e))?;
        if stored.len() != instances.len() {
            return Err(Error::Internal(format!(
                "store created {} of {} {} node(s)",
                stored.len(),
                instances.len(),
                label
            )));
        }

        for (instance, node) in instances.iter_mut().zip(&stored) {
            instance.assign_identity(node.id.clone())?;
            instance.load(kind.inflate(&node.properties)?);
        }
        for instance in instances.iter_mut() {
            self.after_commit(HookEvent::PostCreate, instance);
            self.after_commit(HookEvent::PostSave, instance);
        }
        Ok(instances)
    }

    /// Build a saved instance from a stored row, resolving the kind by label
    pub fn inflate(&self, row: &StoredNode) -> Result<NodeInstance> {
        NodeInstance::from_stored(self.kind(&row.label)?, row)
    }

    /// Load one instance of `label` by store identity
    pub async fn get_by_id(&self, label: &str, id: &NodeId) -> Result<NodeInstance> {
        let kind = self.kind(label)?;
        let row = self
            .store
            .get_node(id)
            .await?
            .filter(|row| row.label == kind.label())
            .ok_or_else(|| Error::InstanceNotFound(format!("{}({})", label, id)))?;
        NodeInstance::from_stored(kind, &row)
    }

    // ─────────────────────────────────────────────────────────────
    // Categories, indexes and relationships
    // ─────────────────────────────────────────────────────────────

    /// The category node of a kind, created on first use
    pub async fn category(&self, label: &str) -> Result<CategoryNode<'_, S>> {
        let kind = self.kind(label)?;
        let id = self.category_id(kind.label()).await?;
        Ok(CategoryNode::new(self, kind, id))
    }

    async fn category_id(&self, label: &str) -> Result<NodeId> {
        let query = NodeQuery::new()
            .with_label(CATEGORY_LABEL)
            .with_filter(Filter::eq(CATEGORY_NAME_FIELD, label))
            .with_limit(1);
        if let Some(node) = self.store.query(&query).await?.into_iter().next() {
            return Ok(node.id);
        }

        let mut properties = PropertyMap::new();
        properties.insert(CATEGORY_NAME_FIELD.to_string(), StoreValue::from(label));
        match self.store.create_node(CATEGORY_LABEL, properties, None).await {
            Ok(node) => {
                tracing::debug!("Created category node for {}", label);
                Ok(node.id)
            }
            // Another writer created it first
            Err(Error::StoreConstraintViolation { .. }) => self
                .store
                .query(&query)
                .await?
                .into_iter()
                .next()
                .map(|node| node.id)
                .ok_or_else(|| Error::Internal(format!("category node for {} vanished", label))),
            Err(e) => Err(e),
        }
    }

    /// Index lookups on one kind
    pub fn index(&self, label: &str) -> Result<IndexBinding<'_, S>> {
        Ok(IndexBinding::new(self, self.kind(label)?))
    }

    /// Bind a declared relationship to an instance
    pub fn relationship<'a>(
        &'a self,
        instance: &NodeInstance,
        name: &str,
    ) -> Result<TraversalHandle<'a, S>> {
        let descriptor = instance.kind().relationship(name)?.clone();
        Ok(TraversalHandle::new(
            self,
            descriptor,
            instance.id().cloned(),
            instance.describe(),
        ))
    }

    /// Run backend-specific query text with `self` bound to the instance id
    pub async fn execute_raw(
        &self,
        instance: &NodeInstance,
        text: &str,
        mut params: PropertyMap,
    ) -> Result<Vec<Row>> {
        let id = instance.require_id()?;
        params.insert(SELF_PARAM.to_string(), StoreValue::String(id.to_string()));
        tracing::debug!("Raw query for {}: {}", instance.describe(), text);
        self.store.execute_raw(text, &params).await
    }

    /// Instances of `kind` matching `criteria`, optionally adjacent to an anchor
    pub(crate) async fn find(
        &self,
        kind: &Arc<EntityKind>,
        anchor: Option<Anchor>,
        criteria: &Criteria,
        limit: Option<usize>,
    ) -> Result<Vec<NodeInstance>> {
        let translated = translate(kind, criteria)?;
        let mut query = NodeQuery::new()
            .with_label(kind.label())
            .with_filters(translated.pushed.clone());
        query.anchor = anchor;
        if translated.residual.is_empty() {
            query.limit = limit;
        }

        let rows = self.store.query(&query).await?;
        let mut found = Vec::new();
        for row in rows.iter().filter(|r| translated.residual_matches(&r.properties)) {
            found.push(NodeInstance::from_stored(kind.clone(), row)?);
            if limit.map_or(false, |l| found.len() >= l) {
                break;
            }
        }
        Ok(found)
    }
}

impl<S: GraphStore + ?Sized> std::fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("registry", &self.registry)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Report a store-side unique collision on one of the kind's properties as
/// a unique constraint violation
fn surface_unique(kind: &EntityKind, err: Error) -> Error {
    match err {
        Error::StoreConstraintViolation {
            constraint,
            message,
        } if kind
            .stored_properties()
            .any(|p| p.is_unique() && p.path() == constraint) =>
        {
            Error::UniqueConstraintViolation {
                field: constraint,
                message,
            }
        }
        other => other,
    }
}

fn in_row(row: usize, err: Error) -> Error {
    match err {
        Error::Validation { field, message } => Error::Validation {
            field,
            message: format!("row {}: {}", row, message),
        },
        other => other,
    }
}
