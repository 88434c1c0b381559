//! Entity kinds: a label plus its property and relationship declarations

use crate::error::{Error, Result};
use crate::limits;
use crate::property::PropertyDescriptor;
use crate::relation::RelationshipDescriptor;
use crate::value::{NodeValues, PropertyMap, StoreValue, Value};
use std::collections::{BTreeSet, HashSet};

/// Declaration of one node kind
#[derive(Debug, Clone)]
pub struct EntityKind {
    label: String,
    properties: Vec<PropertyDescriptor>,
    relationships: Vec<RelationshipDescriptor>,
}

/// Builder for [`EntityKind`]; `build` checks the declaration
#[derive(Debug)]
pub struct EntityKindBuilder {
    label: String,
    properties: Vec<PropertyDescriptor>,
    relationships: Vec<RelationshipDescriptor>,
}

impl EntityKindBuilder {
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDescriptor) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn build(self) -> Result<EntityKind> {
        let schema = |msg: String| Error::Schema(format!("{}: {}", self.label, msg));

        limits::validate_kind_label(&self.label).map_err(|e| schema(e.to_string()))?;

        let mut names = HashSet::new();
        let field_names = self
            .properties
            .iter()
            .map(PropertyDescriptor::name)
            .chain(self.relationships.iter().map(RelationshipDescriptor::name));
        for name in field_names {
            limits::validate_field_name(name).map_err(|e| schema(e.to_string()))?;
            if !names.insert(name) {
                return Err(schema(format!("field '{}' is declared twice", name)));
            }
        }

        let unique: Vec<_> = self.properties.iter().filter(|p| p.is_unique()).collect();
        if unique.len() > 1 {
            return Err(schema(format!(
                "at most one unique_index property is allowed, found {}",
                unique
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        for prop in self.properties.iter().filter(|p| p.is_alias()) {
            let target = prop.alias_target().unwrap_or_default();
            match self.properties.iter().find(|p| p.name() == target) {
                None => {
                    return Err(schema(format!(
                        "alias '{}' points at unknown property '{}'",
                        prop.name(),
                        target
                    )))
                }
                Some(t) if t.is_alias() => {
                    return Err(schema(format!(
                        "alias '{}' points at another alias '{}'",
                        prop.name(),
                        target
                    )))
                }
                Some(_) => {}
            }
            if prop.is_indexed() || prop.is_required() || prop.has_default() {
                return Err(schema(format!(
                    "alias '{}' cannot carry index, required or default flags",
                    prop.name()
                )));
            }
        }

        for rel in &self.relationships {
            limits::validate_label(rel.rel_type()).map_err(|e| schema(e.to_string()))?;
            if rel.targets().is_empty() {
                return Err(schema(format!("relationship '{}' has no target", rel.name())));
            }
            for prop in rel.edge_properties() {
                limits::validate_field_name(prop.name()).map_err(|e| schema(e.to_string()))?;
                if prop.is_alias() || prop.is_indexed() {
                    return Err(schema(format!(
                        "edge property '{}.{}' cannot be an alias or indexed",
                        rel.name(),
                        prop.name()
                    )));
                }
            }
        }

        let mut properties = self.properties;
        for prop in &mut properties {
            prop.set_owner(&self.label);
        }
        let mut relationships = self.relationships;
        for rel in &mut relationships {
            rel.set_owner(&self.label);
        }

        Ok(EntityKind {
            label: self.label,
            properties,
            relationships,
        })
    }
}

impl EntityKind {
    pub fn builder(label: impl Into<String>) -> EntityKindBuilder {
        EntityKindBuilder {
            label: label.into(),
            properties: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn relationships(&self) -> &[RelationshipDescriptor] {
        &self.relationships
    }

    /// Properties that occupy storage (aliases excluded)
    pub fn stored_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| !p.is_alias())
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Look up a field, following an alias to the property it stands for
    pub fn resolve(&self, field: &str) -> Result<&PropertyDescriptor> {
        let prop = self.property(field).ok_or_else(|| {
            Error::validation(format!("{}.{}", self.label, field), "no such property")
        })?;
        match prop.alias_target() {
            Some(target) => self.property(target).ok_or_else(|| {
                Error::Internal(format!("{} aliases missing {}", prop.path(), target))
            }),
            None => Ok(prop),
        }
    }

    pub fn relationship(&self, name: &str) -> Result<&RelationshipDescriptor> {
        self.relationships
            .iter()
            .find(|r| r.name() == name)
            .ok_or_else(|| {
                Error::validation(format!("{}.{}", self.label, name), "no such relationship")
            })
    }

    /// The unique-indexed property, used as the instance's natural key
    pub fn identity_property(&self) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.is_unique())
    }

    pub fn indexed_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.stored_properties().filter(|p| p.is_indexed())
    }

    /// Deflate every stored property for a create; nulls are left out
    pub fn deflate_all(&self, values: &NodeValues) -> Result<PropertyMap> {
        let mut props = PropertyMap::new();
        for prop in self.stored_properties() {
            let value = values.get(prop.name()).unwrap_or(&Value::Null);
            let stored = prop.deflate(value)?;
            if !stored.is_null() {
                props.insert(prop.name().to_string(), stored);
            }
        }
        Ok(props)
    }

    /// Deflate only the given fields for an update; nulls are kept so the
    /// store removes those properties
    pub fn deflate_fields(&self, values: &NodeValues, fields: &BTreeSet<String>) -> Result<PropertyMap> {
        let mut props = PropertyMap::new();
        for prop in self.stored_properties().filter(|p| fields.contains(p.name())) {
            let value = values.get(prop.name()).unwrap_or(&Value::Null);
            props.insert(prop.name().to_string(), prop.deflate(value)?);
        }
        Ok(props)
    }

    /// Inflate a stored row; undeclared store properties are ignored
    pub fn inflate(&self, props: &PropertyMap) -> Result<NodeValues> {
        let mut values = NodeValues::new();
        for prop in self.stored_properties() {
            let raw = props.get(prop.name()).unwrap_or(&StoreValue::Null);
            values.insert(prop.name().to_string(), prop.inflate(raw)?);
        }
        Ok(values)
    }
}
