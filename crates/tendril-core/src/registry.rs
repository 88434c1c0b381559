//! The set of entity kinds a database is opened with

use crate::error::{Error, Result};
use crate::kind::EntityKind;
use crate::relation::RelationshipDescriptor;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Label-keyed registry of entity kinds
///
/// Built once and shared read-only; every relationship target must be
/// registered, and constrained relationships need a reciprocal declaration
/// on each target kind so caps can be checked from both endpoints.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    kinds: BTreeMap<String, Arc<EntityKind>>,
}

impl Registry {
    pub fn from_kinds<I>(kinds: I) -> Result<Self>
    where
        I: IntoIterator<Item = EntityKind>,
    {
        let mut map = BTreeMap::new();
        for kind in kinds {
            let label = kind.label().to_string();
            if map.insert(label.clone(), Arc::new(kind)).is_some() {
                return Err(Error::Schema(format!("kind '{}' is registered twice", label)));
            }
        }
        let registry = Self { kinds: map };
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<()> {
        for kind in self.kinds.values() {
            for rel in kind.relationships() {
                for target in rel.targets() {
                    let target_kind = self.kinds.get(target).ok_or_else(|| {
                        Error::Schema(format!(
                            "{} targets unregistered kind '{}'",
                            rel.path(),
                            target
                        ))
                    })?;

                    if rel.cardinality_constraint().is_constrained()
                        && !target_kind.relationships().iter().any(|r| rel.is_reciprocal(r))
                    {
                        return Err(Error::Schema(format!(
                            "{} is {} but {} declares no {:?} {} relationship back to {}",
                            rel.path(),
                            rel.cardinality_constraint(),
                            target,
                            rel.direction().reverse(),
                            rel.rel_type(),
                            kind.label()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, label: &str) -> Result<Arc<EntityKind>> {
        self.kinds
            .get(label)
            .cloned()
            .ok_or_else(|| Error::Schema(format!("kind '{}' is not registered", label)))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.kinds.contains_key(label)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &Arc<EntityKind>> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// The declaration on `target_label` describing the same edges as `descriptor`
    pub fn reciprocal(
        &self,
        descriptor: &RelationshipDescriptor,
        target_label: &str,
    ) -> Option<&RelationshipDescriptor> {
        self.kinds
            .get(target_label)?
            .relationships()
            .iter()
            .find(|r| descriptor.is_reciprocal(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardinality::Cardinality;
    use crate::property::PropertyDescriptor;

    fn person(country: Cardinality) -> EntityKind {
        EntityKind::builder("Person")
            .property(PropertyDescriptor::string("name").unique_index())
            .relationship(
                RelationshipDescriptor::outgoing("country", "Country", "IS_FROM")
                    .cardinality(country),
            )
            .build()
            .unwrap()
    }

    fn country(with_inverse: bool) -> EntityKind {
        let builder = EntityKind::builder("Country")
            .property(PropertyDescriptor::string("code").unique_index());
        let builder = if with_inverse {
            builder.relationship(RelationshipDescriptor::incoming("inhabitants", "Person", "IS_FROM"))
        } else {
            builder
        };
        builder.build().unwrap()
    }

    #[test]
    fn test_reciprocal_lookup() {
        let registry = Registry::from_kinds([person(Cardinality::One), country(true)]).unwrap();
        let rel = registry.get("Person").unwrap().relationship("country").unwrap().clone();
        let back = registry.reciprocal(&rel, "Country").unwrap();
        assert_eq!(back.name(), "inhabitants");
        assert!(registry.reciprocal(&rel, "Person").is_none());
    }

    #[test]
    fn test_constrained_needs_reciprocal() {
        let err = Registry::from_kinds([person(Cardinality::One), country(false)]).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert!(err.to_string().contains("Person.country"));

        assert!(Registry::from_kinds([person(Cardinality::ZeroOrMore), country(false)]).is_ok());
    }

    #[test]
    fn test_unknown_target_and_duplicates() {
        assert!(Registry::from_kinds([person(Cardinality::ZeroOrMore)]).is_err());
        assert!(Registry::from_kinds([country(false), country(false)]).is_err());
    }
}
