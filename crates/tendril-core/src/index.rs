//! Index-backed lookups on one entity kind

use crate::database::Database;
use crate::error::{Error, Result};
use crate::instance::NodeInstance;
use crate::kind::EntityKind;
use crate::property::PropertyDescriptor;
use crate::query::{Criteria, Criterion, Filter, Lookup, Predicate};
use crate::store::GraphStore;
use crate::value::{PropertyMap, StoreValue, Value};
use std::sync::Arc;

/// Criteria split by where they are evaluated
#[derive(Debug, Default)]
pub(crate) struct Translated {
    /// Terms on indexed properties, sent to the store
    pub pushed: Vec<Filter>,
    /// Terms evaluated on the stored rows after they come back
    pub residual: Vec<Filter>,
}

impl Translated {
    pub fn residual_matches(&self, properties: &PropertyMap) -> bool {
        self.residual.iter().all(|f| f.matches(properties))
    }
}

/// Translate native criteria into store filters for `kind`
pub(crate) fn translate(kind: &EntityKind, criteria: &Criteria) -> Result<Translated> {
    let mut out = Translated::default();
    for criterion in criteria.terms() {
        let (prop, filter) = match criterion {
            Criterion::Term {
                field,
                lookup,
                values,
            } => {
                let prop = kind.resolve(field)?;
                let predicate = predicate_for(prop, *lookup, values)?;
                (prop, Filter::new(prop.name(), predicate))
            }
            Criterion::Expression(filter) => {
                let prop = kind.resolve(&filter.field)?;
                (prop, Filter::new(prop.name(), filter.predicate.clone()))
            }
        };

        if prop.is_indexed() {
            out.pushed.push(filter);
        } else {
            out.residual.push(filter);
        }
    }
    Ok(out)
}

/// Whether every field named by `criteria` exists on `kind`
pub(crate) fn applies(kind: &EntityKind, criteria: &Criteria) -> bool {
    criteria.terms().iter().all(|criterion| {
        let field = match criterion {
            Criterion::Term { field, .. } => field,
            Criterion::Expression(filter) => &filter.field,
        };
        kind.resolve(field).is_ok()
    })
}

fn single<'v>(prop: &PropertyDescriptor, lookup: Lookup, values: &'v [Value]) -> Result<&'v Value> {
    match values {
        [value] => Ok(value),
        _ => Err(Error::validation(
            prop.path(),
            format!("{} lookup takes one value, got {}", lookup.suffix(), values.len()),
        )),
    }
}

fn text(prop: &PropertyDescriptor, lookup: Lookup, values: &[Value]) -> Result<String> {
    match single(prop, lookup, values)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(Error::validation(
            prop.path(),
            format!("{} lookup needs a string, got {}", lookup.suffix(), other.type_name()),
        )),
    }
}

/// Search values are coerced like stored ones; null never reaches the
/// descriptor so required properties can still be searched for absence
fn store_value(prop: &PropertyDescriptor, value: &Value) -> Result<StoreValue> {
    if value.is_null() {
        Ok(StoreValue::Null)
    } else {
        prop.deflate(value)
    }
}

fn predicate_for(prop: &PropertyDescriptor, lookup: Lookup, values: &[Value]) -> Result<Predicate> {
    let one = || -> Result<StoreValue> { store_value(prop, single(prop, lookup, values)?) };

    let predicate = match lookup {
        Lookup::Exact => Predicate::Eq(one()?),
        Lookup::Ne => match one()? {
            StoreValue::Null => Predicate::IsNull(false),
            value => Predicate::Ne(value),
        },
        Lookup::Lt => Predicate::Lt(one()?),
        Lookup::Lte => Predicate::Lte(one()?),
        Lookup::Gt => Predicate::Gt(one()?),
        Lookup::Gte => Predicate::Gte(one()?),
        Lookup::In => Predicate::In(
            values
                .iter()
                .map(|v| store_value(prop, v))
                .collect::<Result<Vec<_>>>()?,
        ),
        Lookup::StartsWith => Predicate::StartsWith(text(prop, lookup, values)?),
        Lookup::EndsWith => Predicate::EndsWith(text(prop, lookup, values)?),
        Lookup::Contains => Predicate::Contains(text(prop, lookup, values)?),
        Lookup::IsNull => match single(prop, lookup, values)? {
            Value::Boolean(b) => Predicate::IsNull(*b),
            Value::String(s) if s == "true" || s == "false" => Predicate::IsNull(s == "true"),
            other => {
                return Err(Error::validation(
                    prop.path(),
                    format!("isnull lookup needs a boolean, got {}", other.type_name()),
                ))
            }
        },
    };
    Ok(predicate)
}

/// Lookups on one kind, as returned by [`Database::index`]
pub struct IndexBinding<'a, S: GraphStore + ?Sized> {
    db: &'a Database<S>,
    kind: Arc<EntityKind>,
}

impl<'a, S: GraphStore + ?Sized> IndexBinding<'a, S> {
    pub(crate) fn new(db: &'a Database<S>, kind: Arc<EntityKind>) -> Self {
        Self { db, kind }
    }

    pub fn kind(&self) -> &Arc<EntityKind> {
        &self.kind
    }

    /// Every instance of the kind matching `criteria`
    pub async fn search(&self, criteria: &Criteria) -> Result<Vec<NodeInstance>> {
        self.db.find(&self.kind, None, criteria, None).await
    }

    /// Exactly one instance matching `criteria`
    pub async fn get(&self, criteria: &Criteria) -> Result<NodeInstance> {
        self.get_or_none(criteria).await?.ok_or_else(|| {
            Error::InstanceNotFound(format!("no {} matches {}", self.kind.label(), criteria))
        })
    }

    /// At most one instance matching `criteria`
    pub async fn get_or_none(&self, criteria: &Criteria) -> Result<Option<NodeInstance>> {
        let mut found = self.db.find(&self.kind, None, criteria, Some(2)).await?;
        if found.len() > 1 {
            return Err(Error::MultipleResultsFound(format!(
                "more than one {} matches {}",
                self.kind.label(),
                criteria
            )));
        }
        Ok(found.pop())
    }
}
