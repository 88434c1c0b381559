//! Entity kinds declared in a TOML file
//!
//! ```toml
//! [[kind]]
//! label = "Person"
//!
//! [[kind.property]]
//! name = "name"
//! type = "string"
//! unique_index = true
//! required = true
//!
//! [[kind.relationship]]
//! name = "country"
//! target = "Country"
//! rel_type = "IS_FROM"
//! cardinality = "zero_or_one"
//! ```

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use tendril_core::{
    Cardinality, Direction, EntityKind, PropertyDescriptor, Registry, RelationshipDescriptor, Value,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    #[serde(default, rename = "kind")]
    pub kinds: Vec<KindSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindSpec {
    pub label: String,
    #[serde(default, rename = "property")]
    pub properties: Vec<PropertySpec>,
    #[serde(default, rename = "relationship")]
    pub relationships: Vec<RelationshipSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Alias,
    UniqueId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    /// Aliased field, for `type = "alias"`
    pub target: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique_index: bool,
    #[serde(default)]
    pub index: bool,
    /// Literal default; `"now"` on a datetime means creation time
    pub default: Option<toml::Value>,
    pub choices: Option<Vec<String>>,
    pub max_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Targets {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipSpec {
    pub name: String,
    pub target: Targets,
    pub rel_type: String,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default, rename = "property")]
    pub properties: Vec<PropertySpec>,
}

fn default_direction() -> Direction {
    Direction::Outgoing
}

fn literal(value: &toml::Value) -> anyhow::Result<Value> {
    Ok(match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::Integer(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Boolean(*b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        other => anyhow::bail!("unsupported default {}", other),
    })
}

impl PropertySpec {
    pub fn to_descriptor(&self) -> anyhow::Result<PropertyDescriptor> {
        let name = self.name.as_str();
        let mut prop = match self.kind {
            PropertyType::String => PropertyDescriptor::string(name),
            PropertyType::Integer => PropertyDescriptor::integer(name),
            PropertyType::Float => PropertyDescriptor::float(name),
            PropertyType::Boolean => PropertyDescriptor::boolean(name),
            PropertyType::Date => PropertyDescriptor::date(name),
            PropertyType::Datetime => PropertyDescriptor::datetime(name),
            PropertyType::UniqueId => PropertyDescriptor::unique_id(name),
            PropertyType::Alias => {
                let target = self
                    .target
                    .as_deref()
                    .with_context(|| format!("alias '{}' needs a target", name))?;
                PropertyDescriptor::alias(name, target)
            }
        };

        if self.required {
            prop = prop.required();
        }
        if self.unique_index {
            prop = prop.unique_index();
        }
        if self.index {
            prop = prop.index();
        }
        if let Some(choices) = &self.choices {
            prop = prop.choices(choices.iter().cloned());
        }
        if let Some(max) = self.max_length {
            prop = prop.max_length(max);
        }
        match (&self.default, self.kind) {
            (None, _) => {}
            (Some(toml::Value::String(s)), PropertyType::Datetime) if s == "now" => {
                prop = prop.default_with(|| Value::DateTime(Utc::now()));
            }
            (Some(value), _) => {
                let value = literal(value).with_context(|| format!("property '{}'", name))?;
                // Reject defaults the property could never store
                prop.deflate(&value)?;
                prop = prop.default(value);
            }
        }
        Ok(prop)
    }
}

impl RelationshipSpec {
    pub fn to_descriptor(&self) -> anyhow::Result<RelationshipDescriptor> {
        let targets = match &self.target {
            Targets::One(t) => vec![t.clone()],
            Targets::Many(ts) => ts.clone(),
        };
        let (first, rest) = targets
            .split_first()
            .with_context(|| format!("relationship '{}' has no target", self.name))?;

        let mut rel =
            RelationshipDescriptor::new(&self.name, first, &self.rel_type, self.direction)
                .cardinality(self.cardinality);
        for target in rest {
            rel = rel.or_target(target);
        }
        for prop in &self.properties {
            rel = rel.edge_property(prop.to_descriptor()?);
        }
        Ok(rel)
    }
}

impl KindSpec {
    pub fn to_kind(&self) -> anyhow::Result<EntityKind> {
        let mut builder = EntityKind::builder(&self.label);
        for prop in &self.properties {
            builder = builder.property(
                prop.to_descriptor()
                    .with_context(|| format!("kind '{}'", self.label))?,
            );
        }
        for rel in &self.relationships {
            builder = builder.relationship(
                rel.to_descriptor()
                    .with_context(|| format!("kind '{}'", self.label))?,
            );
        }
        Ok(builder.build()?)
    }
}

impl SchemaFile {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading schema file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing schema file {}", path.display()))
    }

    pub fn registry(&self) -> anyhow::Result<Registry> {
        let kinds = self
            .kinds
            .iter()
            .map(KindSpec::to_kind)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Registry::from_kinds(kinds)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE: &str = r#"
[[kind]]
label = "Person"

[[kind.property]]
name = "name"
type = "string"
unique_index = true
required = true

[[kind.property]]
name = "full_name"
type = "alias"
target = "name"

[[kind.property]]
name = "age"
type = "integer"
index = true
default = 0

[[kind.property]]
name = "joined"
type = "datetime"
default = "now"

[[kind.relationship]]
name = "country"
target = "Country"
rel_type = "IS_FROM"
cardinality = "zero_or_one"

[[kind.relationship]]
name = "owns"
target = ["Car", "Boat"]
rel_type = "OWNS"

[[kind.relationship.property]]
name = "since"
type = "integer"

[[kind]]
label = "Country"

[[kind.property]]
name = "code"
type = "string"
unique_index = true

[[kind.relationship]]
name = "inhabitant"
target = "Person"
rel_type = "IS_FROM"
direction = "incoming"

[[kind]]
label = "Car"

[[kind]]
label = "Boat"
"#;

    #[test]
    fn test_parse_schema_file() {
        let registry = SchemaFile::parse(PEOPLE).unwrap().registry().unwrap();
        assert_eq!(registry.len(), 4);

        let person = registry.get("Person").unwrap();
        assert_eq!(person.identity_property().unwrap().name(), "name");
        assert!(person.property("full_name").unwrap().is_alias());
        assert_eq!(
            person.property("age").unwrap().default_value(),
            Some(Value::Integer(0))
        );
        assert!(matches!(
            person.property("joined").unwrap().default_value(),
            Some(Value::DateTime(_))
        ));

        let owns = person.relationship("owns").unwrap();
        assert_eq!(owns.targets(), ["Car".to_string(), "Boat".to_string()]);
        assert_eq!(owns.edge_properties().len(), 1);
        assert_eq!(
            person.relationship("country").unwrap().cardinality_constraint(),
            Cardinality::ZeroOrOne
        );
    }

    #[test]
    fn test_bad_schema_files() {
        // Unknown keys are typos, not extensions
        assert!(SchemaFile::parse("[[kind]]\nlabel = \"A\"\nlable = \"B\"").is_err());

        let bad_default = r#"
[[kind]]
label = "A"
[[kind.property]]
name = "n"
type = "integer"
default = "many"
"#;
        assert!(SchemaFile::parse(bad_default).unwrap().registry().is_err());

        let missing_reciprocal = r#"
[[kind]]
label = "A"
[[kind.relationship]]
name = "b"
target = "B"
rel_type = "HAS"
cardinality = "one"
[[kind]]
label = "B"
"#;
        let err = SchemaFile::parse(missing_reciprocal)
            .unwrap()
            .registry()
            .unwrap_err();
        assert!(err.to_string().contains("A.b"), "{}", err);
    }
}
