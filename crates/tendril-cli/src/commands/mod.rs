//! CLI command implementations

pub mod category;
pub mod completions;
pub mod config;
pub mod node;
pub mod rel;
pub mod schema;

use anyhow::Context;
use tendril_core::{Criteria, Database, NodeId, NodeInstance, NodeValues, Value};

/// Split a `field=value` argument; an empty value means null
pub fn parse_assignment(raw: &str) -> anyhow::Result<(String, Value)> {
    let (field, value) = raw
        .split_once('=')
        .with_context(|| format!("expected field=value, got '{}'", raw))?;
    let field = field.trim();
    if field.is_empty() {
        anyhow::bail!("missing field name in '{}'", raw);
    }
    let value = if value.is_empty() {
        Value::Null
    } else {
        Value::String(value.to_string())
    };
    Ok((field.to_string(), value))
}

pub fn parse_assignments(raw: &[String]) -> anyhow::Result<NodeValues> {
    raw.iter().map(|r| parse_assignment(r)).collect()
}

/// Criteria from `key=value` arguments; keys may carry a lookup suffix (`age__gt=3`)
pub fn parse_criteria(raw: &[String]) -> anyhow::Result<Criteria> {
    let mut criteria = Criteria::new();
    for r in raw {
        let (key, value) = parse_assignment(r)?;
        criteria = criteria.lookup(&key, value);
    }
    Ok(criteria)
}

/// Load any registered node by id, inflated to its own kind
pub async fn load_node(db: &Database, raw_id: &str) -> anyhow::Result<NodeInstance> {
    let id = NodeId::from_string(raw_id.trim())
        .map_err(|e| anyhow::anyhow!("invalid node id '{}': {}", raw_id, e))?;
    let row = db
        .store()
        .get_node(&id)
        .await?
        .with_context(|| format!("no node with id {}", id))?;
    Ok(db.inflate(&row)?)
}

/// Convert a JSON scalar into a field value
pub fn json_value(value: &serde_json::Value) -> anyhow::Result<Value> {
    Ok(match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(
                n.as_f64()
                    .with_context(|| format!("number {} is out of range", n))?,
            ),
        },
        other => anyhow::bail!("expected a scalar, got {}", other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("name=Jim").unwrap(),
            ("name".to_string(), Value::from("Jim"))
        );
        assert_eq!(
            parse_assignment("motto=a=b").unwrap(),
            ("motto".to_string(), Value::from("a=b"))
        );
        assert_eq!(
            parse_assignment("email=").unwrap(),
            ("email".to_string(), Value::Null)
        );
        assert!(parse_assignment("name").is_err());
        assert!(parse_assignment("=Jim").is_err());
    }

    #[test]
    fn test_json_value() {
        assert_eq!(json_value(&serde_json::json!(3)).unwrap(), Value::Integer(3));
        assert_eq!(json_value(&serde_json::json!(2.5)).unwrap(), Value::Float(2.5));
        assert_eq!(json_value(&serde_json::json!(null)).unwrap(), Value::Null);
        assert!(json_value(&serde_json::json!([1, 2])).is_err());
    }
}
