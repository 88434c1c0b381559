//! Output formatting utilities

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tendril_core::{NodeInstance, RelationshipEdge, Value};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("Unknown output format '{}' (expected table or json)", other),
        }
    }
}

/// A node as printed: id, kind and field values in name order
#[derive(Debug, Serialize)]
pub struct NodeView {
    pub id: Option<String>,
    pub label: String,
    pub properties: BTreeMap<String, Value>,
}

impl From<&NodeInstance> for NodeView {
    fn from(instance: &NodeInstance) -> Self {
        Self {
            id: instance.id().map(|id| id.to_string()),
            label: instance.label().to_string(),
            properties: instance
                .values()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// An edge as printed
#[derive(Debug, Serialize)]
pub struct EdgeView {
    pub id: String,
    pub from: String,
    pub to: String,
    pub rel_type: String,
    pub properties: BTreeMap<String, Value>,
}

impl From<&RelationshipEdge> for EdgeView {
    fn from(edge: &RelationshipEdge) -> Self {
        Self {
            id: edge.id.to_string(),
            from: edge.from_id.to_string(),
            to: edge.to_id.to_string(),
            rel_type: edge.rel_type.clone(),
            properties: edge
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Format any serializable value as JSON
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render rows under headers with columns padded to their widest cell
pub fn table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(value.chars().count());
            }
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(headers)];
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    out.extend(rows.iter().map(|r| line(r)));
    out.join("\n")
}

/// Nodes of possibly different kinds; columns are the union of their fields
pub fn format_nodes(nodes: &[NodeInstance], format: OutputFormat) -> String {
    let views: Vec<NodeView> = nodes.iter().map(NodeView::from).collect();
    match format {
        OutputFormat::Json => to_json(&views),
        OutputFormat::Table => {
            let fields: BTreeSet<&String> = views.iter().flat_map(|v| v.properties.keys()).collect();
            let mut headers = vec!["id".to_string(), "kind".to_string()];
            headers.extend(fields.iter().map(|f| f.to_string()));

            let rows: Vec<Vec<String>> = views
                .iter()
                .map(|v| {
                    let mut row = vec![v.id.clone().unwrap_or_default(), v.label.clone()];
                    row.extend(
                        fields
                            .iter()
                            .map(|f| v.properties.get(*f).map(cell).unwrap_or_default()),
                    );
                    row
                })
                .collect();
            table(&headers, &rows)
        }
    }
}

pub fn format_node(node: &NodeInstance, format: OutputFormat) -> String {
    let view = NodeView::from(node);
    match format {
        OutputFormat::Json => to_json(&view),
        OutputFormat::Table => {
            let mut out = vec![format!(
                "{} {}",
                view.label,
                view.id.as_deref().unwrap_or("(unsaved)")
            )];
            for (name, value) in &view.properties {
                out.push(format!("  {}: {}", name, cell(value)));
            }
            out.join("\n")
        }
    }
}

pub fn format_edge(edge: &RelationshipEdge, format: OutputFormat) -> String {
    let view = EdgeView::from(edge);
    match format {
        OutputFormat::Json => to_json(&view),
        OutputFormat::Table => {
            let mut out = vec![format!("{} -[{}]-> {}", view.from, view.rel_type, view.to)];
            for (name, value) in &view.properties {
                out.push(format!("  {}: {}", name, cell(value)));
            }
            out.join("\n")
        }
    }
}
