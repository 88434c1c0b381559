//! Node commands

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};

use super::{json_value, load_node, parse_assignments, parse_criteria};
use crate::output::{format_node, format_nodes};
use crate::AppContext;
use tendril_core::{NodeInstance, NodeValues};

#[derive(Args)]
pub struct NodeArgs {
    #[command(subcommand)]
    pub command: NodeCommands,
}

#[derive(Subcommand)]
pub enum NodeCommands {
    /// Create a node
    Create {
        /// Entity kind
        kind: String,
        /// Field values (field=value)
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        set: Vec<String>,
    },
    /// Create many nodes of one kind from a JSON array of objects
    Import {
        /// Entity kind
        kind: String,
        /// JSON file
        file: PathBuf,
    },
    /// Show a node by id
    Get {
        /// Node id
        id: String,
    },
    /// Find the single node of a kind matching the criteria
    Find {
        /// Entity kind
        kind: String,
        /// Criteria (field=value, field__gt=value, ...)
        #[arg(short = 'w', long = "where", value_name = "KEY=VALUE")]
        criteria: Vec<String>,
    },
    /// Search nodes of a kind
    Search {
        /// Entity kind
        kind: String,
        /// Criteria (field=value, field__gt=value, ...)
        #[arg(short = 'w', long = "where", value_name = "KEY=VALUE")]
        criteria: Vec<String>,
        /// Limit results
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
    /// List every saved node of a kind
    List {
        /// Entity kind
        kind: String,
        /// Limit results
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
    /// Change field values of a node
    Update {
        /// Node id
        id: String,
        /// Field values (field=value; an empty value clears the field)
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Delete a node and its relationships
    Delete {
        /// Node id
        id: String,
        /// Force deletion without confirmation
        #[arg(long)]
        force: bool,
    },
}

fn read_rows(file: &Path) -> anyhow::Result<Vec<NodeValues>> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let objects: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(&raw)
        .with_context(|| format!("{} must hold a JSON array of objects", file.display()))?;

    objects
        .iter()
        .enumerate()
        .map(|(row, object)| {
            object
                .iter()
                .map(|(field, value)| {
                    let value = json_value(value)
                        .with_context(|| format!("row {}: field '{}'", row, field))?;
                    Ok((field.clone(), value))
                })
                .collect::<anyhow::Result<NodeValues>>()
        })
        .collect()
}

fn truncate(mut nodes: Vec<NodeInstance>, limit: usize) -> Vec<NodeInstance> {
    nodes.truncate(limit);
    nodes
}

pub async fn run(args: &NodeArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let db = &ctx.db;

    match &args.command {
        NodeCommands::Create { kind, set } => {
            let mut node = db.instance(kind)?;
            for (field, value) in parse_assignments(set)? {
                node.set(&field, value)?;
            }
            db.save(&mut node).await?;
            tracing::info!("Created {}", node.describe());
            ctx.emit(&format_node(&node, ctx.format));
        }
        NodeCommands::Import { kind, file } => {
            let rows = read_rows(file)?;
            let created = db.batch_create(kind, rows).await?;
            tracing::info!("Imported {} {} node(s)", created.len(), kind);
            ctx.emit(&format_nodes(&created, ctx.format));
        }
        NodeCommands::Get { id } => {
            let node = load_node(db, id).await?;
            ctx.emit(&format_node(&node, ctx.format));
        }
        NodeCommands::Find { kind, criteria } => {
            let criteria = parse_criteria(criteria)?;
            let node = db.index(kind)?.get(&criteria).await?;
            ctx.emit(&format_node(&node, ctx.format));
        }
        NodeCommands::Search {
            kind,
            criteria,
            limit,
        } => {
            let criteria = parse_criteria(criteria)?;
            let found = db.index(kind)?.search(&criteria).await?;
            tracing::info!("Found {} {} node(s) matching {}", found.len(), kind, criteria);
            ctx.emit(&format_nodes(&truncate(found, *limit), ctx.format));
        }
        NodeCommands::List { kind, limit } => {
            let nodes = db.category(kind).await?.instances().await?;
            ctx.emit(&format_nodes(&truncate(nodes, *limit), ctx.format));
        }
        NodeCommands::Update { id, set } => {
            let mut node = load_node(db, id).await?;
            for (field, value) in parse_assignments(set)? {
                node.set(&field, value)?;
            }
            db.save(&mut node).await?;
            tracing::info!("Updated {}", node.describe());
            ctx.emit(&format_node(&node, ctx.format));
        }
        NodeCommands::Delete { id, force } => {
            let mut node = load_node(db, id).await?;
            if !force {
                ctx.emit(&format!(
                    "Use --force to confirm deletion of {}",
                    node.describe()
                ));
                return Ok(());
            }
            let described = node.describe();
            db.delete(&mut node).await?;
            tracing::info!("Deleted {}", described);
            ctx.emit(&format!("Deleted {}", described));
        }
    }

    Ok(())
}
