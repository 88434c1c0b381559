//! Relationship commands

use clap::{Args, Subcommand};

use super::{load_node, parse_assignments, parse_criteria};
use crate::output::{format_edge, format_nodes};
use crate::AppContext;

#[derive(Args)]
pub struct RelArgs {
    #[command(subcommand)]
    pub command: RelCommands,
}

#[derive(Subcommand)]
pub enum RelCommands {
    /// Connect a node to a target through a declared relationship
    Connect {
        /// Source node id
        id: String,
        /// Relationship name on the source's kind
        relationship: String,
        /// Target node id
        target: String,
        /// Edge property values (field=value)
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        set: Vec<String>,
    },
    /// Remove the edge to a target
    Disconnect {
        /// Source node id
        id: String,
        /// Relationship name on the source's kind
        relationship: String,
        /// Target node id
        target: String,
    },
    /// Remove every edge of a relationship
    Clear {
        /// Source node id
        id: String,
        /// Relationship name on the source's kind
        relationship: String,
    },
    /// Move the edge from one target to another, keeping its properties
    Reconnect {
        /// Source node id
        id: String,
        /// Relationship name on the source's kind
        relationship: String,
        /// Current target node id
        old: String,
        /// New target node id
        new: String,
    },
    /// List connected nodes
    List {
        /// Source node id
        id: String,
        /// Relationship name on the source's kind
        relationship: String,
        /// Criteria on the connected nodes (field=value, field__gt=value, ...)
        #[arg(short = 'w', long = "where", value_name = "KEY=VALUE")]
        criteria: Vec<String>,
    },
    /// Check stored edges against the declared cardinality
    Check {
        /// Source node id
        id: String,
        /// Relationship name on the source's kind
        relationship: String,
    },
}

pub async fn run(args: &RelArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let db = &ctx.db;

    match &args.command {
        RelCommands::Connect {
            id,
            relationship,
            target,
            set,
        } => {
            let source = load_node(db, id).await?;
            let target = load_node(db, target).await?;
            let edge = db
                .relationship(&source, relationship)?
                .connect(&target, parse_assignments(set)?)
                .await?;
            tracing::info!("Connected {} to {}", source.describe(), target.describe());
            ctx.emit(&format_edge(&edge, ctx.format));
        }
        RelCommands::Disconnect {
            id,
            relationship,
            target,
        } => {
            let source = load_node(db, id).await?;
            let target = load_node(db, target).await?;
            let handle = db.relationship(&source, relationship)?;
            if !handle.is_connected(&target).await? {
                ctx.emit(&format!(
                    "{} is not connected to {} via {}",
                    source.describe(),
                    target.describe(),
                    relationship
                ));
                return Ok(());
            }
            handle.disconnect(&target).await?;
            ctx.emit(&format!(
                "Disconnected {} from {}",
                source.describe(),
                target.describe()
            ));
        }
        RelCommands::Clear { id, relationship } => {
            let source = load_node(db, id).await?;
            let removed = db.relationship(&source, relationship)?.disconnect_all().await?;
            ctx.emit(&format!(
                "Removed {} edge(s) from {}.{}",
                removed,
                source.describe(),
                relationship
            ));
        }
        RelCommands::Reconnect {
            id,
            relationship,
            old,
            new,
        } => {
            let source = load_node(db, id).await?;
            let old = load_node(db, old).await?;
            let new = load_node(db, new).await?;
            let edge = db
                .relationship(&source, relationship)?
                .reconnect(&old, &new)
                .await?;
            ctx.emit(&format_edge(&edge, ctx.format));
        }
        RelCommands::List {
            id,
            relationship,
            criteria,
        } => {
            let source = load_node(db, id).await?;
            let handle = db.relationship(&source, relationship)?;
            let nodes = if criteria.is_empty() {
                handle.all().await?
            } else {
                handle.search(&parse_criteria(criteria)?).await?
            };
            ctx.emit(&format_nodes(&nodes, ctx.format));
        }
        RelCommands::Check { id, relationship } => {
            let source = load_node(db, id).await?;
            let handle = db.relationship(&source, relationship)?;
            handle.validate_existing().await?;
            ctx.emit(&format!(
                "{}.{}: {} connection(s), {} satisfied",
                source.describe(),
                relationship,
                handle.count().await?,
                handle.descriptor().cardinality_constraint()
            ));
        }
    }

    Ok(())
}
