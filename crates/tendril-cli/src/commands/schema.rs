//! Schema commands

use clap::{Args, Subcommand};
use serde::Serialize;

use crate::config::Config;
use crate::output::{self, OutputFormat};
use crate::{AppContext, Cli};
use tendril_core::{EntityKind, Registry};

#[derive(Args)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaCommands,
}

#[derive(Subcommand)]
pub enum SchemaCommands {
    /// Validate the schema file and list its kinds
    Check,
    /// Create the indexes and constraints the schema needs in the store
    Install,
}

#[derive(Serialize)]
struct PropertySummary {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    required: bool,
    unique: bool,
    indexed: bool,
}

#[derive(Serialize)]
struct RelationshipSummary {
    name: String,
    targets: Vec<String>,
    rel_type: String,
    direction: String,
    cardinality: String,
}

#[derive(Serialize)]
struct KindSummary {
    label: String,
    properties: Vec<PropertySummary>,
    relationships: Vec<RelationshipSummary>,
}

impl From<&EntityKind> for KindSummary {
    fn from(kind: &EntityKind) -> Self {
        Self {
            label: kind.label().to_string(),
            properties: kind
                .properties()
                .iter()
                .map(|p| PropertySummary {
                    name: p.name().to_string(),
                    kind: match p.alias_target() {
                        Some(target) => format!("alias({})", target),
                        None => p.kind().name().to_string(),
                    },
                    required: p.is_required(),
                    unique: p.is_unique(),
                    indexed: p.is_indexed(),
                })
                .collect(),
            relationships: kind
                .relationships()
                .iter()
                .map(|r| RelationshipSummary {
                    name: r.name().to_string(),
                    targets: r.targets().to_vec(),
                    rel_type: r.rel_type().to_string(),
                    direction: format!("{:?}", r.direction()).to_lowercase(),
                    cardinality: r.cardinality_constraint().to_string(),
                })
                .collect(),
        }
    }
}

fn render(registry: &Registry, format: OutputFormat) -> String {
    let kinds: Vec<KindSummary> = registry.kinds().map(|k| KindSummary::from(k.as_ref())).collect();
    match format {
        OutputFormat::Json => output::to_json(&kinds),
        OutputFormat::Table => {
            let headers = ["kind", "field", "type", "details"].map(String::from).to_vec();
            let mut rows = Vec::new();
            for kind in &kinds {
                for p in &kind.properties {
                    let mut details = Vec::new();
                    if p.required {
                        details.push("required");
                    }
                    if p.unique {
                        details.push("unique");
                    } else if p.indexed {
                        details.push("indexed");
                    }
                    rows.push(vec![
                        kind.label.clone(),
                        p.name.clone(),
                        p.kind.clone(),
                        details.join(", "),
                    ]);
                }
                for r in &kind.relationships {
                    rows.push(vec![
                        kind.label.clone(),
                        r.name.clone(),
                        format!("{} {}", r.direction, r.rel_type),
                        format!("{} {}", r.cardinality, r.targets.join(" | ")),
                    ]);
                }
            }
            output::table(&headers, &rows)
        }
    }
}

pub async fn run(args: &SchemaArgs, cli: &Cli, config: &Config) -> anyhow::Result<()> {
    match &args.command {
        SchemaCommands::Check => {
            let registry = cli.registry(config)?;
            tracing::info!("Schema declares {} kind(s)", registry.len());
            if !cli.quiet {
                println!("{}", render(&registry, cli.output_format(config)?));
            }
        }
        SchemaCommands::Install => {
            let ctx = AppContext::new(cli, config).await?;
            ctx.emit(&format!(
                "Installed {} kind(s)",
                ctx.db.registry().len()
            ));
        }
    }
    Ok(())
}
