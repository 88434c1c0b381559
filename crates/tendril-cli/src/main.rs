//! Tendril CLI - Command line interface for the object-graph mapper

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;
mod schema_file;

use commands::{category, completions, node, rel, schema};
use config::Config;
use output::OutputFormat;
use schema_file::SchemaFile;
use tendril_core::{Database, Registry};
use tendril_storage::{open_store, ConnectionConfig};

#[derive(Parser)]
#[command(name = "tendril")]
#[command(author, version, about = "Typed entities and relationships over a graph store")]
pub struct Cli {
    /// Connection URL: memory:// or redb:///path/to/graph.redb
    #[arg(long, env = "TENDRIL_DATABASE_URL", hide_env_values = true, global = true)]
    pub url: Option<String>,

    /// TOML file declaring the entity kinds
    #[arg(short, long, env = "TENDRIL_SCHEMA", global = true)]
    pub schema: Option<PathBuf>,

    /// Output format: table, json
    #[arg(short, long, global = true)]
    pub format: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_format(&self, config: &Config) -> anyhow::Result<OutputFormat> {
        OutputFormat::parse(self.format.as_deref().unwrap_or(&config.format))
    }

    /// The schema file path from `--schema`, falling back to the config file
    pub fn schema_path(&self, config: &Config) -> anyhow::Result<PathBuf> {
        self.schema
            .clone()
            .or_else(|| config.schema.as_ref().map(PathBuf::from))
            .context("No schema file: pass --schema or run `tendril config set schema <path>`")
    }

    pub fn registry(&self, config: &Config) -> anyhow::Result<Registry> {
        SchemaFile::load(&self.schema_path(config)?)?.registry()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate or install a schema file
    Schema(schema::SchemaArgs),
    /// Create, read, search and delete nodes
    Node(node::NodeArgs),
    /// Connect and inspect relationships
    Rel(rel::RelArgs),
    /// Show the category node of a kind
    Category(category::CategoryArgs),
    /// Manage CLI configuration
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with an open database
pub struct AppContext {
    pub db: Database,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl AppContext {
    pub async fn new(cli: &Cli, config: &Config) -> anyhow::Result<Self> {
        let registry = cli.registry(config)?;
        let url = cli.url.as_deref().unwrap_or(&config.database_url);
        let connection = ConnectionConfig::parse(url)?;
        tracing::debug!("Using database at: {}", connection);

        let store = open_store(&connection)?;
        let db = Database::open(store, registry)
            .await
            .with_context(|| format!("opening {}", connection))?;

        Ok(Self {
            db,
            format: cli.output_format(config)?,
            quiet: cli.quiet,
        })
    }

    /// Print unless `--quiet`
    pub fn emit(&self, text: &str) {
        if !self.quiet {
            println!("{}", text);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting tendril CLI");
    let config = Config::load();

    match &cli.command {
        Commands::Config(args) => commands::config::run(args).await?,
        Commands::Completions(args) => completions::run(args)?,
        Commands::Schema(args) => schema::run(args, &cli, &config).await?,
        Commands::Node(args) => {
            let ctx = AppContext::new(&cli, &config).await?;
            node::run(args, &ctx).await?
        }
        Commands::Rel(args) => {
            let ctx = AppContext::new(&cli, &config).await?;
            rel::run(args, &ctx).await?
        }
        Commands::Category(args) => {
            let ctx = AppContext::new(&cli, &config).await?;
            category::run(args, &ctx).await?
        }
    }

    Ok(())
}
