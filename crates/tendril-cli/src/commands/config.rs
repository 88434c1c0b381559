//! Config subcommands over `~/.tendril/config.toml`

use clap::{Args, Subcommand};

use crate::config::{config_file_path, Config};
use crate::output;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print one setting (database_url, schema, format)
    Get { key: String },
    /// Change one setting; the value is validated first
    Set { key: String, value: String },
    /// Restore one setting to its default
    Unset { key: String },
    /// Show every setting
    List,
    /// Print where the config file lives
    Path,
    /// Write a config file, optionally seeding the store URL and schema
    Init {
        /// Connection URL to store (default: a redb file under ~/.tendril)
        #[arg(long = "database-url", value_name = "URL")]
        database_url: Option<String>,
        /// Schema file to store
        #[arg(long = "schema-file", value_name = "PATH")]
        schema_file: Option<String>,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn shown(config: &Config, key: &str) -> String {
    config.get(key).unwrap_or_else(|| "(not set)".to_string())
}

pub async fn run(args: &ConfigArgs) -> anyhow::Result<()> {
    let path = config_file_path();

    match &args.command {
        ConfigCommands::Get { key } => {
            let config = Config::load();
            if !Config::keys().iter().any(|k| *k == key.as_str()) {
                anyhow::bail!(
                    "Unknown config key: {} (available: {})",
                    key,
                    Config::keys().join(", ")
                );
            }
            println!("{}", shown(&config, key));
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load();
            config.set(key, value)?;
            config.save()?;
            tracing::debug!("Wrote {}", path.display());
            println!("{} = {}", key, shown(&config, key));
        }
        ConfigCommands::Unset { key } => {
            let mut config = Config::load();
            config.unset(key)?;
            config.save()?;
            println!("{} = {}", key, shown(&config, key));
        }
        ConfigCommands::List => {
            let config = Config::load();
            let rows: Vec<Vec<String>> = Config::keys()
                .iter()
                .map(|key| vec![key.to_string(), shown(&config, key)])
                .collect();
            println!("# {}", path.display());
            println!(
                "{}",
                output::table(&["key".to_string(), "value".to_string()], &rows)
            );
        }
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Init {
            database_url,
            schema_file,
            force,
        } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists; pass --force to replace it",
                    path.display()
                );
            }
            let mut config = Config::default();
            if let Some(url) = database_url {
                config.set("database_url", url)?;
            }
            if let Some(schema) = schema_file {
                config.set("schema", schema)?;
            }
            config.save()?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}
