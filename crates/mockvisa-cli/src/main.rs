//! `mockvisa` command line.
//!
//! Talks to the fixture instruments in-process:
//!
//! ```bash
//! mockvisa list
//! mockvisa query MOCK0::mock1::INSTR ":INSTR:CHANNEL1:VOLT 12" ":INSTR:CHANNEL1:VOLT?"
//! mockvisa commands MOCK0::mock4::INSTR
//! mockvisa --config mockvisa.toml config
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;

use mockvisa_core::config::{Config, ConfigBuilder};
use mockvisa_core::logging;
use mockvisa_devices::devices::default_resources;
use mockvisa_devices::{Device, ResourceManager, ResourceRegistry};

#[derive(Parser)]
#[command(name = "mockvisa")]
#[command(about = "Simulated SCPI instruments for testing VISA client code", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overriding the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List resource names matching a VISA resource expression
    List {
        /// Resource expression
        #[arg(default_value = "?*::INSTR")]
        query: String,
    },

    /// Send commands to a resource and print each reply
    Query {
        /// Resource name, e.g. MOCK0::mock1::INSTR
        resource: String,

        /// Commands, sent in order
        #[arg(required = true)]
        commands: Vec<String>,
    },

    /// Show the command templates of a resource
    Commands {
        /// Resource name
        resource: String,
    },

    /// Print the effective configuration
    Config,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut builder = ConfigBuilder::from_env();
    if let Some(path) = &cli.config {
        builder = builder.with_config_file(path);
    }
    let mut config = builder.build().context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

fn manager(config: &Config) -> Result<ResourceManager> {
    let registry = ResourceRegistry::new();
    registry.register_all(default_resources());
    Ok(ResourceManager::with_config(Arc::new(registry), &config.simulator)?)
}

fn list(rm: &ResourceManager, query: &str, as_json: bool) -> Result<()> {
    let names = rm.list_resources(Some(query))?;
    if as_json {
        println!("{}", json!(names));
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}

fn query(rm: &ResourceManager, resource: &str, commands: &[String], as_json: bool) -> Result<()> {
    let resource = rm
        .open_resource(resource)
        .with_context(|| format!("Failed to open {}", resource))?;

    let mut replies = Vec::with_capacity(commands.len());
    for command in commands {
        debug!(command = %command, "Sending");
        resource
            .write(command)
            .with_context(|| format!("Command {:?} failed", command))?;
        // Commands without output leave the drained buffer empty
        let reply = resource.read_raw()?;
        let reply = (!reply.is_empty()).then(|| String::from_utf8_lossy(&reply).into_owned());
        replies.push((command.clone(), reply));
    }

    if as_json {
        let entries: Vec<_> = replies
            .iter()
            .map(|(command, reply)| json!({ "command": command, "reply": reply }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (_, reply) in replies.iter() {
            if let Some(reply) = reply {
                println!("{}", reply);
            }
        }
    }
    Ok(())
}

fn commands(rm: &ResourceManager, resource: &str, as_json: bool) -> Result<()> {
    let session = rm
        .open(resource)
        .with_context(|| format!("Failed to open {}", resource))?;
    let commands = session.device().commands()?;

    if as_json {
        let entries: Vec<_> = commands
            .iter()
            .map(|(template, signature)| {
                json!({ "template": template, "signature": signature.to_string() })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        let width = commands.iter().map(|(t, _)| t.len()).max().unwrap_or(0);
        for (template, signature) in commands {
            println!("{:width$}  {}", template, signature, width = width);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logging::init_from_config(&config.logging)?;

    match &cli.command {
        Commands::Config => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.to_toml()?);
            }
        }
        Commands::List { query } => list(&manager(&config)?, query, cli.json)?,
        Commands::Query { resource, commands } => {
            query(&manager(&config)?, resource, commands, cli.json)?
        }
        Commands::Commands { resource } => self::commands(&manager(&config)?, resource, cli.json)?,
    }
    Ok(())
}
