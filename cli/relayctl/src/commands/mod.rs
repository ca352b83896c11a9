//! CLI commands.

mod rules;
mod service;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tcprelay_rules::RuleStore;

use crate::output::OutputFormat;

/// Manage tcprelay forwarding rules and the relayd service.
#[derive(Debug, Parser)]
#[command(name = "relayctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Rules file path (defaults to the platform config directory).
    #[arg(long, global = true, env = "TCPRELAY_RULES_FILE")]
    rules_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage forwarding rules.
    Rules(rules::RulesCommand),

    /// Manage the relayd background service.
    Service(service::ServiceCommand),
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let format = OutputFormat::parse(&self.format)?;

        let store = match self.rules_file {
            Some(path) => RuleStore::new(path),
            None => RuleStore::at_default_path()?,
        };

        match self.command {
            Commands::Rules(cmd) => cmd.run(&store, format),
            Commands::Service(cmd) => cmd.run(&store),
        }
    }
}
