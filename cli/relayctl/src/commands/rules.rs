//! Rules commands (list, add, edit, delete).

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use tcprelay_rules::{Rule, RuleStore};

use crate::editor::{self, EditCommand};
use crate::output::{print_output, print_success, OutputFormat};

/// Rules command.
#[derive(Debug, Args)]
pub struct RulesCommand {
    #[command(subcommand)]
    command: RulesSubcommand,
}

#[derive(Debug, Subcommand)]
enum RulesSubcommand {
    /// List configured forwarding rules.
    List,

    /// Add a forwarding rule.
    Add(AddRuleArgs),

    /// Edit an existing rule.
    Edit(EditRuleArgs),

    /// Delete a rule.
    Delete(DeleteRuleArgs),
}

#[derive(Debug, Args)]
struct AddRuleArgs {
    /// Local interface address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Local port to listen on.
    #[arg(long)]
    listen_port: u16,

    /// Destination host.
    #[arg(long)]
    dest: String,

    /// Destination port.
    #[arg(long)]
    dest_port: u16,
}

#[derive(Debug, Args)]
struct EditRuleArgs {
    /// Rule ID.
    id: u32,

    /// New bind address.
    #[arg(long)]
    bind: Option<String>,

    /// New listen port.
    #[arg(long)]
    listen_port: Option<u16>,

    /// New destination host.
    #[arg(long)]
    dest: Option<String>,

    /// New destination port.
    #[arg(long)]
    dest_port: Option<u16>,
}

#[derive(Debug, Args)]
struct DeleteRuleArgs {
    /// Rule ID.
    id: u32,
}

/// Table row for rule listings.
#[derive(Debug, Serialize, Tabled)]
struct RuleRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Bind Address")]
    bind_address: String,
    #[tabled(rename = "Listen Port")]
    listen_port: u16,
    #[tabled(rename = "Destination Address")]
    dest_address: String,
    #[tabled(rename = "Destination Port")]
    dest_port: u16,
}

impl From<&Rule> for RuleRow {
    fn from(rule: &Rule) -> Self {
        Self {
            id: rule.id,
            bind_address: rule.bind_address.clone(),
            listen_port: rule.listen_port,
            dest_address: rule.dest_address.clone(),
            dest_port: rule.dest_port,
        }
    }
}

impl RulesCommand {
    pub fn run(self, store: &RuleStore, format: OutputFormat) -> Result<()> {
        match self.command {
            RulesSubcommand::List => {
                let rules = store.load()?;
                let rows: Vec<RuleRow> = rules.iter().map(RuleRow::from).collect();
                print_output(&rows, format);
                Ok(())
            }
            RulesSubcommand::Add(args) => apply_and_save(
                store,
                EditCommand::Add {
                    bind_address: args.bind,
                    listen_port: args.listen_port,
                    dest_address: args.dest,
                    dest_port: args.dest_port,
                },
                "Added rule",
            ),
            RulesSubcommand::Edit(args) => apply_and_save(
                store,
                EditCommand::Edit {
                    id: args.id,
                    bind_address: args.bind,
                    listen_port: args.listen_port,
                    dest_address: args.dest,
                    dest_port: args.dest_port,
                },
                "Updated rule",
            ),
            RulesSubcommand::Delete(args) => {
                apply_and_save(store, EditCommand::Delete { id: args.id }, "Deleted rule")
            }
        }
    }
}

/// Load, apply one edit, save, report.
fn apply_and_save(store: &RuleStore, command: EditCommand, verb: &str) -> Result<()> {
    let rules = store.load()?;
    let (updated, id) = editor::apply(&rules, command)?;
    store.save(&updated)?;
    print_success(&format!("{} {} (restart relayd to apply)", verb, id));
    Ok(())
}
