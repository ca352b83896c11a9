//! Service commands (install, enable, disable, status).

use anyhow::Result;
use clap::{Args, Subcommand};

use tcprelay_rules::RuleStore;

use crate::output::{print_info, print_success};
use crate::service::{ServiceManager, SystemdUserService};

/// Service command.
#[derive(Debug, Args)]
pub struct ServiceCommand {
    #[command(subcommand)]
    command: ServiceSubcommand,
}

#[derive(Debug, Subcommand)]
enum ServiceSubcommand {
    /// Install the relayd service definition.
    Install,

    /// Enable and start the installed service.
    Enable,

    /// Stop and disable the service.
    Disable,

    /// Show service status.
    Status,
}

impl ServiceCommand {
    pub fn run(self, store: &RuleStore) -> Result<()> {
        let manager = SystemdUserService::new()?;

        match self.command {
            ServiceSubcommand::Install => {
                manager.install(store.path())?;
                print_success("service installed");
                print_info("enable it with `relayctl service enable`");
            }
            ServiceSubcommand::Enable => {
                manager.enable()?;
                print_success("service enabled and started");
            }
            ServiceSubcommand::Disable => {
                manager.disable()?;
                print_success("service stopped and disabled");
            }
            ServiceSubcommand::Status => {
                for line in manager.status()? {
                    println!("{}", line);
                }
            }
        }

        Ok(())
    }
}
