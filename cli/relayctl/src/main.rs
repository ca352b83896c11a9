//! relayctl - manage tcprelay forwarding rules and the relayd service.
//!
//! The rule edits themselves are pure functions over the rule set (see
//! `editor`); the commands here only load, apply, and save.

use clap::Parser;

mod commands;
mod editor;
mod error;
mod output;
mod service;

use commands::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.run() {
        error::print_error(&e);
        std::process::exit(1);
    }
}
