//! Error display for the CLI.

use colored::Colorize;

/// Print an error in a user-friendly format, context chain included.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);
}
