//! Daemon configuration (flags with env fallbacks).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::proxy::{DEFAULT_DIAL_TIMEOUT, DEFAULT_GRACE_PERIOD};

/// Forward TCP connections per the configured rules.
#[derive(Debug, Parser)]
#[command(name = "relayd")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Rules file path (defaults to the platform config directory).
    #[arg(long, env = "TCPRELAY_RULES_FILE")]
    pub rules_file: Option<PathBuf>,

    /// Destination dial timeout in milliseconds.
    #[arg(
        long,
        env = "TCPRELAY_DIAL_TIMEOUT_MS",
        default_value_t = DEFAULT_DIAL_TIMEOUT.as_millis() as u64
    )]
    pub dial_timeout_ms: u64,

    /// Shutdown grace period for in-flight connections, in milliseconds.
    #[arg(
        long,
        env = "TCPRELAY_GRACE_MS",
        default_value_t = DEFAULT_GRACE_PERIOD.as_millis() as u64
    )]
    pub grace_ms: u64,

    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error).
    #[arg(long, env = "TCPRELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}
