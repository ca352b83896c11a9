//! tcprelay daemon.
//!
//! Loads the persisted forwarding rules, starts one listener per rule, and
//! relays accepted connections to their destinations until shutdown.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tcprelay_relayd::config::Config;
use tcprelay_relayd::proxy::ProxyServer;
use tcprelay_rules::RuleStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize tracing (prefer RUST_LOG, fall back to the configured level)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    let store = match &config.rules_file {
        Some(path) => RuleStore::new(path.clone()),
        None => RuleStore::at_default_path().context("resolving default rules file")?,
    };

    info!(
        rules_file = %store.path().display(),
        dial_timeout_ms = config.dial_timeout_ms,
        grace_ms = config.grace_ms,
        "Starting relayd"
    );

    let rules = store.load().context("loading rules")?;
    if rules.is_empty() {
        bail!(
            "no rules configured in {} (add one with `relayctl rules add`)",
            store.path().display()
        );
    }

    let server = ProxyServer::with_dial_timeout(config.dial_timeout());
    let proxy = server.start(rules).await.context("starting proxy")?;

    for failure in proxy.failures() {
        error!(
            rule_id = failure.rule_id,
            listen_addr = %failure.listen_addr,
            error = %failure.error,
            "Rule disabled for this run"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Received shutdown signal");

    let summary = proxy.stop(config.grace_period()).await;
    if summary.forced > 0 {
        warn!(forced = summary.forced, "Connections were forced closed");
    }

    info!("relayd shutdown complete");
    Ok(())
}
