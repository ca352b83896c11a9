//! Proxy orchestration and lifecycle.
//!
//! [`ProxyServer::start`] turns a rule set into running listeners and hands
//! back a [`RunningProxy`]. The handle owns every listener task and the
//! shutdown signalling; dropping it tears the proxy down.
//!
//! Lifecycle: `Initializing -> Running -> ShuttingDown -> Stopped`.
//! Shutdown stops accept loops first, lets in-flight relays drain for a
//! grace period, then forces any stragglers closed.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tcprelay_rules::RuleSet;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::listener::Listener;
use super::relay::DEFAULT_DIAL_TIMEOUT;

/// Default grace period for in-flight relays at shutdown.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How long forced relays get to unwind after the grace period expires.
const FORCE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How often the shutdown path re-checks the active relay count.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Lifecycle states of the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

/// Why a rule produced no listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Another rule claims the same listen endpoint.
    #[error("duplicate listen endpoint")]
    Conflict,

    /// The listener socket could not be bound.
    #[error("bind failed: {0}")]
    Bind(#[from] io::Error),
}

/// One rule that did not start, with the reason.
#[derive(Debug)]
pub struct ListenerFailure {
    pub rule_id: u32,
    pub listen_addr: String,
    pub error: ListenerError,
}

/// Startup failed outright.
#[derive(Debug, Error)]
pub enum StartError {
    /// Every configured rule failed to produce a listener.
    #[error("no listeners started ({} rule(s) failed)", .0.len())]
    NoListeners(Vec<ListenerFailure>),
}

/// Server-wide connection counters.
#[derive(Debug, Default)]
pub struct ProxyStats {
    /// Connections accepted across all listeners.
    pub connections_accepted: AtomicU64,
    /// Relays that ended in an error (dial or mid-stream).
    pub relays_failed: AtomicU64,
    /// Relays currently live.
    pub relays_active: AtomicU64,
}

/// Connection-forwarding server.
pub struct ProxyServer {
    dial_timeout: Duration,
}

impl ProxyServer {
    pub fn new() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    pub fn with_dial_timeout(dial_timeout: Duration) -> Self {
        Self { dial_timeout }
    }

    /// Start one listener per rule.
    ///
    /// Rules sharing a listen endpoint are all excluded up front; the rest
    /// bind independently, so one bad rule never blocks the others. Fails
    /// only when no rule produced a listener.
    pub async fn start(&self, rules: RuleSet) -> Result<RunningProxy, StartError> {
        let (state_tx, _) = watch::channel(ProxyState::Initializing);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (force_tx, force_rx) = watch::channel(false);
        let stats = Arc::new(ProxyStats::default());

        let conflicted = rules.conflicted_ids();
        let mut failures = Vec::new();
        let mut listeners = Vec::new();

        for rule in rules.iter() {
            if conflicted.contains(&rule.id) {
                error!(
                    rule_id = rule.id,
                    listen_addr = %rule.listen_addr(),
                    "Listener failed: duplicate listen endpoint"
                );
                failures.push(ListenerFailure {
                    rule_id: rule.id,
                    listen_addr: rule.listen_addr(),
                    error: ListenerError::Conflict,
                });
                continue;
            }

            match Listener::bind(rule.clone(), self.dial_timeout).await {
                Ok(listener) => listeners.push(listener),
                Err(e) => {
                    error!(
                        rule_id = rule.id,
                        listen_addr = %rule.listen_addr(),
                        error = %e,
                        "Listener failed"
                    );
                    failures.push(ListenerFailure {
                        rule_id: rule.id,
                        listen_addr: rule.listen_addr(),
                        error: ListenerError::Bind(e),
                    });
                }
            }
        }

        if listeners.is_empty() {
            state_tx.send_replace(ProxyState::Stopped);
            return Err(StartError::NoListeners(failures));
        }

        let mut listen_addrs = Vec::new();
        let mut accept_loops = Vec::new();
        for listener in listeners {
            listen_addrs.push(listener.local_addr());
            accept_loops.push(tokio::spawn(listener.run(
                shutdown_rx.clone(),
                force_rx.clone(),
                Arc::clone(&stats),
            )));
        }

        state_tx.send_replace(ProxyState::Running);
        info!(
            listener_count = listen_addrs.len(),
            failed_rules = failures.len(),
            "Proxy running"
        );

        Ok(RunningProxy {
            listen_addrs,
            failures,
            accept_loops,
            shutdown_tx,
            force_tx,
            state_tx,
            stats,
        })
    }
}

impl Default for ProxyServer {
    fn default() -> Self {
        Self::new()
    }
}

/// What shutdown did with in-flight relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Relays still open when the grace period expired and forced closed.
    pub forced: u64,
}

impl ShutdownSummary {
    /// True when every relay finished within the grace period.
    pub fn drained(&self) -> bool {
        self.forced == 0
    }
}

/// Handle to a running proxy.
///
/// Owns the accept-loop tasks and the shutdown signalling. Dropping the
/// handle without calling [`RunningProxy::stop`] closes the signal
/// channels, which terminates accept loops and relays without a grace
/// period.
pub struct RunningProxy {
    listen_addrs: Vec<SocketAddr>,
    failures: Vec<ListenerFailure>,
    accept_loops: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    force_tx: watch::Sender<bool>,
    state_tx: watch::Sender<ProxyState>,
    stats: Arc<ProxyStats>,
}

impl RunningProxy {
    /// Bound listen addresses, in rule order.
    pub fn listen_addrs(&self) -> &[SocketAddr] {
        &self.listen_addrs
    }

    /// Rules that did not start this run.
    pub fn failures(&self) -> &[ListenerFailure] {
        &self.failures
    }

    /// Live relay count.
    pub fn active_relays(&self) -> u64 {
        self.stats.relays_active.load(Ordering::Relaxed)
    }

    /// Server-wide counters.
    pub fn stats(&self) -> &ProxyStats {
        &self.stats
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProxyState {
        *self.state_tx.borrow()
    }

    /// Subscribe to lifecycle state changes.
    pub fn state_changes(&self) -> watch::Receiver<ProxyState> {
        self.state_tx.subscribe()
    }

    /// Stop the proxy.
    ///
    /// Accept loops stop first so no new work arrives, then in-flight
    /// relays drain naturally for up to `grace`. Whatever remains is
    /// forced closed and counted in the summary; a forced shutdown is a
    /// warning, never an error.
    pub async fn stop(mut self, grace: Duration) -> ShutdownSummary {
        self.state_tx.send_replace(ProxyState::ShuttingDown);
        info!(
            active_relays = self.active_relays(),
            grace_ms = grace.as_millis() as u64,
            "Stopping listeners"
        );

        self.shutdown_tx.send_replace(true);
        for handle in self.accept_loops.drain(..) {
            let _ = handle.await;
        }

        let forced = if self.drain(grace).await {
            0
        } else {
            let remaining = self.active_relays();
            warn!(
                remaining,
                grace_ms = grace.as_millis() as u64,
                "Grace period expired, forcing remaining relays closed"
            );
            self.force_tx.send_replace(true);
            let _ = self.drain(FORCE_DRAIN_TIMEOUT).await;
            remaining
        };

        self.state_tx.send_replace(ProxyState::Stopped);
        info!("Proxy stopped");

        ShutdownSummary { forced }
    }

    /// Wait up to `limit` for the active relay count to reach zero.
    async fn drain(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while self.active_relays() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        true
    }
}
