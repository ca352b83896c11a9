//! TCP listeners and the accept loop.
//!
//! One listener per configured rule. Each accepted connection is handed to
//! a relay task immediately; the accept loop never waits on a relay. A
//! shutdown signal terminates only the accept loop, leaving in-flight
//! relays to drain.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tcprelay_rules::Rule;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use super::relay::{self, RelayError};
use super::server::ProxyStats;

/// A bound listener tied to one forwarding rule.
pub struct Listener {
    rule: Rule,
    listener: TcpListener,
    local_addr: SocketAddr,
    dial_timeout: Duration,
}

impl Listener {
    /// Bind the rule's listen endpoint.
    ///
    /// Address in use, permission denied, and unresolvable bind addresses
    /// all surface here; the caller decides whether the process goes on.
    pub async fn bind(rule: Rule, dial_timeout: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind(rule.listen_addr()).await?;
        let local_addr = listener.local_addr()?;

        info!(
            rule_id = rule.id,
            bind_addr = %local_addr,
            dest_addr = %rule.dest_host(),
            dest_port = rule.dest_port,
            "Listener started"
        );

        Ok(Self {
            rule,
            listener,
            local_addr,
            dial_timeout,
        })
    }

    /// The bound address (rules may configure port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The rule this listener serves.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Accept connections until the shutdown signal fires.
    ///
    /// The listening socket is dropped on return; relays spawned here keep
    /// running and answer only to `force_close`.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        force_close: watch::Receiver<bool>,
        stats: Arc<ProxyStats>,
    ) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            self.spawn_relay(stream, peer_addr, &force_close, &stats);
                        }
                        Err(e) => {
                            error!(bind_addr = %self.local_addr, error = %e, "Accept error");
                            // Avoid a tight loop on persistent accept errors
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    debug!(bind_addr = %self.local_addr, "Listener stopping");
                    break;
                }
            }
        }
    }

    /// Hand one accepted connection to its own relay task.
    fn spawn_relay(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        force_close: &watch::Receiver<bool>,
        stats: &Arc<ProxyStats>,
    ) {
        stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
        stats.relays_active.fetch_add(1, Ordering::Relaxed);

        info!(
            bind_addr = %self.local_addr,
            dest_addr = %self.rule.dest_host(),
            dest_port = self.rule.dest_port,
            peer_addr = %peer_addr,
            "Connection opened"
        );

        let dest = self.rule.dest_addr();
        let dial_timeout = self.dial_timeout;
        let mut force_close = force_close.clone();
        let stats = Arc::clone(stats);

        tokio::spawn(
            async move {
                tokio::select! {
                    result = relay::run(stream, &dest, dial_timeout) => match result {
                        Ok(bytes) => {
                            info!(
                                client_to_dest = bytes.client_to_dest,
                                dest_to_client = bytes.dest_to_client,
                                reason = "eof",
                                "Connection closed"
                            );
                        }
                        Err(e) => {
                            stats.relays_failed.fetch_add(1, Ordering::Relaxed);
                            match &e {
                                RelayError::Dial { .. } => {
                                    warn!(error = %e, reason = "dial_failed", "Connection closed");
                                }
                                RelayError::Io(_) => {
                                    debug!(error = %e, reason = "relay_error", "Connection closed");
                                }
                            }
                        }
                    },
                    _ = force_close.changed() => {
                        warn!(reason = "forced", "Connection closed");
                    }
                }
                stats.relays_active.fetch_sub(1, Ordering::Relaxed);
            }
            .instrument(tracing::info_span!("connection", peer = %peer_addr)),
        );
    }
}
