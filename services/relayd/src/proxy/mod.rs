//! The connection-forwarding engine.
//!
//! This module provides:
//! - One TCP listener per configured rule
//! - A relay task per accepted connection, copying bytes both ways with
//!   TCP half-close propagation
//! - Orchestration with graceful, grace-bounded shutdown
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener (per rule) -> ConnectionRelay -> Destination
//!                 |
//!            ProxyServer (startup, drain, shutdown)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use tcprelay_relayd::proxy::ProxyServer;
//!
//! let proxy = ProxyServer::new().start(rules).await?;
//! // ...
//! proxy.stop(grace).await;
//! ```

mod listener;
mod relay;
mod server;

pub use listener::Listener;
pub use relay::{RelayError, RelayStats, DEFAULT_DIAL_TIMEOUT};
pub use server::{
    ListenerError, ListenerFailure, ProxyServer, ProxyState, ProxyStats, RunningProxy,
    ShutdownSummary, StartError, DEFAULT_GRACE_PERIOD,
};
