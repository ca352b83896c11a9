pub mod config;
pub mod proxy;

pub use proxy::{
    Listener, ListenerError, ListenerFailure, ProxyServer, ProxyState, ProxyStats, RelayError,
    RelayStats, RunningProxy, ShutdownSummary, StartError,
};
