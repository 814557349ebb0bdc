//! Proxy module - pass-through chat-completions relay

pub mod handlers;
pub mod relay;
pub mod server;
pub mod sse;
pub mod stats;
pub mod upstream;

pub use server::ProxyServer;
pub use stats::RelayStats;
