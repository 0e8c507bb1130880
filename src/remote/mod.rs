//! Remote Tier
//!
//! The shared tier lives in an external server that speaks the Redis
//! protocol. The wire client is the `redis` crate; this module adds what the
//! cache needs on top of it:
//!
//! - `endpoint`: validates the `redis://` URL and redacts it for logs
//! - `state`: the connection state machine and reconnect backoff
//! - `store`: the [`RemoteStore`] adapter used by the orchestrator

pub mod endpoint;
pub mod state;
pub mod store;

pub use endpoint::RemoteEndpoint;
pub use state::{ConnectionState, ReconnectPolicy, StateEvent};
pub use store::{RemoteStats, RemoteStore};

use std::time::Duration;

/// Timeouts and reconnect behaviour for the remote tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOptions {
    /// Bound on one connection attempt, including the handshake
    pub connect_timeout: Duration,
    /// Bound on a single command round trip
    pub command_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(2),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
