//! Remote Connection State Machine
//!
//! ```text
//!                 Connect            Established
//!  Disconnected ──────────> Connecting ──────────> Ready <─────────┐
//!       ▲                    │  ▲  │                 │             │
//!       │      AttemptFailed └──┘  │ attempts        │ TransportLost│ Established
//!       │ Closed                   ▼ exhausted       ▼             │
//!       └──────────────────  Failed <────────── Reconnecting ──────┘
//!                          (terminal)  attempts     │  ▲
//!                                      exhausted    └──┘ AttemptFailed
//! ```
//!
//! Transitions are pure so the policy can be tested without a network.
//! The same [`ReconnectPolicy`] bounds the first connection and later
//! reconnects. `Failed` absorbs every event, including `Closed`.

use std::fmt;
use std::time::Duration;

/// Backoff policy for connecting and for reconnecting after the transport drops.
///
/// Retry `n` (1-based) waits `min(n * step, cap)`; after `max_attempts`
/// failed attempts the connection is marked [`ConnectionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay growth per attempt
    pub step: Duration,
    /// Upper bound on any single delay
    pub cap: Duration,
    /// Attempts before giving up for good
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(100),
            cap: Duration::from_millis(3000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Returns the delay before reconnect attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.cap)
    }
}

/// Lifecycle of the remote connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or closed by `disconnect()`
    Disconnected,
    /// First connection in progress; `attempt` attempts have failed so far
    Connecting { attempt: u32 },
    /// Connected and serving requests
    Ready,
    /// Transport lost; `attempt` reconnects have failed so far
    Reconnecting { attempt: u32 },
    /// Gave up; terminal for this instance
    Failed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// `connect()` was called
    Connect,
    /// A handshake (initial or reconnect) succeeded
    Established,
    /// An I/O error or timeout broke the connection
    TransportLost,
    /// One connect or reconnect attempt failed
    AttemptFailed,
    /// `disconnect()` was called
    Closed,
}

impl ConnectionState {
    /// Returns the state after `event`.
    ///
    /// Events that make no sense in the current state leave it unchanged.
    pub fn next(self, event: StateEvent, policy: &ReconnectPolicy) -> Self {
        use ConnectionState::*;
        use StateEvent::*;

        match (self, event) {
            (Failed, _) => Failed,
            (_, Closed) => Disconnected,
            (Disconnected, Connect) => Connecting { attempt: 0 },
            (Connecting { .. }, Established) | (Reconnecting { .. }, Established) => Ready,
            (Ready, TransportLost) => Reconnecting { attempt: 0 },
            (Connecting { attempt }, AttemptFailed) => match attempt + 1 {
                n if n >= policy.max_attempts => Failed,
                n => Connecting { attempt: n },
            },
            (Reconnecting { attempt }, AttemptFailed) => match attempt + 1 {
                n if n >= policy.max_attempts => Failed,
                n => Reconnecting { attempt: n },
            },
            (state, _) => state,
        }
    }

    /// True when requests can be sent.
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// True once the connection has permanently failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed)
    }

    /// True while the tier is usable now or expected to be again shortly.
    pub fn is_available(&self) -> bool {
        matches!(
            self,
            ConnectionState::Ready | ConnectionState::Reconnecting { .. }
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting { attempt: 0 } => write!(f, "connecting"),
            ConnectionState::Connecting { attempt } => write!(f, "connecting ({})", attempt),
            ConnectionState::Ready => write!(f, "ready"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting ({})", attempt),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}
