//! Local Tier Module
//!
//! This module provides the in-process side of the cache: a thread-safe,
//! sharded store where every entry has a TTL, and a background sweeper that
//! reclaims expired entries on a schedule.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       LocalStore                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ cleanup_expired()
//!              ┌─────────────┴─────────────┐
//!              │      ExpirySweeper        │
//!              │  (cron / @every schedule) │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use cacheflow::storage::LocalStore;
//! use std::time::Duration;
//!
//! let store = LocalStore::new();
//! store.set("session", "token123".to_string(), Duration::from_secs(3600));
//! assert_eq!(store.get("session"), Some("token123".to_string()));
//! ```

pub mod local;
pub mod schedule;
pub mod sweeper;

// Re-export commonly used types
pub use local::{CacheEntry, LocalStats, LocalStore};
pub use schedule::Schedule;
pub use sweeper::{ExpirySweeper, Sweep, SweeperStatus};
