//! # cacheflow - A Two-Tier Cache
//!
//! cacheflow keeps values in two places: a shared remote tier (any server
//! speaking the Redis protocol) and a fast in-process local tier. Callers see
//! one cache; which tier answered, and whether the remote tier is up at all,
//! is handled inside.
//!
//! ## Features
//!
//! - **Remote first**: reads try the shared tier and copy hits into the local one
//! - **Graceful degradation**: any remote failure falls back to the local tier
//! - **Automatic reconnect**: linear backoff on startup and after a drop, then
//!   permanent local-only mode
//! - **Sharded local tier**: 64 `RwLock` shards with lazy and scheduled expiry
//! - **RESP front door**: the cache can be served over TCP to Redis clients
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              cacheflow                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (optional)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               ▼                         │
//! │                     ┌──────────────────────────────────────────────┐    │
//! │   your code ───────>│                TieredCache                   │    │
//! │                     └───────┬──────────────────────────┬───────────┘    │
//! │                             ▼                          ▼                │
//! │                     ┌───────────────┐        ┌───────────────────┐      │
//! │                     │  RemoteStore  │        │    LocalStore     │      │
//! │                     │ redis client  │        │  64 RwLock shards │      │
//! │                     └───────┬───────┘        └─────────▲─────────┘      │
//! │                             │                          │                │
//! │                             ▼                  ┌───────┴────────┐       │
//! │                      remote server             │ ExpirySweeper  │       │
//! │                                                │ (local-only)   │       │
//! │                                                └────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use cacheflow::{CacheConfig, TieredCache};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache: TieredCache<serde_json::Value> =
//!         TieredCache::new(CacheConfig::with_remote("redis://localhost:6379")).await?;
//!
//!     let user = cache
//!         .get_or_fetch("user:1", || load_user(1), Some(Duration::from_secs(300)))
//!         .await?;
//!
//!     println!("{}", serde_json::to_string(&cache.stats().await)?);
//!     cache.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`cache`]: the orchestrator and its statistics
//! - [`storage`]: the local tier, schedules and the expiry sweeper
//! - [`remote`]: the remote tier client and its connection state machine
//! - [`config`]: environment-driven configuration
//! - [`protocol`]: RESP types and parser
//! - [`connection`] and [`commands`]: the network front door
//! - [`error`]: the error taxonomy

pub mod cache;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod remote;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use cache::{CacheMode, CacheStats, CacheValue, TieredCache};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use protocol::{ParseError, RespParser, RespValue};
pub use remote::{ConnectionState, RemoteStore};
pub use storage::{ExpirySweeper, LocalStore, Schedule};

/// The default port the front door listens on
pub const DEFAULT_PORT: u16 = 6380;

/// The default host the front door binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of cacheflow
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
