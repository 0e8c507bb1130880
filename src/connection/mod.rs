//! Connection Module
//!
//! The network front door: a TCP accept loop and one task per client, each
//! reading RESP commands and answering from the shared cache.
//!
//! ## Example
//!
//! ```ignore
//! use cacheflow::cache::TieredCache;
//! use cacheflow::config::CacheConfig;
//! use cacheflow::connection::{serve, ConnectionStats};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! let cache = Arc::new(TieredCache::new(CacheConfig::from_env()?).await?);
//! let listener = TcpListener::bind("127.0.0.1:6380").await?;
//! serve(listener, cache, Arc::new(ConnectionStats::new())).await;
//! ```

pub mod handler;

pub use handler::{
    handle_connection, serve, ConnectionError, ConnectionHandler, ConnectionSnapshot,
    ConnectionStats,
};
