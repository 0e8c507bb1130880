//! Tiered Cache
//!
//! [`TieredCache`] puts a shared remote tier in front of a per-process local
//! tier and hides which one answered.
//!
//! ```text
//!   get(key) ──> remote ready? ──yes──> remote hit? ──yes──> hydrate local, return
//!                     │                     │
//!                     no                  miss / error
//!                     ▼                     ▼
//!                local tier <───────────────┘
//!
//!   set(key) ──> local tier ──> remote tier (if active; failures logged)
//! ```
//!
//! Without an active remote tier the cache runs local-only and an
//! [`ExpirySweeper`](crate::storage::ExpirySweeper) keeps the local tier clean.

pub mod stats;
pub mod tiered;

pub use stats::{CacheMode, CacheStats, GlobalStats};
pub use tiered::{CacheValue, TieredCache};
