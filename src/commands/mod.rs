//! Command Module
//!
//! Turns parsed RESP commands into cache operations.
//!
//! ```text
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  dispatch by name, check arity, decode payloads
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ TieredCache     │  (cache module)
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::CommandHandler;
