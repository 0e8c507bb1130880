//! RESP Protocol Implementation
//!
//! The cacheflow front door speaks the Redis Serialization Protocol (RESP),
//! so any Redis client, including another cacheflow instance, can use it.
//! This module holds the value type and the incremental parser.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Incremental parser for RESP data arriving over TCP
//!
//! ## Example
//!
//! ```
//! use cacheflow::protocol::{parse_message, RespValue};
//!
//! // Building a request
//! let request = RespValue::command(["DEL", "user:1"]).serialize();
//!
//! // Parsing the reply
//! let (reply, consumed) = parse_message(b":1\r\n").unwrap().unwrap();
//! assert_eq!(reply, RespValue::integer(1));
//! assert_eq!(consumed, 4);
//! # let _ = request;
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
