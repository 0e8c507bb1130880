//! RESP (Redis Serialization Protocol) Data Types
//!
//! The remote tier and the front door both speak RESP, the protocol Redis uses
//! for client-server communication.
//!
//! ## Protocol Format
//!
//! Each RESP type starts with a type prefix byte:
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Array
//!
//! All types are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1\r\n`
//! Bulk String: `$7\r\n{"x":1}\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nuser\r\n`
//! Null Bulk String: `$-1\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// Represents a value in the RESP protocol.
///
/// Used in both directions on the front door.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe status text. Format: `+<string>\r\n`
    SimpleString(String),

    /// An error reply. Format: `-<error message>\r\n`
    Error(String),

    /// 64-bit signed integer. Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe payload. Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Null bulk string (`$-1\r\n`) or null array (`*-1\r\n`)
    Null,

    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a new simple string reply.
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error reply.
    ///
    /// # Example
    /// ```
    /// use cacheflow::protocol::RespValue;
    /// let err = RespValue::error("ERR unknown command");
    /// assert!(err.is_error());
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Creates a new integer reply.
    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string.
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Creates a null reply.
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Creates an array.
    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Common reply for successful operations
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Common reply for PING
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Builds a request the way clients send one: an array of bulk strings.
    ///
    /// # Example
    /// ```
    /// use cacheflow::protocol::RespValue;
    /// let get = RespValue::command(["GET", "user:1"]);
    /// assert_eq!(get.serialize(), b"*2\r\n$3\r\nGET\r\n$6\r\nuser:1\r\n");
    /// ```
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        RespValue::Array(
            args.into_iter()
                .map(|a| RespValue::BulkString(Bytes::copy_from_slice(a.as_ref())))
                .collect(),
        )
    }

    /// Serializes the value to its wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_line(buf, prefix::SIMPLE_STRING, s.as_bytes()),
            RespValue::Error(s) => write_line(buf, prefix::ERROR, s.as_bytes()),
            RespValue::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => write_line(buf, prefix::BULK_STRING, b"-1"),
            RespValue::Array(values) => {
                write_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Attempts to extract the inner string from SimpleString or BulkString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner bytes from a BulkString or SimpleString.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Attempts to extract an integer, accepting numeric strings too.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            other => other.as_str().and_then(|s| s.parse().ok()),
        }
    }
}

#[inline]
fn write_line(buf: &mut Vec<u8>, prefix: u8, content: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(content);
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => write!(f, "(array of {})", values.len()),
        }
    }
}
