//! Incremental RESP Parser
//!
//! Frames requests arriving at the front door. TCP is a stream, so a buffer
//! may hold half a message or several of them.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((value, consumed)))` - Parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the message is incomplete
//! - `Err(ParseError)` - Invalid protocol data
//!
//! The caller appends network data to a buffer, calls `parse()`, and advances
//! the buffer by `consumed` on success.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string, error, or inline command
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

type Parsed = Option<(RespValue, usize)>;

/// An incremental RESP parser.
///
/// # Example
///
/// ```
/// use cacheflow::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b"$-1\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::Null);
/// assert_eq!(consumed, 5);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP value from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Parsed> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match first {
            prefix::SIMPLE_STRING => {
                Ok(read_line(buf)?.map(|(s, n)| (RespValue::SimpleString(s.to_string()), n)))
            }
            prefix::ERROR => Ok(read_line(buf)?.map(|(s, n)| (RespValue::Error(s.to_string()), n))),
            prefix::INTEGER => match read_line(buf)? {
                Some((s, n)) => Ok(Some((RespValue::Integer(parse_int(s)?), n))),
                None => Ok(None),
            },
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            _ => self.parse_inline(buf),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some((length, header)) = read_line(buf)? else {
            return Ok(None);
        };
        let length = parse_int(length)?;

        if length == -1 {
            return Ok(Some((RespValue::Null, header)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = header + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header..header + length]);
        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some((count, header)) = read_line(buf)? else {
            return Ok(None);
        };
        let count = parse_int(count)?;

        if count == -1 {
            return Ok(Some((RespValue::Null, header)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        // Never trust the peer's count for the allocation size
        let mut elements = Vec::with_capacity(count.min(1024));
        let mut consumed = header;

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, n)) => {
                    elements.push(value);
                    consumed += n;
                }
                None => {
                    self.depth -= 1;
                    return Ok(None);
                }
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }

    /// Parses an inline command (`PING\r\n`), as typed into a telnet session.
    fn parse_inline(&mut self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some(pos) = find_crlf(buf) else {
            return Ok(None);
        };

        let line = std::str::from_utf8(&buf[..pos])
            .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

        let elements: Vec<RespValue> = line
            .split_whitespace()
            .map(|s| RespValue::BulkString(Bytes::copy_from_slice(s.as_bytes())))
            .collect();

        if elements.is_empty() {
            return Err(ParseError::ProtocolError(
                "empty inline command".to_string(),
            ));
        }

        Ok(Some((RespValue::Array(elements), pos + 2)))
    }
}

/// Reads the line after the prefix byte.
///
/// Returns the line content and the number of bytes consumed including the
/// prefix and CRLF, or `None` if the line is incomplete.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    let Some(pos) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let line = std::str::from_utf8(&buf[1..1 + pos])
        .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    Ok(Some((line, 1 + pos + 2)))
}

fn parse_int(s: &str) -> ParseResult<i64> {
    s.parse()
        .map_err(|e: std::num::ParseIntError| ParseError::InvalidInteger(e.to_string()))
}

/// Finds the position of `\r` in the first CRLF of `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Helper function to parse a single RESP message from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Parsed> {
    RespParser::new().parse(buf)
}
