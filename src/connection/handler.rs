//! Front Door Connections
//!
//! Accepts RESP clients and runs one task per connection. Each task frames
//! commands out of its read buffer, hands them to the shared
//! [`CommandHandler`], and writes replies back in order.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!   accept ──> spawn task ──> ┌──────────────────────────────┐
//!                             │ frame commands from buffer   │
//!                             │ execute against the cache    │
//!                             │ write reply                  │
//!                             │ read more bytes when empty   │
//!                             └──────────────┬───────────────┘
//!                                            │ EOF, QUIT, protocol error
//!                                            ▼
//!                                        task ends
//! ```
//!
//! Pipelined commands arriving in one read are executed back to back before
//! the next read.

use crate::cache::TieredCache;
use crate::commands::CommandHandler;
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::BytesMut;
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, trace, warn};

/// Maximum bytes buffered for a single unparsed command (16 MB)
const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Counters shared by every front door connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

/// A copy of [`ConnectionStats`] for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub commands_processed: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client closed the socket between commands
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client closed the socket in the middle of a command
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,
}

impl ConnectionError {
    /// True for the ways a client normally goes away.
    fn is_benign(&self) -> bool {
        match self {
            ConnectionError::ClientDisconnected => true,
            ConnectionError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// One client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    commands: CommandHandler,
    parser: RespParser,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            commands,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Serves the client until it leaves. `Ok` means it sent `QUIT`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.serve_commands().await;
        match &result {
            Ok(()) => debug!(client = %self.addr, "Client quit"),
            Err(e) if e.is_benign() => debug!(client = %self.addr, "Client disconnected"),
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.closed();
        result
    }

    async fn serve_commands(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(command) = self.next_command().await? {
                let quit = CommandHandler::is_quit(&command);
                let reply = self.commands.execute(command).await;
                self.stats.commands_processed.fetch_add(1, Ordering::Relaxed);
                self.write_reply(&reply).await?;

                if quit {
                    return Ok(());
                }
            }

            self.fill_buffer().await?;
        }
    }

    /// Frames the next command from the buffer, if a whole one is there.
    ///
    /// On malformed input the client gets an error reply before the
    /// connection is dropped.
    async fn next_command(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((command, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(client = %self.addr, consumed, buffered = self.buffer.len(), "Framed command");
                Ok(Some(command))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                let reply = RespValue::error(format!("ERR Protocol error: {}", e));
                let _ = self.write_reply(&reply).await;
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    async fn fill_buffer(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(client = %self.addr, size = self.buffer.len(), "Command exceeds buffer limit");
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(if self.buffer.is_empty() {
                ConnectionError::ClientDisconnected
            } else {
                ConnectionError::UnexpectedEof
            });
        }

        self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn write_reply(&mut self, reply: &RespValue) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats
            .bytes_written
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Runs one connection to completion.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    // Errors are logged by `run`
    let _ = ConnectionHandler::new(stream, addr, commands, stats).run().await;
}

/// Accepts clients on `listener` forever, serving each from `cache`.
///
/// # Example
///
/// ```ignore
/// let listener = TcpListener::bind("127.0.0.1:6380").await?;
/// let cache = Arc::new(TieredCache::new(CacheConfig::from_env()?).await?);
/// serve(listener, cache, Arc::new(ConnectionStats::new())).await;
/// ```
pub async fn serve(
    listener: TcpListener,
    cache: Arc<TieredCache<Value>>,
    stats: Arc<ConnectionStats>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Accepting connections");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                }
                let commands = CommandHandler::new(Arc::clone(&cache), Arc::clone(&stats));
                tokio::spawn(handle_connection(stream, addr, commands, Arc::clone(&stats)));
            }
            Err(e) => {
                // Usually fd exhaustion; back off briefly
                error!(error = %e, "Failed to accept connection");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}
