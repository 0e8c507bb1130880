//! Remote Tier Adapter
//!
//! Wraps a multiplexed `redis` connection with the connection state machine,
//! a per-command timeout, and the hit/miss/error counters.
//!
//! ## Failure Handling
//!
//! - An error reply from the server is a transient failure; the connection
//!   is kept.
//! - An I/O error or timeout drops the connection, moves the state to
//!   `Reconnecting`, and starts a background task that retries with the
//!   configured [`ReconnectPolicy`](crate::remote::ReconnectPolicy).
//! - While not `Ready`, every command fails fast with
//!   [`CacheError::TransientRemote`].
//!
//! The connection is multiplexed: replies are matched to their requests, so
//! a caller that abandons a request never sees another caller's reply, and
//! callers never queue behind each other for a lock.

use crate::error::{CacheError, CacheResult};
use crate::remote::{ConnectionState, RemoteEndpoint, RemoteOptions, StateEvent};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, RedisResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Point-in-time statistics for the remote tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStats {
    /// Keys in the remote database (0 if it could not be asked)
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
    /// Whether the connection is `Ready`
    pub connected: bool,
    /// Current connection state
    pub state: String,
}

/// Client for the shared remote tier.
///
/// Values are stored as JSON. Cloning is not offered; share it behind an
/// `Arc` or through [`TieredCache`](crate::cache::TieredCache).
pub struct RemoteStore {
    shared: Arc<Shared>,
}

/// The open connection, tagged so a failure on a replaced connection
/// cannot tear down its successor.
#[derive(Clone)]
struct Live {
    generation: u64,
    conn: MultiplexedConnection,
}

struct Shared {
    endpoint: RemoteEndpoint,
    options: RemoteOptions,
    connection: Mutex<Option<Live>>,
    generation: AtomicU64,
    state: Mutex<ConnectionState>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `event` and returns the states before and after.
    fn apply(&self, event: StateEvent) -> (ConnectionState, ConnectionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = *state;
        *state = before.next(event, &self.options.reconnect);
        if before != *state {
            trace!(from = %before, to = %*state, ?event, "Remote state changed");
        }
        (before, *state)
    }

    fn connection(&self) -> std::sync::MutexGuard<'_, Option<Live>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a connection and proves it with `PING`, bounded by the connect timeout.
    async fn open(&self) -> RedisResult<MultiplexedConnection> {
        let client = self.endpoint.client()?;
        let handshake = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, RedisError>(conn)
        };

        match tokio::time::timeout(self.options.connect_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(RedisError::from(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", self.options.connect_timeout),
            ))),
        }
    }

    /// Hands `conn` out for requests if the state machine accepts it.
    fn install(&self, conn: MultiplexedConnection) -> ConnectionState {
        let mut slot = self.connection();
        let (_, after) = self.apply(StateEvent::Established);
        if after.is_ready() {
            let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
            *slot = Some(Live { generation, conn });
        }
        after
    }
}

impl RemoteStore {
    /// Creates a store for `endpoint`. Nothing is sent until [`connect`](Self::connect).
    pub fn new(endpoint: RemoteEndpoint, options: RemoteOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoint,
                options,
                connection: Mutex::new(None),
                generation: AtomicU64::new(0),
                state: Mutex::new(ConnectionState::Disconnected),
                reconnect_task: Mutex::new(None),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                sets: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            }),
        }
    }

    /// The endpoint this store talks to.
    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.shared.endpoint
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// True when commands are sent to the server.
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Connects, retrying with the reconnect policy.
    ///
    /// Succeeds immediately when already connected or reconnecting. Once the
    /// policy's attempts are used up the store is `Failed` for good.
    pub async fn connect(&self) -> CacheResult<()> {
        let endpoint = &self.shared.endpoint;

        match self.state() {
            ConnectionState::Ready | ConnectionState::Reconnecting { .. } => return Ok(()),
            ConnectionState::Failed => {
                return Err(CacheError::FatalConnection(format!(
                    "remote tier at {} has permanently failed",
                    endpoint
                )))
            }
            ConnectionState::Connecting { .. } => {
                return Err(CacheError::TransientRemote(
                    "connection attempt already in progress".to_string(),
                ))
            }
            ConnectionState::Disconnected => {}
        }

        self.shared.apply(StateEvent::Connect);
        info!(endpoint = %endpoint, "Connecting to remote tier");

        loop {
            let cause = match self.shared.open().await {
                Ok(conn) => {
                    let after = self.shared.install(conn);
                    if !after.is_ready() {
                        return Err(CacheError::TransientRemote(format!(
                            "connection closed while connecting ({})",
                            after
                        )));
                    }
                    info!(endpoint = %endpoint, "Remote tier ready");
                    return Ok(());
                }
                Err(e) => e,
            };

            match self.shared.apply(StateEvent::AttemptFailed) {
                (_, ConnectionState::Failed) => {
                    error!(endpoint = %endpoint, error = %cause, "Failed to connect to remote tier");
                    return Err(CacheError::FatalConnection(cause.to_string()));
                }
                (_, ConnectionState::Connecting { attempt }) => {
                    let delay = self.shared.options.reconnect.delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %cause,
                        "Connect attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                (_, other) => {
                    return Err(CacheError::TransientRemote(format!(
                        "connect interrupted ({})",
                        other
                    )))
                }
            }
        }
    }

    /// Reads `key` and decodes it as JSON.
    ///
    /// A payload that does not decode into `V` is logged and counted as a miss.
    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<V>> {
        let payload: Option<Vec<u8>> =
            self.tally(self.execute(|mut conn| async move { conn.get(key).await }).await)?;

        let Some(payload) = payload else {
            self.shared.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Remote miss");
            return Ok(None);
        };

        match serde_json::from_slice(&payload) {
            Ok(value) => {
                self.shared.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Remote hit");
                Ok(Some(value))
            }
            Err(e) => {
                self.shared.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Malformed remote payload, treating as miss");
                Ok(None)
            }
        }
    }

    /// Stores `value` as JSON with an expiry of `ttl`, rounded up to whole
    /// seconds and never below one.
    ///
    /// Encoding happens before anything is sent, so a value that cannot be
    /// encoded yields [`CacheError::Serialization`] and leaves the remote untouched.
    pub async fn set<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
    ) -> CacheResult<()> {
        let payload = serde_json::to_vec(value)?;
        let seconds = expiry_seconds(ttl);

        self.tally(
            self.execute(|mut conn| async move {
                let reply: RedisResult<()> = redis::cmd("SET")
                    .arg(key)
                    .arg(payload)
                    .arg("EX")
                    .arg(seconds)
                    .query_async(&mut conn)
                    .await;
                reply
            })
            .await,
        )?;

        self.shared.sets.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, ttl_secs = seconds, "Remote set");
        Ok(())
    }

    /// Deletes `key`. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        let removed: u64 =
            self.tally(self.execute(|mut conn| async move { conn.del(key).await }).await)?;
        Ok(removed > 0)
    }

    /// Sends `PING`. Counters are not touched.
    pub async fn is_healthy(&self) -> bool {
        let pong: CacheResult<String> = self
            .execute(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await;
        matches!(pong, Ok(reply) if reply == "PONG")
    }

    /// Number of keys in the remote database.
    pub async fn size(&self) -> CacheResult<u64> {
        self.execute(|mut conn| async move { redis::cmd("DBSIZE").query_async(&mut conn).await })
            .await
    }

    /// Removes every key in the remote database.
    pub async fn flush(&self) -> CacheResult<()> {
        self.execute(|mut conn| async move { redis::cmd("FLUSHDB").query_async(&mut conn).await })
            .await
    }

    /// Snapshot of the counters, with the key count asked from the server.
    pub async fn stats(&self) -> RemoteStats {
        let entries = self.size().await.unwrap_or(0);
        let state = self.state();

        RemoteStats {
            entries,
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            sets: self.shared.sets.load(Ordering::Relaxed),
            errors: self.shared.errors.load(Ordering::Relaxed),
            connected: state.is_ready(),
            state: state.to_string(),
        }
    }

    /// Closes the connection and stops any reconnect in progress.
    ///
    /// Safe to call repeatedly. A `Failed` store stays `Failed`.
    pub async fn disconnect(&self) {
        self.abort_reconnect();

        let live = self.shared.connection().take();
        let (before, after) = self.shared.apply(StateEvent::Closed);

        if let Some(Live { mut conn, .. }) = live {
            let timeout = self.shared.options.command_timeout;
            let quit = async {
                let _: RedisResult<()> = redis::cmd("QUIT").query_async(&mut conn).await;
            };
            let _ = tokio::time::timeout(timeout, quit).await;
        }

        if before != after {
            info!(endpoint = %self.shared.endpoint, "Disconnected from remote tier");
        }
    }

    /// Runs one command on the live connection, bounded by the command timeout.
    async fn execute<T, F, Fut>(&self, call: F) -> CacheResult<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let state = self.state();
        if !state.is_ready() {
            return Err(CacheError::TransientRemote(format!("remote tier is {}", state)));
        }

        let Some(live) = self.shared.connection().clone() else {
            return Err(CacheError::TransientRemote(
                "remote tier has no open connection".to_string(),
            ));
        };

        let timeout = self.shared.options.command_timeout;
        match tokio::time::timeout(timeout, call(live.conn)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) if is_transport(&e) => {
                self.connection_lost(live.generation, &e.to_string());
                Err(CacheError::TransientRemote(e.to_string()))
            }
            Ok(Err(e)) => Err(CacheError::TransientRemote(format!(
                "server replied with error: {}",
                e
            ))),
            Err(_) => {
                let cause = format!("timed out after {:?}", timeout);
                self.connection_lost(live.generation, &cause);
                Err(CacheError::TransientRemote(cause))
            }
        }
    }

    fn connection_lost(&self, generation: u64, cause: &str) {
        {
            let mut slot = self.shared.connection();
            match slot.as_ref() {
                Some(live) if live.generation == generation => *slot = None,
                _ => return,
            }
        }

        let (before, after) = self.shared.apply(StateEvent::TransportLost);
        if !(before.is_ready() && matches!(after, ConnectionState::Reconnecting { .. })) {
            return;
        }

        warn!(
            endpoint = %self.shared.endpoint,
            error = %cause,
            "Lost connection to remote tier, reconnecting"
        );

        let task = tokio::spawn(reconnect_loop(Arc::clone(&self.shared)));
        let previous = self
            .shared
            .reconnect_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn abort_reconnect(&self) {
        let task = self
            .shared
            .reconnect_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Counts a failed call against the remote error counter.
    fn tally<T>(&self, result: CacheResult<T>) -> CacheResult<T> {
        if result.is_err() {
            self.shared.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        self.abort_reconnect();
    }
}

async fn reconnect_loop(shared: Arc<Shared>) {
    loop {
        let attempt = match shared.state() {
            ConnectionState::Reconnecting { attempt } => attempt + 1,
            _ => return,
        };

        let delay = shared.options.reconnect.delay(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
        tokio::time::sleep(delay).await;

        match shared.open().await {
            Ok(conn) => {
                if shared.install(conn).is_ready() {
                    info!(endpoint = %shared.endpoint, attempt, "Reconnected to remote tier");
                }
                return;
            }
            Err(e) => {
                let (_, after) = shared.apply(StateEvent::AttemptFailed);
                if after.is_failed() {
                    error!(
                        endpoint = %shared.endpoint,
                        attempts = attempt,
                        error = %e,
                        "Giving up on remote tier"
                    );
                    return;
                }
                warn!(attempt, error = %e, "Reconnect attempt failed");
            }
        }
    }
}

/// True when the error means the connection itself is gone.
fn is_transport(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

fn expiry_seconds(ttl: Duration) -> u64 {
    let seconds = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    seconds.max(1)
}
