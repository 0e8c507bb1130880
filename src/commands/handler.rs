//! Front Door Commands
//!
//! Maps RESP commands onto a [`TieredCache`] of JSON values. A `SET` payload
//! that parses as JSON is stored as that JSON value; anything else is stored
//! as a JSON string. `GET` always answers with the JSON encoding, which is
//! the same wire format [`RemoteStore`](crate::remote::RemoteStore) uses, so a
//! cacheflow server can act as another cacheflow's remote tier.
//!
//! ## Supported Commands
//!
//! - `GET key`
//! - `SET key value [EX seconds | PX milliseconds]`
//! - `SETEX key seconds value`
//! - `DEL key [key ...]`
//! - `TTL key` - remaining seconds in the local tier
//! - `PING [message]`, `ECHO message`
//! - `DBSIZE`, `FLUSHDB`, `FLUSHALL`
//! - `INFO` - cache, sweeper and connection statistics as JSON
//! - `SWEEP` - run expiry cleanup now, returns the count removed
//! - `SELECT 0`, `AUTH`, `COMMAND`, `QUIT` for client compatibility

use crate::cache::TieredCache;
use crate::connection::ConnectionStats;
use crate::protocol::RespValue;
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Executes front door commands against a shared cache.
#[derive(Clone)]
pub struct CommandHandler {
    cache: Arc<TieredCache<Value>>,
    connections: Arc<ConnectionStats>,
    /// Server start time for INFO
    start_time: Instant,
}

impl CommandHandler {
    pub fn new(cache: Arc<TieredCache<Value>>, connections: Arc<ConnectionStats>) -> Self {
        Self {
            cache,
            connections,
            start_time: Instant::now(),
        }
    }

    /// True if `command` is a `QUIT`, after which the connection closes.
    pub fn is_quit(command: &RespValue) -> bool {
        match command {
            RespValue::Array(args) => args
                .first()
                .and_then(RespValue::as_str)
                .is_some_and(|name| name.eq_ignore_ascii_case("QUIT")),
            _ => false,
        }
    }

    /// Executes a command and returns the reply.
    pub async fn execute(&self, command: RespValue) -> RespValue {
        let args = match command {
            RespValue::Array(args) if !args.is_empty() => args,
            RespValue::Array(_) => return RespValue::error("ERR empty command"),
            _ => return RespValue::error("ERR invalid command format"),
        };

        let name = match args[0].as_str() {
            Some(name) => name.to_uppercase(),
            None => return RespValue::error("ERR invalid command name"),
        };

        debug!(command = %name, argc = args.len() - 1, "Executing command");
        self.dispatch(&name, &args[1..]).await
    }

    async fn dispatch(&self, cmd: &str, args: &[RespValue]) -> RespValue {
        match cmd {
            "GET" => self.cmd_get(args).await,
            "SET" => self.cmd_set(args).await,
            "SETEX" => self.cmd_setex(args).await,
            "DEL" => self.cmd_del(args).await,
            "TTL" => self.cmd_ttl(args),

            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "DBSIZE" => RespValue::integer(self.cache.local().len() as i64),
            "FLUSHDB" | "FLUSHALL" => {
                self.cache.clear().await;
                RespValue::ok()
            }
            "INFO" => self.cmd_info().await,
            "SWEEP" => RespValue::integer(self.cache.cleanup_expired() as i64),
            "SELECT" => self.cmd_select(args),
            "AUTH" => RespValue::error("ERR AUTH called without any password configured"),
            "COMMAND" => RespValue::array(vec![]),
            "CLIENT" => self.cmd_client(args),
            "QUIT" => RespValue::ok(),

            _ => RespValue::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Cache Commands
    // ========================================================================

    /// GET key
    async fn cmd_get(&self, args: &[RespValue]) -> RespValue {
        let [key] = args else {
            return wrong_arity("GET");
        };
        let Some(key) = key.as_str() else {
            return RespValue::error("ERR invalid key");
        };

        match self.cache.get(key).await {
            Some(value) => match serde_json::to_vec(&value) {
                Ok(payload) => RespValue::bulk_string(payload),
                Err(e) => RespValue::error(format!("ERR cannot encode value: {}", e)),
            },
            None => RespValue::null(),
        }
    }

    /// SET key value [EX seconds | PX milliseconds]
    async fn cmd_set(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return wrong_arity("SET");
        }

        let mut ttl = None;
        let mut options = args[2..].iter();
        while let Some(option) = options.next() {
            let option = option.as_str().unwrap_or_default().to_uppercase();
            let amount = options.next().and_then(RespValue::as_integer);
            ttl = match (option.as_str(), amount) {
                ("EX", Some(secs)) if secs > 0 => Some(Duration::from_secs(secs as u64)),
                ("PX", Some(ms)) if ms > 0 => Some(Duration::from_millis(ms as u64)),
                ("EX" | "PX", _) => return RespValue::error("ERR invalid expire time in 'set' command"),
                _ => return RespValue::error("ERR syntax error"),
            };
        }

        self.store(&args[0], &args[1], ttl).await
    }

    /// SETEX key seconds value
    async fn cmd_setex(&self, args: &[RespValue]) -> RespValue {
        let [key, seconds, value] = args else {
            return wrong_arity("SETEX");
        };
        match seconds.as_integer() {
            Some(secs) if secs > 0 => {
                self.store(key, value, Some(Duration::from_secs(secs as u64)))
                    .await
            }
            _ => RespValue::error("ERR invalid expire time in 'setex' command"),
        }
    }

    async fn store(&self, key: &RespValue, value: &RespValue, ttl: Option<Duration>) -> RespValue {
        let Some(key) = key.as_str() else {
            return RespValue::error("ERR invalid key");
        };
        let Some(payload) = value.as_bytes() else {
            return RespValue::error("ERR invalid value");
        };

        match self.cache.set(key, decode_payload(payload), ttl).await {
            Ok(()) => RespValue::ok(),
            Err(e) => RespValue::error(format!("ERR {}", e)),
        }
    }

    /// DEL key [key ...]
    async fn cmd_del(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() {
            return wrong_arity("DEL");
        }

        let mut deleted = 0;
        for key in args.iter().filter_map(RespValue::as_str) {
            if self.cache.delete(key).await {
                deleted += 1;
            }
        }
        RespValue::integer(deleted)
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[RespValue]) -> RespValue {
        let [key] = args else {
            return wrong_arity("TTL");
        };

        match key.as_str().and_then(|k| self.cache.local().remaining_ttl(k)) {
            // Round up so a live key never reports 0
            Some(remaining) => {
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                RespValue::integer(secs as i64)
            }
            None => RespValue::integer(-2),
        }
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[RespValue]) -> RespValue {
        match args.first().and_then(RespValue::as_bytes) {
            Some(msg) => RespValue::bulk_string(Bytes::copy_from_slice(msg)),
            None => RespValue::pong(),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[RespValue]) -> RespValue {
        match args {
            [msg] => match msg.as_bytes() {
                Some(msg) => RespValue::bulk_string(Bytes::copy_from_slice(msg)),
                None => RespValue::error("ERR invalid message"),
            },
            _ => wrong_arity("ECHO"),
        }
    }

    /// INFO
    async fn cmd_info(&self) -> RespValue {
        let info = json!({
            "version": crate::VERSION,
            "uptimeSeconds": self.start_time.elapsed().as_secs(),
            "cache": self.cache.stats().await,
            "sweeper": self.cache.sweeper_status(),
            "connections": self.connections.snapshot(),
        });

        match serde_json::to_vec_pretty(&info) {
            Ok(body) => RespValue::bulk_string(body),
            Err(e) => RespValue::error(format!("ERR cannot encode stats: {}", e)),
        }
    }

    /// SELECT index (only database 0 exists)
    fn cmd_select(&self, args: &[RespValue]) -> RespValue {
        match args {
            [db] if db.as_integer() == Some(0) => RespValue::ok(),
            [_] => RespValue::error("ERR DB index is out of range"),
            _ => wrong_arity("SELECT"),
        }
    }

    /// CLIENT SETNAME | SETINFO, accepted so Redis client libraries can connect
    fn cmd_client(&self, args: &[RespValue]) -> RespValue {
        let sub = args.first().and_then(RespValue::as_str).map(str::to_uppercase);
        match sub.as_deref() {
            Some("SETNAME") | Some("SETINFO") => RespValue::ok(),
            Some(other) => RespValue::error(format!("ERR unknown subcommand '{}'", other)),
            None => wrong_arity("CLIENT"),
        }
    }
}

/// Interprets a client payload: JSON if it parses, otherwise a JSON string.
fn decode_payload(payload: &[u8]) -> Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
}

fn wrong_arity(cmd: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd.to_lowercase()
    ))
}
