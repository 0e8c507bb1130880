//! The tiered cache orchestrator.

use crate::cache::stats::{CacheMode, CacheStats, GlobalCounters};
use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::remote::{RemoteStore, RemoteStats};
use crate::storage::{ExpirySweeper, LocalStore, Schedule, Sweep, SweeperStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Values the cache can hold: cloneable for the local tier, JSON-encodable
/// for the remote tier.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// State shared with the sweeper task.
struct CacheCore<V> {
    local: LocalStore<V>,
    remote: Option<RemoteStore>,
    default_ttl: Duration,
    counters: GlobalCounters,
}

impl<V> CacheCore<V> {
    /// The remote tier, unless absent or permanently failed.
    fn active_remote(&self) -> Option<&RemoteStore> {
        self.remote.as_ref().filter(|r| r.state().is_available())
    }
}

impl<V: Send + Sync + 'static> Sweep for CacheCore<V> {
    fn cleanup_expired(&self) -> u64 {
        self.local.sweep()
    }
}

/// A two-tier cache: a shared remote tier in front of a per-process local tier.
///
/// Reads prefer the remote tier and hydrate the local one; writes go to both.
/// Any remote failure falls back to the local tier, so reads and deletes never
/// fail and writes only fail when a value cannot be encoded.
///
/// # Example
///
/// ```
/// use cacheflow::cache::TieredCache;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let cache = TieredCache::<String>::local_only(Duration::from_secs(60));
///
/// cache.set("greeting", "hello".to_string(), None).await.unwrap();
/// assert_eq!(cache.get("greeting").await, Some("hello".to_string()));
/// # });
/// ```
pub struct TieredCache<V> {
    core: Arc<CacheCore<V>>,
    sweeper: Option<ExpirySweeper>,
    sweeper_schedule: String,
    shut_down: AtomicBool,
}

impl<V> std::fmt::Debug for TieredCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("local", &self.core.local)
            .field("remote", &self.core.remote)
            .field("sweeper", &self.sweeper)
            .finish()
    }
}

impl<V: CacheValue> TieredCache<V> {
    /// Builds a cache from `config`.
    ///
    /// An invalid config is an error. A remote tier that cannot be reached is
    /// not: connecting is retried with the reconnect policy, and if that runs
    /// out the cache logs it and runs local-only for the rest of its life.
    /// Must be called from within a Tokio runtime.
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;

        let remote = if config.remote_enabled {
            let store = RemoteStore::new(config.endpoint()?, config.remote.clone());
            match store.connect().await {
                Ok(()) => {
                    info!(endpoint = %store.endpoint(), "Remote tier active");
                    Some(store)
                }
                Err(e) => {
                    error!(error = %e, "Remote tier unavailable, running local-only");
                    None
                }
            }
        } else {
            info!("Remote tier disabled, running local-only");
            None
        };

        let core = Arc::new(CacheCore {
            local: LocalStore::new(),
            remote,
            default_ttl: config.default_ttl,
            counters: GlobalCounters::default(),
        });

        let sweeper = if config.sweeper_enabled && core.remote.is_none() {
            let schedule: Schedule = config.schedule()?;
            Some(ExpirySweeper::start_new(core.clone(), schedule))
        } else {
            debug!(
                sweeper_enabled = config.sweeper_enabled,
                remote_active = core.remote.is_some(),
                "Expiry sweeper not started"
            );
            None
        };

        let cache = Self {
            core,
            sweeper,
            sweeper_schedule: config.sweeper_schedule,
            shut_down: AtomicBool::new(false),
        };

        info!(
            mode = %cache.mode(),
            default_ttl_secs = config.default_ttl.as_secs(),
            "Cache initialized"
        );
        Ok(cache)
    }

    /// A local-only cache without a sweeper. Needs no runtime to construct.
    pub fn local_only(default_ttl: Duration) -> Self {
        Self {
            core: Arc::new(CacheCore {
                local: LocalStore::new(),
                remote: None,
                default_ttl,
                counters: GlobalCounters::default(),
            }),
            sweeper: None,
            sweeper_schedule: String::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Looks `key` up, remote tier first.
    ///
    /// A remote hit is copied into the local tier with the default TTL.
    /// A remote error is logged and the local tier answers instead.
    pub async fn get(&self, key: &str) -> Option<V> {
        let core = &*self.core;
        GlobalCounters::bump(&core.counters.total_requests);

        if let Some(remote) = core.remote.as_ref().filter(|r| r.is_ready()) {
            match remote.get::<V>(key).await {
                Ok(Some(value)) => {
                    GlobalCounters::bump(&core.counters.remote_hits);
                    core.local.set(key, value.clone(), core.default_ttl);
                    debug!(key = %key, "Remote hit, local tier hydrated");
                    return Some(value);
                }
                Ok(None) => GlobalCounters::bump(&core.counters.remote_misses),
                Err(e) => {
                    GlobalCounters::bump(&core.counters.remote_errors);
                    warn!(key = %key, error = %e, "Remote get failed, falling back to local tier");
                }
            }
        }

        match core.local.get(key) {
            Some(value) => {
                GlobalCounters::bump(&core.counters.local_hits);
                Some(value)
            }
            None => {
                GlobalCounters::bump(&core.counters.local_misses);
                None
            }
        }
    }

    /// Stores `value` in both tiers with `ttl`, or the default TTL.
    ///
    /// The local write always happens first. A remote outage is logged and
    /// ignored. If the value cannot be encoded the error is returned, and the
    /// local tier keeps the value anyway.
    pub async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> CacheResult<()> {
        let core = &*self.core;
        let ttl = ttl.unwrap_or(core.default_ttl);

        let Some(remote) = core.active_remote() else {
            core.local.set(key, value, ttl);
            return Ok(());
        };

        core.local.set(key, value.clone(), ttl);
        match remote.set(key, &value, ttl).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_remote_failure() => {
                warn!(key = %key, error = %e, "Remote set failed, value kept locally");
                Ok(())
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Value cannot be encoded for the remote tier");
                Err(e)
            }
        }
    }

    /// Removes `key` from both tiers. True if either tier had it.
    pub async fn delete(&self, key: &str) -> bool {
        let core = &*self.core;
        let mut deleted = core.local.delete(key);

        if let Some(remote) = core.active_remote() {
            match remote.delete(key).await {
                Ok(existed) => deleted |= existed,
                Err(e) => warn!(key = %key, error = %e, "Remote delete failed"),
            }
        }

        deleted
    }

    /// Returns the cached value, or runs `fetch` and caches what it returns.
    ///
    /// A `fetch` error is returned untouched and nothing is cached. Concurrent
    /// misses on the same key each run their own `fetch`.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F, ttl: Option<Duration>) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        debug!(key = %key, "Cache miss, fetching");
        let value = fetch().await?;

        if let Err(e) = self.set(key, value.clone(), ttl).await {
            warn!(key = %key, error = %e, "Fetched value was not cached remotely");
        }
        Ok(value)
    }

    /// Removes expired entries from the local tier.
    pub fn cleanup_expired(&self) -> u64 {
        let cleaned = self.core.local.sweep();
        if cleaned > 0 {
            info!(cleaned, "Expired entries cleaned up");
        }
        cleaned
    }

    /// Empties both tiers.
    pub async fn clear(&self) {
        let cleared = self.core.local.clear();
        if let Some(remote) = self.core.active_remote() {
            if let Err(e) = remote.flush().await {
                warn!(error = %e, "Remote flush failed");
            }
        }
        info!(cleared, "Cache cleared");
    }

    /// Snapshot of the counters of both tiers and the current mode.
    pub async fn stats(&self) -> CacheStats {
        let remote: Option<RemoteStats> = match self.core.active_remote() {
            Some(remote) => Some(remote.stats().await),
            None => None,
        };

        CacheStats {
            mode: self.mode(),
            global: self.core.counters.snapshot(),
            local: self.core.local.stats(),
            remote,
        }
    }
}

impl<V> TieredCache<V> {
    /// Whether a remote tier is currently in use.
    pub fn mode(&self) -> CacheMode {
        if self.core.active_remote().is_some() {
            CacheMode::RemoteAndLocal
        } else {
            CacheMode::LocalOnly
        }
    }

    /// Direct access to the local tier.
    pub fn local(&self) -> &LocalStore<V> {
        &self.core.local
    }

    /// The remote tier, if one connected at startup.
    pub fn remote(&self) -> Option<&RemoteStore> {
        self.core.remote.as_ref()
    }

    /// TTL applied when a write names none.
    pub fn default_ttl(&self) -> Duration {
        self.core.default_ttl
    }

    /// State of the expiry sweeper; disabled when none was started.
    pub fn sweeper_status(&self) -> SweeperStatus {
        match &self.sweeper {
            Some(sweeper) => sweeper.status(),
            None => SweeperStatus {
                enabled: false,
                schedule: self.sweeper_schedule.clone(),
                next_run: None,
            },
        }
    }

    /// Stops the sweeper, then closes the remote connection. Safe to call
    /// repeatedly; the local tier stays usable afterwards.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(sweeper) = &self.sweeper {
            sweeper.stop();
        }
        if let Some(remote) = &self.core.remote {
            remote.disconnect().await;
        }

        info!("Cache shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::remote::{ReconnectPolicy, RemoteOptions};
    use crate::testing::FakeRemote;
    use serde::{Deserialize, Serializer};
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;

    fn fast_remote(url: &str) -> CacheConfig {
        CacheConfig {
            remote: RemoteOptions {
                connect_timeout: Duration::from_millis(500),
                command_timeout: Duration::from_millis(200),
                reconnect: ReconnectPolicy {
                    step: Duration::from_millis(10),
                    cap: Duration::from_millis(20),
                    max_attempts: 3,
                },
            },
            ..CacheConfig::with_remote(url)
        }
    }

    /// Encodes only when `ok` is true.
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Flaky {
        ok: bool,
    }

    impl Serialize for Flaky {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            use serde::ser::{Error, SerializeStruct};
            if !self.ok {
                return Err(S::Error::custom("refusing to encode"));
            }
            let mut state = serializer.serialize_struct("Flaky", 1)?;
            state.serialize_field("ok", &true)?;
            state.end()
        }
    }

    #[test]
    fn test_local_only_without_runtime() {
        let cache = TieredCache::<Value>::local_only(Duration::from_secs(60));
        tokio_test::block_on(async {
            cache.set("k", json!({"x": 1}), None).await.unwrap();
            assert_eq!(cache.get("k").await, Some(json!({"x": 1})));
            assert_eq!(cache.get("missing").await, None);
        });

        assert_eq!(cache.mode(), CacheMode::LocalOnly);
        assert!(!cache.sweeper_status().enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_evicted_on_read() {
        let cache = TieredCache::<Value>::local_only(Duration::from_secs(60));
        cache
            .set("a", json!({"x": 1}), Some(Duration::from_secs(1)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert_eq!(cache.get("a").await, None);
        let stats = cache.stats().await;
        assert_eq!(stats.local.misses, 1);
        assert_eq!(stats.local.evictions, 1);
        assert_eq!(stats.global.local_misses, 1);
        assert_eq!(stats.global.total_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_applies() {
        let cache = TieredCache::<u32>::local_only(Duration::from_secs(10));
        cache.set("n", 7, None).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("n").await, Some(7));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("n").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_is_never_returned() {
        let cache = TieredCache::<u32>::local_only(Duration::from_secs(10));
        cache.set("n", 7, Some(Duration::ZERO)).await.unwrap();
        assert_eq!(cache.get("n").await, None);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let cache = TieredCache::<u32>::local_only(Duration::from_secs(10));
        assert!(!cache.delete("absent").await);

        cache.set("present", 1, None).await.unwrap();
        assert!(cache.delete("present").await);
        assert_eq!(cache.get("present").await, None);
    }

    #[tokio::test]
    async fn test_get_or_fetch_runs_fetch_once() {
        let cache = TieredCache::<Value>::local_only(Duration::from_secs(60));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let first = cache
            .get_or_fetch(
                "b",
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(json!(42))
                },
                Some(Duration::from_secs(60)),
            )
            .await;
        assert_eq!(first, Ok(json!(42)));

        let second = cache
            .get_or_fetch(
                "b",
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(json!(99))
                },
                Some(Duration::from_secs(60)),
            )
            .await;
        assert_eq!(second, Ok(json!(42)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_error_propagates_and_caches_nothing() {
        let cache = TieredCache::<Value>::local_only(Duration::from_secs(60));

        let result = cache
            .get_or_fetch("k", || async { Err::<Value, _>("backend down") }, None)
            .await;
        assert_eq!(result, Err("backend down"));
        assert_eq!(cache.local().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_counts_exactly() {
        let cache = TieredCache::<u32>::local_only(Duration::from_secs(60));
        for i in 0..5 {
            cache.set(&format!("short:{i}"), i, Some(Duration::from_secs(1))).await.unwrap();
        }
        for i in 0..3 {
            cache.set(&format!("long:{i}"), i, None).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.cleanup_expired(), 5);
        assert_eq!(cache.cleanup_expired(), 0);
        assert_eq!(cache.local().len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = CacheConfig {
            default_ttl: Duration::ZERO,
            ..CacheConfig::default()
        };
        let err = TieredCache::<Value>::new(config).await.unwrap_err();
        assert!(matches!(err, CacheError::Validation(_)));
    }

    #[tokio::test]
    async fn test_local_config_starts_sweeper() {
        let cache = TieredCache::<Value>::new(CacheConfig::default()).await.unwrap();
        let status = cache.sweeper_status();
        assert!(status.enabled);
        assert_eq!(status.schedule, "*/1 * * * *");
        assert!(status.next_run.is_some());

        cache.shutdown().await;
        assert!(!cache.sweeper_status().enabled);
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_unreachable_remote_downgrades_to_local() {
        let server = FakeRemote::start().await;
        let url = server.url();
        server.shutdown().await;

        let cache = TieredCache::<Value>::new(fast_remote(&url)).await.unwrap();
        assert_eq!(cache.mode(), CacheMode::LocalOnly);
        assert!(cache.sweeper_status().enabled);

        cache.set("k", json!(1), None).await.unwrap();
        assert_eq!(cache.get("k").await, Some(json!(1)));
        assert!(cache.stats().await.remote.is_none());
    }

    #[tokio::test]
    async fn test_remote_mode_writes_both_tiers() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Value>::new(fast_remote(&server.url())).await.unwrap();
        assert_eq!(cache.mode(), CacheMode::RemoteAndLocal);
        assert!(!cache.sweeper_status().enabled);

        cache
            .set("user:1", json!({"name": "alice"}), Some(Duration::from_secs(90)))
            .await
            .unwrap();

        assert_eq!(server.raw("user:1").as_deref(), Some(r#"{"name":"alice"}"#));
        assert_eq!(server.commands().last().unwrap()[4], "90");
        assert!(cache.local().get("user:1").is_some());
    }

    #[tokio::test]
    async fn test_remote_hit_hydrates_local_with_default_ttl() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Value>::new(fast_remote(&server.url())).await.unwrap();
        server.insert_raw("shared", r#"{"from":"peer"}"#);

        assert_eq!(cache.get("shared").await, Some(json!({"from": "peer"})));

        let remaining = cache.local().remaining_ttl("shared").unwrap();
        assert!(remaining > Duration::from_secs(3590));

        let stats = cache.stats().await;
        assert_eq!(stats.global.remote_hits, 1);
        assert_eq!(stats.global.total_requests, 1);
        assert_eq!(stats.global.local_hits + stats.global.local_misses, 0);
    }

    #[tokio::test]
    async fn test_remote_is_source_of_truth_after_local_clear() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Value>::new(fast_remote(&server.url())).await.unwrap();
        cache.set("k", json!({"v": 1}), None).await.unwrap();

        cache.local().clear();
        assert_eq!(cache.get("k").await, Some(json!({"v": 1})));
        assert!(cache.local().get("k").is_some());
    }

    #[tokio::test]
    async fn test_remote_miss_falls_through_to_local() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Value>::new(fast_remote(&server.url())).await.unwrap();

        assert_eq!(cache.get("nowhere").await, None);
        let global = cache.stats().await.global;
        assert_eq!(global.remote_misses, 1);
        assert_eq!(global.local_misses, 1);
        assert_eq!(global.total_requests, 1);
    }

    #[tokio::test]
    async fn test_remote_errors_fall_back_without_disabling() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Value>::new(fast_remote(&server.url())).await.unwrap();
        cache.set("k", json!("v"), None).await.unwrap();

        server.fail_commands(true);
        assert_eq!(cache.get("k").await, Some(json!("v")));
        cache.set("k2", json!("v2"), None).await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.global.remote_errors, 1);
        assert_eq!(stats.global.local_hits, 1);
        assert_eq!(stats.mode, CacheMode::RemoteAndLocal);

        server.fail_commands(false);
        assert_eq!(cache.get("k").await, Some(json!("v")));
        assert_eq!(cache.stats().await.global.remote_hits, 1);
    }

    #[tokio::test]
    async fn test_failed_remote_is_treated_as_absent() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Value>::new(fast_remote(&server.url())).await.unwrap();
        cache.set("k", json!(1), None).await.unwrap();

        server.shutdown().await;
        assert_eq!(cache.get("k").await, Some(json!(1)));

        for _ in 0..200 {
            if cache.mode() == CacheMode::LocalOnly {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(cache.mode(), CacheMode::LocalOnly);
        assert_eq!(cache.get("k").await, Some(json!(1)));
        assert!(cache.delete("k").await);
    }

    #[tokio::test]
    async fn test_delete_is_or_of_both_tiers() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Value>::new(fast_remote(&server.url())).await.unwrap();

        server.insert_raw("remote-only", "1");
        assert!(cache.delete("remote-only").await);
        assert!(server.raw("remote-only").is_none());
        assert!(!cache.delete("remote-only").await);
    }

    #[tokio::test]
    async fn test_encoding_failure_surfaces_from_set_only() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Flaky>::new(fast_remote(&server.url())).await.unwrap();

        let err = cache.set("k", Flaky { ok: false }, None).await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
        assert_eq!(cache.local().get("k"), Some(Flaky { ok: false }));

        let fetched = cache
            .get_or_fetch("k2", || async { Ok::<_, ()>(Flaky { ok: false }) }, None)
            .await;
        assert_eq!(fetched, Ok(Flaky { ok: false }));
    }

    #[tokio::test]
    async fn test_clear_empties_both_tiers() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Value>::new(fast_remote(&server.url())).await.unwrap();
        cache.set("a", json!(1), None).await.unwrap();

        cache.clear().await;
        assert!(cache.local().is_empty());
        assert!(server.raw("a").is_none());
    }

    #[tokio::test]
    async fn test_shutdown_releases_remote() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Value>::new(fast_remote(&server.url())).await.unwrap();

        cache.shutdown().await;
        assert_eq!(cache.mode(), CacheMode::LocalOnly);
        assert_eq!(server.commands().last().unwrap()[0], "QUIT");

        cache.shutdown().await;
        cache.set("k", json!(1), None).await.unwrap();
        assert_eq!(cache.get("k").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_stats_json() {
        let server = FakeRemote::start().await;
        let cache = TieredCache::<Value>::new(fast_remote(&server.url())).await.unwrap();
        cache.set("a", json!(1), None).await.unwrap();
        cache.get("a").await;

        let value = serde_json::to_value(cache.stats().await).unwrap();
        assert_eq!(value["mode"], json!("remote+local"));
        assert_eq!(value["global"]["remoteHits"], json!(1));
        assert_eq!(value["remote"]["entries"], json!(1));
        assert_eq!(value["remote"]["connected"], json!(true));
    }

    #[tokio::test]
    async fn test_remote_that_starts_late_is_still_used() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let url = format!("redis://{}", addr);
        let late = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            FakeRemote::start_on(addr).await
        });

        let config = CacheConfig {
            remote: RemoteOptions {
                reconnect: ReconnectPolicy::default(),
                ..fast_remote(&url).remote
            },
            ..fast_remote(&url)
        };
        let cache = TieredCache::<Value>::new(config).await.unwrap();
        assert_eq!(cache.mode(), CacheMode::RemoteAndLocal);
        assert!(!cache.sweeper_status().enabled);

        let server = late.await.unwrap();
        cache.set("k", json!("v"), None).await.unwrap();
        assert_eq!(server.raw("k").as_deref(), Some(r#""v""#));
    }

    #[tokio::test]
    async fn test_abandoned_get_cannot_answer_another_key() {
        let server = FakeRemote::start().await;
        let config = CacheConfig {
            remote: RemoteOptions {
                command_timeout: Duration::from_secs(1),
                ..fast_remote(&server.url()).remote
            },
            ..fast_remote(&server.url())
        };
        let cache = TieredCache::<Value>::new(config).await.unwrap();

        server.insert_raw("a", r#""value-of-a""#);
        server.insert_raw("b", r#""value-of-b""#);
        server.delay_gets(Duration::from_millis(100));

        let abandoned = tokio::time::timeout(Duration::from_millis(20), cache.get("a")).await;
        assert!(abandoned.is_err());

        assert_eq!(cache.get("b").await, Some(json!("value-of-b")));
        assert_eq!(cache.local().get("b"), Some(json!("value-of-b")));
        assert_eq!(cache.local().get("a"), None);
    }
}
