//! Background Expiry Sweeper
//!
//! This module implements a background task that periodically removes expired
//! entries from the local tier. This is "active expiry" as opposed to the
//! "lazy expiry" that happens on access.
//!
//! ## Why Do We Need This?
//!
//! Lazy expiry is cheap but an entry that expires and is never read again would
//! stay in memory forever. The sweeper reclaims those entries on a schedule.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Computes the next run from its [`Schedule`]
//! 2. Sleeps until then (or until it is told to stop)
//! 3. Invokes the cleanup hook of its [`Sweep`] target
//! 4. Logs what was removed
//!
//! Only a cache without an active remote tier runs a sweeper; see
//! [`TieredCache`](crate::cache::TieredCache).

use crate::storage::{LocalStore, Schedule};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

/// Something the sweeper can clean.
pub trait Sweep: Send + Sync + 'static {
    /// Removes expired entries and returns how many were removed.
    fn cleanup_expired(&self) -> u64;
}

impl<V: Send + Sync + 'static> Sweep for LocalStore<V> {
    fn cleanup_expired(&self) -> u64 {
        self.sweep()
    }
}

/// What [`ExpirySweeper::status`] reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweeperStatus {
    /// Whether the sweeper is running
    pub enabled: bool,
    /// The configured schedule
    pub schedule: String,
    /// Estimated next run, if running
    pub next_run: Option<DateTime<Utc>>,
}

/// A handle to the expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
pub struct ExpirySweeper {
    target: Arc<dyn Sweep>,
    schedule: Schedule,
    /// Sender to signal shutdown; `Some` while running
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl std::fmt::Debug for ExpirySweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirySweeper")
            .field("schedule", &self.schedule.to_string())
            .field("running", &self.is_running())
            .finish()
    }
}

impl ExpirySweeper {
    /// Creates a sweeper for `target` without starting it.
    pub fn new(target: Arc<dyn Sweep>, schedule: Schedule) -> Self {
        Self {
            target,
            schedule,
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Creates a sweeper and starts it immediately.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use cacheflow::storage::{ExpirySweeper, LocalStore, Schedule};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let store = Arc::new(LocalStore::<String>::new());
    /// let sweeper = ExpirySweeper::start_new(store, Schedule::every(Duration::from_secs(1)));
    ///
    /// // Sweeper runs in the background...
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start_new(target: Arc<dyn Sweep>, schedule: Schedule) -> Self {
        let sweeper = Self::new(target, schedule);
        sweeper.start();
        sweeper
    }

    /// Starts the background task. Does nothing if it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut guard = self.shutdown_tx.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(sweeper_loop(
            Arc::clone(&self.target),
            self.schedule.clone(),
            shutdown_rx,
        ));
        *guard = Some(shutdown_tx);

        info!(schedule = %self.schedule, "Expiry sweeper started");
    }

    /// Stops the background task. Safe to call repeatedly.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let tx = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(tx) = tx {
            let _ = tx.send(true);
            info!("Expiry sweeper stopped");
        }
    }

    /// Returns true while the background task is running.
    pub fn is_running(&self) -> bool {
        self.shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Reports whether the sweeper runs, its schedule and when it runs next.
    pub fn status(&self) -> SweeperStatus {
        let enabled = self.is_running();
        SweeperStatus {
            enabled,
            schedule: self.schedule.to_string(),
            next_run: if enabled {
                self.schedule.next_after(Utc::now())
            } else {
                None
            },
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    target: Arc<dyn Sweep>,
    schedule: Schedule,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let delay = match schedule.delay_from(Utc::now()) {
            Some(delay) => delay,
            None => {
                info!(schedule = %schedule, "Schedule has no future runs, sweeper exiting");
                return;
            }
        };

        // Wait for the next run or the shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        debug!("Running expiry sweep");
        let cleaned = target.cleanup_expired();

        if cleaned == 0 {
            debug!("No expired entries found");
        } else {
            info!(cleaned, "Expired entries cleaned up");
        }
    }
}
