//! Pool of query/execution handles over a shared DuckDB instance.
//!
//! One in-process instance is created per pool, configured with a memory
//! limit, a worker thread count, and a spill directory. Handles are
//! additional connections to that same instance (`try_clone`), capped at
//! `max_connections`. `acquire` suspends when the pool is saturated and
//! fails with `AcquireTimeout` after the configured deadline. An idle
//! reaper closes all-but-one idle handle once they outlive
//! `idle_timeout_ms`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use duckdb::Connection;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::StoreConfig;
use crate::error::{DevacError, DevacResult};

/// A pooled handle to the shared store instance.
///
/// Handles must not be shared across task boundaries; acquire one per
/// task and release it when done.
#[derive(Debug)]
pub struct StoreHandle {
    conn: Connection,
    id: u64,
}

impl StoreHandle {
    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Pool-unique handle id, for logging.
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct IdleEntry {
    handle: StoreHandle,
    since: Instant,
}

struct PoolState {
    /// The shared instance. Kept open for the pool's lifetime so cloned
    /// handles always attach to the same database.
    root: Option<Connection>,
    idle: Vec<IdleEntry>,
    total: usize,
    next_id: u64,
    shut_down: bool,
}

struct PoolInner {
    config: StoreConfig,
    state: Mutex<PoolState>,
    available: Notify,
}

/// Process-wide pool of store handles.
#[derive(Clone)]
pub struct StorePool {
    inner: Arc<PoolInner>,
}

impl StorePool {
    /// Initialize the shared instance and an empty pool.
    pub fn new(config: &StoreConfig) -> DevacResult<Self> {
        std::fs::create_dir_all(&config.temp_directory)?;

        let root = Connection::open_in_memory()?;
        root.execute_batch(&format!(
            "SET memory_limit = '{}'; SET threads = {}; SET temp_directory = '{}';",
            config.memory_limit,
            config.threads.max(1),
            crate::schema::escape_path(&config.temp_directory),
        ))?;

        tracing::info!(
            memory_limit = %config.memory_limit,
            threads = config.threads,
            max_connections = config.max_connections,
            "store pool initialized"
        );

        let pool = Self {
            inner: Arc::new(PoolInner {
                config: config.clone(),
                state: Mutex::new(PoolState {
                    root: Some(root),
                    idle: Vec::new(),
                    total: 0,
                    next_id: 0,
                    shut_down: false,
                }),
                available: Notify::new(),
            }),
        };

        // The reaper needs a runtime; outside one (plain unit tests) the
        // pool still works, handles just aren't reaped.
        if tokio::runtime::Handle::try_current().is_ok() {
            pool.spawn_reaper();
        }

        Ok(pool)
    }

    /// Acquire a handle: an idle one if available, a fresh one while
    /// under `max_connections`, otherwise wait up to the acquire timeout.
    pub async fn acquire(&self) -> DevacResult<StoreHandle> {
        let timeout = Duration::from_millis(self.inner.config.acquire_timeout_ms);
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut state = self.inner.state.lock();
                if state.shut_down {
                    return Err(DevacError::PoolShutdown);
                }
                if let Some(entry) = state.idle.pop() {
                    return Ok(entry.handle);
                }
                if state.total < self.inner.config.max_connections {
                    let root = state
                        .root
                        .as_ref()
                        .ok_or(DevacError::PoolShutdown)?;
                    let conn = root.try_clone()?;
                    state.total += 1;
                    state.next_id += 1;
                    let id = state.next_id;
                    tracing::debug!(handle = id, total = state.total, "store handle created");
                    return Ok(StoreHandle { conn, id });
                }
            }

            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => {
                    return Err(DevacError::AcquireTimeout(
                        self.inner.config.acquire_timeout_ms,
                    ))
                }
            };

            if tokio::time::timeout(remaining, self.inner.available.notified())
                .await
                .is_err()
            {
                return Err(DevacError::AcquireTimeout(
                    self.inner.config.acquire_timeout_ms,
                ));
            }
        }
    }

    /// Return a handle to the pool, waking one waiter.
    pub fn release(&self, handle: StoreHandle) {
        let mut state = self.inner.state.lock();
        if state.shut_down {
            state.total = state.total.saturating_sub(1);
            return;
        }
        state.idle.push(IdleEntry { handle, since: Instant::now() });
        drop(state);
        self.inner.available.notify_one();
    }

    /// Close and discard a handle known to be in an unrecoverable state.
    /// Its pool slot is freed for a fresh handle.
    pub fn mark_failed(&self, handle: StoreHandle) {
        let id = handle.id();
        drop(handle);
        let mut state = self.inner.state.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        tracing::warn!(handle = id, "store handle discarded after fatal error");
        self.inner.available.notify_one();
    }

    /// Reject all waiters, close all handles, and tear down the shared
    /// instance. Subsequent `acquire` calls fail with `PoolShutdown`.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shut_down = true;
        let reclaimed = state.idle.len();
        state.total = state.total.saturating_sub(reclaimed);
        state.idle.clear();
        state.root = None;
        drop(state);
        self.inner.available.notify_waiters();
        tracing::info!("store pool shut down");
    }

    /// Count of idle handles (test hook).
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Spawn the periodic idle reaper.
    fn spawn_reaper(&self) {
        let inner = Arc::downgrade(&self.inner);
        let period = Duration::from_millis(self.inner.config.reap_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else { break };
                let idle_timeout = Duration::from_millis(inner.config.idle_timeout_ms);
                let mut state = inner.state.lock();
                if state.shut_down {
                    break;
                }
                // Keep one idle handle warm; close the rest once stale.
                let mut kept = Vec::new();
                let mut reaped = 0usize;
                for entry in state.idle.drain(..) {
                    if kept.is_empty() || entry.since.elapsed() < idle_timeout {
                        kept.push(entry);
                    } else {
                        reaped += 1;
                    }
                }
                state.idle = kept;
                state.total = state.total.saturating_sub(reaped);
                if reaped > 0 {
                    tracing::debug!(reaped, remaining = state.total, "idle handles reaped");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(max: usize, acquire_timeout_ms: u64) -> StoreConfig {
        StoreConfig {
            max_connections: max,
            acquire_timeout_ms,
            ..StoreConfig::default()
        }
    }

    #[tokio::test]
    async fn test_acquire_release_reuses_handles() {
        let pool = StorePool::new(&small_config(2, 1_000)).expect("pool");
        let a = pool.acquire().await.expect("acquire");
        let a_id = a.id();
        pool.release(a);
        let b = pool.acquire().await.expect("acquire");
        assert_eq!(b.id(), a_id, "idle handle is reused");
        pool.release(b);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_saturated() {
        let pool = StorePool::new(&small_config(1, 50)).expect("pool");
        let held = pool.acquire().await.expect("acquire");
        let err = pool.acquire().await.expect_err("should time out");
        assert!(matches!(err, DevacError::AcquireTimeout(_)));
        pool.release(held);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_waiter_is_fed_on_release() {
        let pool = StorePool::new(&small_config(1, 5_000)).expect("pool");
        let held = pool.acquire().await.expect("acquire");

        let waiter_pool = pool.clone();
        let waiter = tokio::spawn(async move { waiter_pool.acquire().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.release(held);

        let handle = waiter.await.expect("join").expect("acquire after release");
        pool.release(handle);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_rejects_acquire() {
        let pool = StorePool::new(&small_config(2, 100)).expect("pool");
        pool.shutdown();
        let err = pool.acquire().await.expect_err("shut down");
        assert!(matches!(err, DevacError::PoolShutdown));
    }

    #[tokio::test]
    async fn test_mark_failed_frees_a_slot() {
        let pool = StorePool::new(&small_config(1, 500)).expect("pool");
        let held = pool.acquire().await.expect("acquire");
        pool.mark_failed(held);
        // Slot freed: a fresh handle can be created immediately.
        let fresh = pool.acquire().await.expect("acquire after discard");
        pool.release(fresh);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_handles_share_one_database() {
        let pool = StorePool::new(&small_config(2, 1_000)).expect("pool");
        let a = pool.acquire().await.expect("acquire");
        a.connection()
            .execute_batch("CREATE TABLE shared_t (v INTEGER); INSERT INTO shared_t VALUES (5)")
            .expect("create");
        let b = pool.acquire().await.expect("acquire");
        let v: i64 = b
            .connection()
            .query_row("SELECT v FROM shared_t", [], |row| row.get(0))
            .expect("query");
        assert_eq!(v, 5);
        pool.release(a);
        pool.release(b);
        pool.shutdown();
    }
}
