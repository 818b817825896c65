//! The engine façade: accepts submissions, wraps each in a result-producing
//! task, and owns the worker pool's lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{EngineError, EngineResult, TaskError};
use super::slot::{channel, Handle};
use super::task::{Job, Task, TaskId};
use super::worker_pool::{PoolStats, WorkerPool};
use crate::config::{EngineConfig, ShutdownMode};

/// A bounded task-execution engine.
///
/// Engines are ordinary values: construct as many as needed and hand them to
/// the components that use them. Dropping an engine shuts it down with the
/// configured [`ShutdownMode`] and joins its workers.
///
/// # Example
///
/// ```
/// use prometheus_task_engine::core::Engine;
///
/// let engine = Engine::new(2).unwrap();
/// let handle = engine.submit(|| Ok::<_, String>(6 * 7)).unwrap();
/// assert_eq!(handle.get(), Ok(42));
/// ```
pub struct Engine {
    /// Instance id used in log fields.
    id: Uuid,

    /// Engine configuration.
    config: EngineConfig,

    /// `false` once shutdown has begun. Submitters hold the read side across
    /// check-and-enqueue so nothing is enqueued after the queue closes.
    accepting: RwLock<bool>,

    /// Worker threads and their queue.
    pool: WorkerPool,

    /// Next submission id (lock-free atomic).
    next_task_id: AtomicU64,
}

impl Engine {
    /// Create an engine with `worker_count` workers and default settings.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidConfig` if `worker_count` is zero
    /// - `EngineError::Spawn` if a worker thread cannot be created
    pub fn new(worker_count: usize) -> EngineResult<Self> {
        Self::with_config(EngineConfig::new().with_worker_count(worker_count))
    }

    /// Create an engine from a full configuration.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidConfig` if the configuration is invalid
    /// - `EngineError::Spawn` if a worker thread cannot be created
    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        let pool = WorkerPool::new(&config)?;
        let id = Uuid::new_v4();
        info!(
            engine_id = %id,
            worker_count = config.worker_count,
            shutdown_mode = %config.shutdown_mode,
            "Engine started"
        );
        Ok(Self {
            id,
            config,
            accepting: RwLock::new(true),
            pool,
            next_task_id: AtomicU64::new(0),
        })
    }

    /// Submit work and return a handle to its eventual outcome.
    ///
    /// Never blocks on execution. Tasks enter the queue in submission order.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` if shutdown has begun; the work is dropped
    /// without running.
    pub fn submit<F, V, E>(&self, work: F) -> EngineResult<Handle<V, E>>
    where
        F: FnOnce() -> Result<V, E> + Send + 'static,
        V: Send + 'static,
        E: Send + 'static,
    {
        let accepting = self.accepting.read();
        if !*accepting {
            self.pool.record_rejection();
            warn!(engine_id = %self.id, "Submission rejected: engine is closed");
            return Err(EngineError::Closed);
        }

        let task_id: TaskId = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (promise, handle) = channel();
        self.pool.execute(Task::new(task_id, Job::new(work, promise)));
        drop(accepting);

        Ok(handle.with_task_id(task_id))
    }

    /// Run the task at the head of this engine's queue on the calling thread.
    ///
    /// Returns `false` without blocking if nothing is queued. Called from a
    /// non-worker thread this lends that thread to the engine for one task.
    pub fn run_pending_task(&self) -> bool {
        self.pool.run_pending()
    }

    /// Block until `handle` resolves, running queued tasks on this thread
    /// while its slot is pending.
    ///
    /// A task that waits on work it submitted to the same engine must use
    /// this rather than [`Handle::get`]: with every worker parked in `get`,
    /// nothing would be left to run the children. Recursive algorithms
    /// therefore stay within the worker count at any depth.
    ///
    /// # Errors
    ///
    /// As [`Handle::get`].
    pub fn get_helping<V, E>(&self, handle: Handle<V, E>) -> Result<V, TaskError<E>> {
        while handle.is_attached() && !handle.is_ready() {
            if !self.pool.run_pending() {
                // Queue empty: what we wait on is already running elsewhere.
                handle.wait();
                break;
            }
        }
        handle.get()
    }

    /// Stop accepting work and tell the workers to stop.
    ///
    /// Idempotent. A later `Abandon` escalates an earlier `Drain`, discarding
    /// whatever is still queued. Does not wait; see [`Engine::join`].
    pub fn shutdown(&self, mode: ShutdownMode) {
        {
            let mut accepting = self.accepting.write();
            if !*accepting && self.pool_mode_covers(mode) {
                debug!(engine_id = %self.id, mode = %mode, "Shutdown already in progress");
                return;
            }
            *accepting = false;
        }
        let discarded = self.pool.shutdown(mode);
        info!(engine_id = %self.id, mode = %mode, discarded = discarded, "Engine shutting down");
    }

    /// Block until every worker thread has terminated.
    ///
    /// Call after [`Engine::shutdown`]; joining an engine that is still
    /// accepting work blocks until another thread shuts it down. Safe to call
    /// repeatedly. From a task running on this engine it waits for the other
    /// workers only.
    pub fn join(&self) {
        self.pool.join();
    }

    /// [`Engine::shutdown`] followed by [`Engine::join`].
    pub fn shutdown_and_join(&self, mode: ShutdownMode) {
        self.shutdown(mode);
        self.join();
    }

    /// Whether shutdown has begun.
    pub fn is_closed(&self) -> bool {
        !*self.accepting.read()
    }

    /// Instance id used in log fields.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Configured number of worker threads.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn pool_mode_covers(&self, mode: ShutdownMode) -> bool {
        self.pool.stop_mode().is_some_and(|current| current >= mode)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.is_closed() {
            debug!(engine_id = %self.id, "Engine dropped without explicit shutdown");
        }
        self.shutdown(self.config.shutdown_mode);
        self.join();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .field("pool", &self.pool)
            .finish()
    }
}
