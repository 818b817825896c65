//! Fixed-size pool of OS worker threads draining a shared [`TaskQueue`].
//!
//! Every worker runs the same loop: block in [`TaskQueue::pop`], run the task,
//! repeat until the queue reports `Stop`. A failing or panicking task never
//! takes its worker down with it.
//!
//! # Design Principles
//!
//! - **No polling**: idle workers sleep on the queue's `Condvar`
//! - **Bounded threads**: the worker count is fixed at construction, however
//!   many tasks are submitted
//! - **Clean shutdown**: closing the queue broadcasts to every idle worker;
//!   `join` then waits for each thread to exit

use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::error::{EngineError, EngineResult};
use super::queue::{Popped, TaskQueue};
use super::task::{RunOutcome, Task};
use crate::config::{EngineConfig, ShutdownMode};
use crate::util::panic_message;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Configured number of worker threads.
    pub worker_count: usize,

    /// Worker threads that have been spawned and not yet exited.
    pub live_workers: usize,

    /// Tasks currently executing.
    pub active_tasks: u64,

    /// Tasks waiting in the queue.
    pub queued_tasks: u64,

    /// Total tasks accepted.
    pub submitted_tasks: u64,

    /// Tasks that produced a value.
    pub completed_tasks: u64,

    /// Tasks whose work returned an error.
    pub failed_tasks: u64,

    /// Tasks whose work panicked.
    pub panicked_tasks: u64,

    /// Submissions refused because the engine was closed.
    pub rejected_tasks: u64,

    /// Queued tasks discarded by an abandoning shutdown.
    pub abandoned_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub panicked_tasks: AtomicU64,
    pub rejected_tasks: AtomicU64,
    pub abandoned_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize, live_workers: usize) -> PoolStats {
        PoolStats {
            worker_count,
            live_workers,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            panicked_tasks: self.panicked_tasks.load(Ordering::Relaxed),
            rejected_tasks: self.rejected_tasks.load(Ordering::Relaxed),
            abandoned_tasks: self.abandoned_tasks.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: RunOutcome) {
        let counter = match outcome {
            RunOutcome::Fulfilled => &self.completed_tasks,
            RunOutcome::Failed => &self.failed_tasks,
            RunOutcome::Panicked => &self.panicked_tasks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct LiveState {
    live: usize,
    /// Workers currently blocked in `join` on their own pool.
    joining: usize,
}

/// Live-worker count that `join` blocks on.
#[derive(Debug, Default)]
struct Liveness {
    state: Mutex<LiveState>,
    changed: Condvar,
}

impl Liveness {
    fn live(&self) -> usize {
        self.state.lock().live
    }

    /// Block until every worker has exited.
    ///
    /// A worker cannot wait for itself: called from a worker, this returns
    /// once the only live workers left are ones blocked here too.
    fn wait_exited(&self, on_worker: bool) {
        let mut state = self.state.lock();
        if on_worker {
            state.joining += 1;
            self.changed.notify_all();
            while state.live > state.joining {
                self.changed.wait(&mut state);
            }
            state.joining -= 1;
        } else {
            while state.live > 0 {
                self.changed.wait(&mut state);
            }
        }
    }
}

/// Counts one worker as live from before its spawn until its thread ends.
struct LiveWorker(Arc<Liveness>);

impl LiveWorker {
    fn register(liveness: &Arc<Liveness>) -> Self {
        liveness.state.lock().live += 1;
        Self(Arc::clone(liveness))
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.state.lock().live -= 1;
        self.0.changed.notify_all();
    }
}

/// Worker pool with dedicated OS threads.
///
/// The pool does not gate submissions; [`Engine`](super::Engine) refuses work
/// once shutdown has begun and only then closes the queue.
pub struct WorkerPool {
    /// Configured number of workers.
    worker_count: usize,

    /// Queue shared with every worker.
    queue: Arc<TaskQueue>,

    /// Pool statistics counters (lock-free atomics).
    counters: Arc<PoolCounters>,

    /// Live worker count; `join` waits on it.
    liveness: Arc<Liveness>,

    /// Thread ids of the workers, to recognize a join from inside the pool.
    worker_ids: Vec<ThreadId>,

    /// Worker thread handles; taken by the first external `join`.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `config.worker_count` worker threads.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidConfig` if the configuration is invalid
    /// - `EngineError::Spawn` if a thread cannot be created; workers already
    ///   started are stopped and joined first
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;

        let queue = Arc::new(TaskQueue::new());
        let counters = Arc::new(PoolCounters::default());
        let liveness = Arc::new(Liveness::default());
        let mut workers = Vec::with_capacity(config.worker_count);

        for worker_id in 0..config.worker_count {
            let spawned = spawn_worker(
                worker_id,
                config,
                Arc::clone(&queue),
                Arc::clone(&counters),
                &liveness,
            );
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(source) => {
                    error!(
                        worker_id = worker_id,
                        requested = config.worker_count,
                        error = %source,
                        "Failed to spawn worker thread"
                    );
                    queue.close(ShutdownMode::Abandon);
                    for (idx, worker) in workers.into_iter().enumerate() {
                        if worker.join().is_err() {
                            warn!(worker_id = idx, "Worker panicked during spawn rollback");
                        }
                    }
                    return Err(EngineError::Spawn {
                        index: worker_id,
                        requested: config.worker_count,
                        source,
                    });
                }
            }
        }

        info!(
            worker_count = config.worker_count,
            thread_name_prefix = %config.thread_name_prefix,
            "WorkerPool initialized with dedicated OS threads"
        );

        Ok(Self {
            worker_count: config.worker_count,
            queue,
            counters,
            liveness,
            worker_ids: workers.iter().map(|w| w.thread().id()).collect(),
            workers: Mutex::new(workers),
        })
    }

    /// Enqueue a task for the next idle worker.
    pub fn execute(&self, task: Task) {
        let task_id = task.id();
        self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        self.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
        self.queue.push(task);
        debug!(task_id = task_id, "Task queued");
    }

    /// Run the task at the head of the queue on the calling thread.
    ///
    /// Returns `false` without blocking when nothing is queued, or when an
    /// abandoning shutdown has begun.
    pub fn run_pending(&self) -> bool {
        let Some(task) = self.queue.try_pop() else {
            return false;
        };
        debug!(task_id = task.id(), "Running queued task on a waiting thread");
        run_task(task, &self.counters);
        true
    }

    /// Stop the workers.
    ///
    /// `Drain` lets workers finish everything queued; `Abandon` discards the
    /// queue and returns how many tasks were dropped. Discarded tasks resolve
    /// their slots as abandoned. Does not wait; see [`WorkerPool::join`].
    pub fn shutdown(&self, mode: ShutdownMode) -> usize {
        let discarded = self.queue.close(mode);
        let count = discarded.len();
        if count > 0 {
            self.counters.queued_tasks.fetch_sub(count as u64, Ordering::Relaxed);
            self.counters.abandoned_tasks.fetch_add(count as u64, Ordering::Relaxed);
        }
        // Dropped outside the queue lock; each drop resolves a slot.
        drop(discarded);
        info!(mode = %mode, discarded = count, "Worker pool stopping");
        count
    }

    /// Block until every worker thread has exited.
    ///
    /// Only meaningful after [`WorkerPool::shutdown`]. Safe to call more than
    /// once and from several threads; every caller returns only after the
    /// last worker is gone. Called from one of this pool's workers, it waits
    /// for the other workers and leaves the caller's own thread to a later
    /// join.
    pub fn join(&self) {
        let on_worker = self.worker_ids.contains(&thread::current().id());
        if on_worker {
            debug!("Join requested from a worker thread; waiting for the other workers");
            self.liveness.wait_exited(true);
            return;
        }

        let workers = mem::take(&mut *self.workers.lock());
        let joined = workers.len();
        for (idx, worker) in workers.into_iter().enumerate() {
            if worker.join().is_ok() {
                debug!(worker_id = idx, "Worker joined successfully");
            } else {
                warn!(worker_id = idx, "Worker panicked");
            }
        }

        // Concurrent joiners that found no handles wait here as well.
        self.liveness.wait_exited(false);
        if joined > 0 {
            info!(worker_count = joined, "Worker pool shut down complete");
        }
    }

    /// Whether shutdown has begun.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Shutdown mode in force, if shutdown has begun.
    pub fn stop_mode(&self) -> Option<ShutdownMode> {
        self.queue.stop_mode()
    }

    /// Configured number of workers.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.worker_count, self.liveness.live())
    }

    pub(crate) fn record_rejection(&self) {
        self.counters.rejected_tasks.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("queued", &self.queue.len())
            .field("closed", &self.queue.is_closed())
            .finish_non_exhaustive()
    }
}

/// Spawn a worker thread. The worker counts as live from here on; if the
/// spawn fails the dropped closure releases it again.
fn spawn_worker(
    worker_id: usize,
    config: &EngineConfig,
    queue: Arc<TaskQueue>,
    counters: Arc<PoolCounters>,
    liveness: &Arc<Liveness>,
) -> std::io::Result<JoinHandle<()>> {
    let mut builder = thread::Builder::new().name(format!("{}-{worker_id}", config.thread_name_prefix));
    if let Some(stack_size) = config.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }
    let live = LiveWorker::register(liveness);
    builder.spawn(move || worker_loop(worker_id, &queue, &counters, live))
}

fn worker_loop(worker_id: usize, queue: &TaskQueue, counters: &PoolCounters, _live: LiveWorker) {
    debug!(worker_id = worker_id, "Worker thread started");

    // Blocking pop, NO POLLING; returns Stop once the queue is closed and
    // has nothing left for this worker.
    while let Popped::Task(task) = queue.pop() {
        let task_id = task.id();
        debug!(worker_id = worker_id, task_id = task_id, "Worker executing task");
        let outcome = run_task(task, counters);
        debug!(worker_id = worker_id, task_id = task_id, ?outcome, "Worker completed task");
    }

    debug!(worker_id = worker_id, "Worker thread exiting");
}

/// Run one dequeued task and account for it.
fn run_task(task: Task, counters: &PoolCounters) -> RunOutcome {
    counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
    counters.active_tasks.fetch_add(1, Ordering::Relaxed);

    let task_id = task.id();
    // Job bodies catch their own panics; this guards custom runnables.
    let outcome = match catch_unwind(AssertUnwindSafe(|| task.run())) {
        Ok(RunOutcome::Panicked) => {
            warn!(task_id = task_id, "Task panicked; worker continues");
            RunOutcome::Panicked
        }
        Ok(outcome) => outcome,
        Err(payload) => {
            warn!(
                task_id = task_id,
                panic = %panic_message(payload.as_ref()),
                "Task panicked outside its job wrapper"
            );
            RunOutcome::Panicked
        }
    };

    counters.record(outcome);
    counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
    outcome
}
