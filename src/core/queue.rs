//! FIFO task queue guarded by one mutex and one condition variable.
//!
//! Workers block in [`TaskQueue::pop`] until a task arrives or the queue is
//! closed. Closing broadcasts to every waiter so no worker stays parked.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::task::Task;
use crate::config::ShutdownMode;

/// Result of a blocking [`TaskQueue::pop`].
#[derive(Debug)]
pub enum Popped {
    /// The head of the queue.
    Task(Task),
    /// The queue is closed and has nothing left for this worker.
    Stop,
}

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    stop: Option<ShutdownMode>,
}

/// Ordered, thread-safe holding area for pending tasks.
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl TaskQueue {
    /// Create an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `task` at the tail and wake one blocked consumer.
    pub fn push(&self, task: Task) {
        self.state.lock().tasks.push_back(task);
        self.available.notify_one();
    }

    /// Block until a task is available or the queue is closed.
    ///
    /// Under [`ShutdownMode::Drain`] queued tasks keep being handed out after
    /// close and `Stop` is returned only once the queue is empty. Under
    /// [`ShutdownMode::Abandon`] `Stop` is returned immediately.
    pub fn pop(&self) -> Popped {
        let mut state = self.state.lock();
        loop {
            if state.stop == Some(ShutdownMode::Abandon) {
                return Popped::Stop;
            }
            if let Some(task) = state.tasks.pop_front() {
                return Popped::Task(task);
            }
            if state.stop.is_some() {
                return Popped::Stop;
            }
            self.available.wait(&mut state);
        }
    }

    /// Non-blocking pop; `None` when the queue is empty.
    pub fn try_pop(&self) -> Option<Task> {
        let mut state = self.state.lock();
        if state.stop == Some(ShutdownMode::Abandon) {
            return None;
        }
        state.tasks.pop_front()
    }

    /// Raise the stop condition and wake every blocked consumer.
    ///
    /// A stronger mode replaces a weaker one. Under `Abandon` the tasks still
    /// queued are removed and returned so the caller can drop them outside
    /// the queue lock.
    pub fn close(&self, mode: ShutdownMode) -> Vec<Task> {
        let discarded = {
            let mut state = self.state.lock();
            let effective = state.stop.map_or(mode, |current| current.max(mode));
            state.stop = Some(effective);
            if effective == ShutdownMode::Abandon {
                state.tasks.drain(..).collect()
            } else {
                Vec::new()
            }
        };
        self.available.notify_all();
        discarded
    }

    /// Stop condition currently in force, if any.
    pub fn stop_mode(&self) -> Option<ShutdownMode> {
        self.state.lock().stop
    }

    /// Whether [`TaskQueue::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.stop_mode().is_some()
    }

    /// Snapshot of the number of queued tasks.
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Snapshot of queue emptiness.
    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }
}
