//! Write-once result slots and their writer/reader ends.
//!
//! A [`ResultSlot`] starts `Pending` and makes exactly one transition, to a
//! value or to a [`TaskError`]. The writer end is a [`Promise`]; the reader
//! end is either a single-owner [`Handle`] that moves the value out, or a
//! clonable [`SharedHandle`] whose readers all observe the same outcome.
//!
//! # Design
//!
//! - **No polling**: readers block on a `Condvar` guarded by the slot mutex
//! - **Set once**: a second write is rejected with
//!   [`EngineError::AlreadyResolved`], never applied
//! - **No stranded readers**: a `Promise` dropped before resolving marks the
//!   slot [`TaskError::Abandoned`]

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::error;

use super::error::{EngineError, EngineResult, TaskError};
use super::task::TaskId;

/// Observable state of a [`ResultSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// No outcome yet.
    Pending,
    /// Resolved with a value.
    Fulfilled,
    /// Resolved with an error.
    Failed,
    /// Resolved, and the outcome has been moved out by its single owner.
    Consumed,
}

enum SlotState<V, E> {
    Pending,
    Resolved(Result<V, TaskError<E>>),
    Consumed,
}

impl<V, E> SlotState<V, E> {
    const fn status(&self) -> SlotStatus {
        match self {
            Self::Pending => SlotStatus::Pending,
            Self::Resolved(Ok(_)) => SlotStatus::Fulfilled,
            Self::Resolved(Err(_)) => SlotStatus::Failed,
            Self::Consumed => SlotStatus::Consumed,
        }
    }

    const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Single-writer-once container for a task's outcome.
pub struct ResultSlot<V, E> {
    state: Mutex<SlotState<V, E>>,
    resolved: Condvar,
}

impl<V, E> Default for ResultSlot<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> ResultSlot<V, E> {
    /// Create a pending slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            resolved: Condvar::new(),
        }
    }

    /// Resolve the slot with a value.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyResolved`] if the slot has left `Pending`; the
    /// stored outcome is left untouched.
    pub fn fulfill(&self, value: V) -> EngineResult<()> {
        self.complete(Ok(value))
    }

    /// Resolve the slot with an error.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyResolved`] if the slot has left `Pending`.
    pub fn fail(&self, error: TaskError<E>) -> EngineResult<()> {
        self.complete(Err(error))
    }

    /// Perform the single `Pending -> resolved` transition and wake every
    /// blocked reader.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyResolved`] if the slot has left `Pending`.
    pub fn complete(&self, outcome: Result<V, TaskError<E>>) -> EngineResult<()> {
        {
            let mut state = self.state.lock();
            if !state.is_pending() {
                return Err(EngineError::AlreadyResolved);
            }
            *state = SlotState::Resolved(outcome);
        }
        self.resolved.notify_all();
        Ok(())
    }

    /// Current state snapshot.
    pub fn status(&self) -> SlotStatus {
        self.state.lock().status()
    }

    /// Whether the slot has left `Pending`.
    pub fn is_ready(&self) -> bool {
        !self.state.lock().is_pending()
    }

    /// Block until the slot leaves `Pending`.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while state.is_pending() {
            self.resolved.wait(&mut state);
        }
    }

    /// Block until the slot leaves `Pending` or `timeout` elapses.
    ///
    /// Returns `true` if the slot is resolved.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.is_pending() {
            if self.resolved.wait_until(&mut state, deadline).timed_out() {
                return !state.is_pending();
            }
        }
        true
    }

    /// Block until resolved, then move the outcome out.
    fn take(&self) -> Result<V, TaskError<E>> {
        let mut state = self.state.lock();
        loop {
            match mem::replace(&mut *state, SlotState::Consumed) {
                SlotState::Resolved(outcome) => return outcome,
                SlotState::Consumed => return Err(TaskError::Consumed),
                SlotState::Pending => {
                    *state = SlotState::Pending;
                    self.resolved.wait(&mut state);
                }
            }
        }
    }

    /// Block until resolved, then clone the outcome; the slot keeps it.
    fn read(&self) -> Result<V, TaskError<E>>
    where
        V: Clone,
        E: Clone,
    {
        let mut state = self.state.lock();
        loop {
            if let SlotState::Resolved(outcome) = &*state {
                return outcome.clone();
            }
            if matches!(*state, SlotState::Consumed) {
                return Err(TaskError::Consumed);
            }
            self.resolved.wait(&mut state);
        }
    }
}

impl<V, E> fmt::Debug for ResultSlot<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSlot").field("status", &self.status()).finish()
    }
}

/// Create a connected writer/reader pair over a fresh slot.
#[must_use]
pub fn channel<V, E>() -> (Promise<V, E>, Handle<V, E>) {
    let slot = Arc::new(ResultSlot::new());
    let promise = Promise {
        slot: Some(Arc::clone(&slot)),
    };
    (promise, Handle::attached(slot, None))
}

/// Writer end of a result slot.
///
/// Resolving consumes the promise, so a second write through the same
/// promise cannot be expressed. Dropping it unresolved resolves the slot as
/// [`TaskError::Abandoned`].
pub struct Promise<V, E> {
    slot: Option<Arc<ResultSlot<V, E>>>,
}

impl<V, E> Promise<V, E> {
    /// Resolve with a value.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyResolved`] if the slot was resolved elsewhere.
    pub fn fulfill(self, value: V) -> EngineResult<()> {
        self.resolve(Ok(value))
    }

    /// Resolve with the caller's error, surfaced as [`TaskError::Failed`].
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyResolved`] if the slot was resolved elsewhere.
    pub fn fail(self, error: E) -> EngineResult<()> {
        self.resolve(Err(TaskError::Failed(error)))
    }

    pub(crate) fn resolve(mut self, outcome: Result<V, TaskError<E>>) -> EngineResult<()> {
        match self.slot.take() {
            Some(slot) => slot.complete(outcome),
            None => Err(EngineError::AlreadyResolved),
        }
    }
}

impl<V, E> Drop for Promise<V, E> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            if slot.complete(Err(TaskError::Abandoned)).is_err() {
                error!("abandoned promise found its slot already resolved");
            }
        }
    }
}

impl<V, E> fmt::Debug for Promise<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("resolved", &self.slot.is_none())
            .finish()
    }
}

/// Single-owner reader end of a result slot.
///
/// A handle does not own the worker that computes its value. Moving it out
/// with [`Handle::take`] leaves a detached handle behind; reading from a
/// detached handle reports [`TaskError::Detached`].
pub struct Handle<V, E> {
    slot: Option<Arc<ResultSlot<V, E>>>,
    task_id: Option<TaskId>,
}

impl<V, E> Handle<V, E> {
    pub(crate) const fn attached(slot: Arc<ResultSlot<V, E>>, task_id: Option<TaskId>) -> Self {
        Self {
            slot: Some(slot),
            task_id,
        }
    }

    pub(crate) fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// A handle bound to no slot.
    #[must_use]
    pub const fn detached() -> Self {
        Self {
            slot: None,
            task_id: None,
        }
    }

    /// Whether the handle still refers to a slot.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.slot.is_some()
    }

    /// Id of the submission this handle belongs to, if it came from an engine.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    /// Non-blocking poll; `false` for a detached handle.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| slot.is_ready())
    }

    /// Slot state, or `None` for a detached handle.
    #[must_use]
    pub fn status(&self) -> Option<SlotStatus> {
        self.slot.as_ref().map(|slot| slot.status())
    }

    /// Block until the outcome is available; returns at once if detached.
    pub fn wait(&self) {
        if let Some(slot) = &self.slot {
            slot.wait();
        }
    }

    /// Block until the outcome is available or `timeout` elapses.
    ///
    /// Returns `true` if a subsequent [`Handle::get`] will not block.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|slot| slot.wait_timeout(timeout))
    }

    /// Transfer ownership into a new handle, leaving `self` detached.
    #[must_use]
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Block until the task resolves and return its value or error.
    ///
    /// # Errors
    ///
    /// The task's [`TaskError`], or [`TaskError::Detached`] if this handle
    /// refers to no slot.
    pub fn get(self) -> Result<V, TaskError<E>> {
        match self.slot {
            Some(slot) => slot.take(),
            None => Err(TaskError::Detached),
        }
    }

    /// Convert into a clonable reader shared by many observers.
    #[must_use]
    pub fn share(self) -> SharedHandle<V, E> {
        SharedHandle {
            slot: self.slot,
            task_id: self.task_id,
        }
    }

    /// Await the outcome from async code without blocking the runtime.
    ///
    /// The blocking wait runs on tokio's blocking thread pool.
    ///
    /// # Errors
    ///
    /// As [`Handle::get`]. If the runtime cancels the blocking wait (for
    /// example while shutting down) the result is [`TaskError::Abandoned`];
    /// any other bridge failure is [`TaskError::Panicked`].
    #[cfg(feature = "tokio-runtime")]
    pub async fn get_async(self) -> Result<V, TaskError<E>>
    where
        V: Send + 'static,
        E: Send + 'static,
    {
        let Some(slot) = self.slot else {
            return Err(TaskError::Detached);
        };
        if slot.is_ready() {
            return slot.take();
        }
        match tokio::task::spawn_blocking(move || slot.take()).await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(bridge_failure(&join_err)),
        }
    }
}

#[cfg(feature = "tokio-runtime")]
fn bridge_failure<E>(join_err: &tokio::task::JoinError) -> TaskError<E> {
    if join_err.is_cancelled() {
        TaskError::Abandoned
    } else {
        TaskError::Panicked(join_err.to_string())
    }
}

impl<V, E> Default for Handle<V, E> {
    fn default() -> Self {
        Self::detached()
    }
}

impl<V, E> fmt::Debug for Handle<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("task_id", &self.task_id)
            .field("status", &self.status())
            .finish()
    }
}

/// Clonable reader end; every clone observes the identical outcome.
pub struct SharedHandle<V, E> {
    slot: Option<Arc<ResultSlot<V, E>>>,
    task_id: Option<TaskId>,
}

impl<V, E> SharedHandle<V, E> {
    /// Id of the submission this handle belongs to, if it came from an engine.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    /// Non-blocking poll; `false` for a detached handle.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| slot.is_ready())
    }

    /// Block until the outcome is available or `timeout` elapses.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|slot| slot.wait_timeout(timeout))
    }

    /// Block until the task resolves and return a clone of its outcome.
    ///
    /// # Errors
    ///
    /// The task's [`TaskError`], or [`TaskError::Detached`] if this handle
    /// refers to no slot.
    pub fn get(&self) -> Result<V, TaskError<E>>
    where
        V: Clone,
        E: Clone,
    {
        match &self.slot {
            Some(slot) => slot.read(),
            None => Err(TaskError::Detached),
        }
    }
}

impl<V, E> Clone for SharedHandle<V, E> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            task_id: self.task_id,
        }
    }
}

impl<V, E> fmt::Debug for SharedHandle<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedHandle")
            .field("task_id", &self.task_id)
            .field("status", &self.slot.as_ref().map(|slot| slot.status()))
            .finish()
    }
}
