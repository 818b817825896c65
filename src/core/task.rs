//! Type-erased units of work.
//!
//! A [`Task`] is what travels through the [`TaskQueue`](super::TaskQueue): an
//! insertion-order id plus a boxed [`Runnable`]. The engine wraps every
//! submitted closure in a `Job` that runs it and resolves the submission's
//! result slot, so workers never see caller types.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

use super::error::TaskError;
use super::slot::Promise;
use crate::util::panic_message;

/// Identifier assigned to each task in submission order.
pub type TaskId = u64;

/// How a single run of a [`Runnable`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The work produced a value.
    Fulfilled,
    /// The work returned an error.
    Failed,
    /// The work panicked.
    Panicked,
}

/// A once-invocable unit of work that executes and resolves its own result.
pub trait Runnable: Send {
    /// Execute the work and publish its outcome.
    fn run(self: Box<Self>) -> RunOutcome;
}

/// A queued unit of work.
pub struct Task {
    id: TaskId,
    body: Box<dyn Runnable>,
}

impl Task {
    /// Wrap a runnable with its submission id.
    pub fn new<R>(id: TaskId, body: R) -> Self
    where
        R: Runnable + 'static,
    {
        Self {
            id,
            body: Box::new(body),
        }
    }

    /// Submission-order id.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Consume the task and run it on the current thread.
    pub fn run(self) -> RunOutcome {
        self.body.run()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish_non_exhaustive()
    }
}

/// A caller closure bound to the promise of its submission.
pub(crate) struct Job<F, V, E> {
    work: F,
    promise: Promise<V, E>,
}

impl<F, V, E> Job<F, V, E> {
    pub(crate) fn new(work: F, promise: Promise<V, E>) -> Self {
        Self { work, promise }
    }
}

impl<F, V, E> Runnable for Job<F, V, E>
where
    F: FnOnce() -> Result<V, E> + Send,
    V: Send,
    E: Send,
{
    fn run(self: Box<Self>) -> RunOutcome {
        let Self { work, promise } = *self;
        // The slot lock is not held here; only `resolve` takes it.
        let (outcome, result) = match catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => (RunOutcome::Fulfilled, Ok(value)),
            Ok(Err(err)) => (RunOutcome::Failed, Err(TaskError::Failed(err))),
            Err(payload) => (
                RunOutcome::Panicked,
                Err(TaskError::Panicked(panic_message(payload.as_ref()))),
            ),
        };
        if let Err(err) = promise.resolve(result) {
            error!(%err, "job could not publish its outcome");
        }
        outcome
    }
}
