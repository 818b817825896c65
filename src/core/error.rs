//! Error types for engine operations and task outcomes.

use thiserror::Error;

/// Errors produced by the engine, its pool and result slots.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine has begun shutting down and no longer accepts work.
    #[error("engine is closed; submission rejected")]
    Closed,
    /// A result slot was written after it had already been resolved.
    #[error("result slot already resolved")]
    AlreadyResolved,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be created; no workers were left running.
    #[error("failed to spawn worker {index} of {requested}: {source}")]
    Spawn {
        /// Index of the worker that failed to start.
        index: usize,
        /// Configured number of workers.
        requested: usize,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for engine-level operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Why a task produced no value.
///
/// `E` is the caller's own error type, returned unchanged in
/// [`TaskError::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError<E> {
    /// The work returned an error.
    #[error("task failed: {0}")]
    Failed(E),
    /// The work panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was discarded before it ran, or its writer went away
    /// without resolving.
    #[error("task abandoned before producing a result")]
    Abandoned,
    /// The handle is not attached to a result slot.
    #[error("handle is detached from its result slot")]
    Detached,
    /// The value was already taken out of the slot.
    #[error("task result already consumed")]
    Consumed,
}

impl<E> TaskError<E> {
    /// The caller's error, if the work itself failed.
    pub const fn failure(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the failure came from the work rather than from the engine.
    pub const fn is_task_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked(_))
    }
}
