//! Task queue, result slots, worker pool and the engine façade.

pub mod engine;
pub mod error;
pub mod queue;
pub mod slot;
pub mod task;
pub mod worker_pool;

pub use engine::Engine;
pub use error::{EngineError, EngineResult, TaskError};
pub use queue::{Popped, TaskQueue};
pub use slot::{channel, Handle, Promise, ResultSlot, SharedHandle, SlotStatus};
pub use task::{RunOutcome, Runnable, Task, TaskId};
pub use worker_pool::{PoolStats, WorkerPool};
