//! Configuration models for engines, worker threads and shutdown behavior.

pub mod engine;

pub use engine::{EngineConfig, EngineSetConfig, ShutdownMode, MIN_THREAD_STACK_SIZE};
