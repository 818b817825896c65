//! # Prometheus Task Engine
//!
//! A bounded, thread-based task-execution engine for the Prometheus AI Platform.
//!
//! Callers submit opaque units of work; a fixed set of worker threads drains a
//! FIFO queue and runs them; each submission gets its own write-once result
//! slot that the caller reads through a handle. The engine never interprets
//! what a task computes.
//!
//! ## Core Problem Solved
//!
//! Spawning a thread per unit of work (or per recursive call of a parallel
//! algorithm) lets the thread count grow with the input. Routing the same work
//! through an [`Engine`](core::Engine) caps the number of live threads at the
//! configured pool size, whatever the recursion depth or input size.
//!
//! ## Key Features
//!
//! - **Bounded Worker Pool**: worker count fixed at construction
//! - **FIFO Queue**: one mutex and one condition variable, no polling
//! - **Exactly-Once Results**: a slot leaves `Pending` once; a second write is
//!   an error, not an overwrite
//! - **Failure Isolation**: task errors and panics stay in that task's slot
//! - **Drain or Abandon Shutdown**: finish queued work or discard it; both
//!   resolve every outstanding handle
//! - **Blocking and Async Retrieval**: `Handle::get` or `Handle::get_async`
//!
//! ## Example
//!
//! ```
//! use prometheus_task_engine::config::ShutdownMode;
//! use prometheus_task_engine::core::{Engine, TaskError};
//!
//! let engine = Engine::new(2).unwrap();
//!
//! let handles: Vec<_> = (1..=5_u64)
//!     .map(|i| engine.submit(move || Ok::<_, String>(i * i)).unwrap())
//!     .collect();
//! let failing = engine.submit(|| Err::<u64, _>("boom".to_string())).unwrap();
//!
//! let mut squares: Vec<u64> = handles.into_iter().map(|h| h.get().unwrap()).collect();
//! squares.sort_unstable();
//! assert_eq!(squares, vec![1, 4, 9, 16, 25]);
//! assert_eq!(failing.get(), Err(TaskError::Failed("boom".to_string())));
//!
//! engine.shutdown_and_join(ShutdownMode::Drain);
//! assert!(engine.submit(|| Ok::<_, String>(0)).is_err());
//! ```
//!
//! For complete examples, see:
//! - `tests/engine_test.rs` - Engine scenarios
//! - `tests/shutdown_test.rs` - Drain and abandon semantics

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task queue, result slots, worker pool and engine façade.
pub mod core;
/// Configuration models for engines and shutdown behavior.
pub mod config;
/// Builders to construct engines from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
