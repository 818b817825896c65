//! Engine and worker-thread configuration structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Smallest accepted worker thread stack size, in bytes.
pub const MIN_THREAD_STACK_SIZE: usize = 64 * 1024;

const ENV_WORKER_COUNT: &str = "ENGINE_WORKER_COUNT";
const ENV_SHUTDOWN_MODE: &str = "ENGINE_SHUTDOWN_MODE";
const ENV_THREAD_NAME_PREFIX: &str = "ENGINE_THREAD_NAME_PREFIX";
const ENV_THREAD_STACK_SIZE: &str = "ENGINE_THREAD_STACK_SIZE";

/// What happens to queued work when an engine is asked to stop.
///
/// Variants are ordered: `Abandon` is stronger than `Drain`, so a later
/// `Abandon` request escalates an earlier `Drain`, never the reverse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Run every task already queued before the workers exit.
    #[default]
    Drain,
    /// Discard tasks that no worker has picked up yet.
    Abandon,
}

impl ShutdownMode {
    /// Parse a mode name (`drain` or `abandon`, case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `input` names no mode.
    pub fn parse(input: &str) -> Result<Self, String> {
        match input.trim().to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "abandon" => Ok(Self::Abandon),
            other => Err(format!("unknown shutdown mode `{other}`")),
        }
    }

    /// Lowercase name of the mode, as used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drain => "drain",
            Self::Abandon => "abandon",
        }
    }
}

impl std::fmt::Display for ShutdownMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a single [`Engine`](crate::core::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of worker threads; fixed for the engine's lifetime.
    pub worker_count: usize,
    /// Mode applied when the engine is dropped without an explicit shutdown.
    pub shutdown_mode: ShutdownMode,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Stack size for worker threads; platform default when `None`.
    pub thread_stack_size: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            shutdown_mode: ShutdownMode::Drain,
            thread_name_prefix: "engine-worker".to_string(),
            thread_stack_size: None,
        }
    }
}

impl EngineConfig {
    /// Configuration with one worker per logical CPU and drain-on-drop.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the mode used when the engine is dropped.
    #[must_use]
    pub const fn with_shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.shutdown_mode = mode;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set an explicit worker thread stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if let Some(bytes) = self.thread_stack_size {
            if bytes < MIN_THREAD_STACK_SIZE {
                return Err(format!(
                    "thread_stack_size must be at least {MIN_THREAD_STACK_SIZE} bytes, got {bytes}"
                ));
            }
        }
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Recognized variables are `ENGINE_WORKER_COUNT`, `ENGINE_SHUTDOWN_MODE`,
    /// `ENGINE_THREAD_NAME_PREFIX` and `ENGINE_THREAD_STACK_SIZE`; unset
    /// variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed variable or of the
    /// validation failure.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup using the same keys
    /// as [`EngineConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed value or of the
    /// validation failure.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(ENV_WORKER_COUNT) {
            cfg.worker_count = raw
                .trim()
                .parse()
                .map_err(|e| format!("{ENV_WORKER_COUNT}: {e}"))?;
        }
        if let Some(raw) = lookup(ENV_SHUTDOWN_MODE) {
            cfg.shutdown_mode =
                ShutdownMode::parse(&raw).map_err(|e| format!("{ENV_SHUTDOWN_MODE}: {e}"))?;
        }
        if let Some(raw) = lookup(ENV_THREAD_NAME_PREFIX) {
            cfg.thread_name_prefix = raw;
        }
        if let Some(raw) = lookup(ENV_THREAD_STACK_SIZE) {
            let bytes = raw
                .trim()
                .parse()
                .map_err(|e| format!("{ENV_THREAD_STACK_SIZE}: {e}"))?;
            cfg.thread_stack_size = Some(bytes);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// A named set of engine configurations, one entry per engine instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSetConfig {
    /// Map of engine name to configuration.
    pub engines: HashMap<String, EngineConfig>,
}

impl EngineSetConfig {
    /// Validate all engines and ensure at least one is defined.
    ///
    /// # Errors
    ///
    /// Returns a description naming the first invalid engine.
    pub fn validate(&self) -> Result<(), String> {
        if self.engines.is_empty() {
            return Err("at least one engine must be defined".into());
        }
        for (name, engine) in &self.engines {
            engine
                .validate()
                .map_err(|e| format!("engine `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse an engine set from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
