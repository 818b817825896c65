//! Builders to construct named engines from configuration.

use std::collections::HashMap;

use tracing::info;

use crate::config::EngineSetConfig;
use crate::core::{Engine, EngineError};

/// Build one engine per entry of an engine set.
///
/// Engines are independent: each owns its own queue and workers. If any
/// engine fails to start, those already built are dropped (and therefore
/// shut down and joined) before the error is returned.
///
/// # Errors
///
/// - `EngineError::InvalidConfig` if the set fails validation
/// - `EngineError::Spawn` if a worker thread cannot be created
pub fn build_engines(cfg: &EngineSetConfig) -> Result<HashMap<String, Engine>, EngineError> {
    cfg.validate()
        .map_err(|e| EngineError::InvalidConfig(format!("engine set invalid: {e}")))?;

    let mut engines = HashMap::with_capacity(cfg.engines.len());
    for (name, engine_cfg) in &cfg.engines {
        let engine = Engine::with_config(engine_cfg.clone())?;
        info!(name = %name, engine_id = %engine.id(), "Engine built from configuration");
        engines.insert(name.clone(), engine);
    }

    Ok(engines)
}
