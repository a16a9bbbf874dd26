//! Lookup of LP engines by name.

use super::LpEngine;
use crate::error::LopfError;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds all registered engines.
///
/// Create with `EngineRegistry::new()` for empty or
/// `EngineRegistry::with_defaults()` for the engines compiled into this build.
#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn LpEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers clarabel and, with the `solver-highs` feature, highs.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "solver-clarabel")]
        registry.register(Arc::new(super::ClarabelEngine));
        #[cfg(feature = "solver-highs")]
        registry.register(Arc::new(super::HighsEngine));
        registry
    }

    /// Register an engine, replacing any engine with the same id.
    pub fn register(&mut self, engine: Arc<dyn LpEngine>) {
        self.engines.insert(engine.id().to_string(), engine);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn LpEngine>> {
        self.engines.get(id).cloned()
    }

    /// Registered ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.engines.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Look up an engine that can run now.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn LpEngine>, LopfError> {
        let engine = self.get(id).ok_or_else(|| {
            LopfError::backend(
                id,
                format!("not registered (available: {})", self.list().join(", ")),
            )
        })?;
        if !engine.is_available() {
            return Err(LopfError::backend(id, "registered but not available"));
        }
        Ok(engine)
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.list())
            .finish()
    }
}
