use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ToolError};
use crate::executor::ToolExecutor;
use crate::value::ToolResultValue;

pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
    pub enabled: bool,
    pub executor: Arc<dyn ToolExecutor>,
}

/// Catalog of every tool available to a turn, keyed by name. Mirrors the
/// teacher's `SessionManager::get_or_create` upsert idiom for
/// `ensure_tool`.
pub struct ToolRegistry {
    tools: DashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    pub fn ensure_tool(
        &self,
        name: &str,
        description: &str,
        schema: serde_json::Value,
        executor: Arc<dyn ToolExecutor>,
    ) {
        self.tools
            .entry(name.to_string())
            .or_insert_with(|| RegisteredTool {
                name: name.to_string(),
                description: description.to_string(),
                schema,
                enabled: true,
                executor,
            });
    }

    pub fn disable(&self, name: &str) {
        if let Some(mut entry) = self.tools.get_mut(name) {
            entry.enabled = false;
        }
    }

    pub fn definitions(&self) -> Vec<(String, String, serde_json::Value)> {
        self.tools
            .iter()
            .filter(|e| e.enabled)
            .map(|e| (e.name.clone(), e.description.clone(), e.schema.clone()))
            .collect()
    }

    /// Validate `arguments` against the tool's schema, then dispatch under
    /// a timeout, propagating the turn's cancellation token. A schema
    /// mismatch never dispatches (§8 boundary behavior — 202/InvalidState).
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<ToolResultValue> {
        let entry = self
            .tools
            .get(name)
            .filter(|e| e.enabled)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let validator = jsonschema::validator_for(&entry.schema)
            .map_err(|e| ToolError::SchemaMismatch(name.to_string(), e.to_string()))?;
        if let Err(e) = validator.validate(&arguments) {
            return Err(ToolError::SchemaMismatch(name.to_string(), e.to_string()));
        }

        let executor = entry.executor.clone();
        drop(entry);

        tokio::select! {
            result = tokio::time::timeout(timeout, executor.execute(arguments, cancel.clone())) => {
                match result {
                    Ok(inner) => inner,
                    Err(_elapsed) => Err(ToolError::Timeout(name.to_string(), timeout)),
                }
            }
            _ = cancel.cancelled() => Err(ToolError::Cancelled(name.to_string())),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
