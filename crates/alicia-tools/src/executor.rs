use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::value::ToolResultValue;

/// Dispatch seam for a single tool's execution. Native tools implement
/// this in-process; a remote tool gets the same seam via
/// `PluginToolExecutor`.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<ToolResultValue>;
}

/// Thin wrapper around a remote, JSON-RPC-style tool call. The transport
/// itself (HTTP, a subprocess, a plugin socket) is out of scope — this
/// crate only models the executor capability the engine dispatches to.
pub struct PluginToolExecutor<F> {
    call: F,
}

impl<F> PluginToolExecutor<F>
where
    F: Fn(serde_json::Value, CancellationToken) -> crate::error::Result<ToolResultValue>
        + Send
        + Sync,
{
    pub fn new(call: F) -> Self {
        Self { call }
    }
}

#[async_trait]
impl<F> ToolExecutor for PluginToolExecutor<F>
where
    F: Fn(serde_json::Value, CancellationToken) -> crate::error::Result<ToolResultValue>
        + Send
        + Sync,
{
    async fn execute(
        &self,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<ToolResultValue> {
        (self.call)(arguments, cancel)
    }
}
