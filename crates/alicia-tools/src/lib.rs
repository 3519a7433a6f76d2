pub mod error;
pub mod executor;
pub mod registry;
pub mod value;

pub use error::{Result, ToolError};
pub use executor::{PluginToolExecutor, ToolExecutor};
pub use registry::{RegisteredTool, ToolRegistry};
pub use value::ToolResultValue;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct EchoTool;

    #[async_trait]
    impl ToolExecutor for EchoTool {
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _cancel: CancellationToken,
        ) -> Result<ToolResultValue> {
            Ok(ToolResultValue::from_json(arguments))
        }
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    #[tokio::test]
    async fn execute_dispatches_when_arguments_match_schema() {
        let registry = ToolRegistry::new();
        registry.ensure_tool("echo", "echoes input", schema(), Arc::new(EchoTool));
        let result = registry
            .execute(
                "echo",
                serde_json::json!({ "text": "hi" }),
                Duration::from_secs(1),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            result,
            ToolResultValue::from_json(serde_json::json!({ "text": "hi" }))
        );
    }

    #[tokio::test]
    async fn execute_rejects_arguments_that_fail_schema_without_dispatching() {
        let registry = ToolRegistry::new();
        registry.ensure_tool("echo", "echoes input", schema(), Arc::new(EchoTool));
        let result = registry
            .execute(
                "echo",
                serde_json::json!({ "wrong_field": 1 }),
                Duration::from_secs(1),
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(ToolError::SchemaMismatch(_, _))));
    }

    #[tokio::test]
    async fn execute_returns_not_found_for_unregistered_tool() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute(
                "missing",
                serde_json::json!({}),
                Duration::from_secs(1),
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(ToolError::NotFound(_))));
    }

    #[tokio::test]
    async fn execute_honors_cancellation() {
        struct SlowTool;

        #[async_trait]
        impl ToolExecutor for SlowTool {
            async fn execute(
                &self,
                _arguments: serde_json::Value,
                cancel: CancellationToken,
            ) -> Result<ToolResultValue> {
                cancel.cancelled().await;
                Ok(ToolResultValue::Null)
            }
        }

        let registry = ToolRegistry::new();
        registry.ensure_tool(
            "slow",
            "never returns until cancelled",
            serde_json::json!({ "type": "object" }),
            Arc::new(SlowTool),
        );
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });
        let result = registry
            .execute("slow", serde_json::json!({}), Duration::from_secs(5), cancel)
            .await;
        assert!(matches!(result, Err(ToolError::Cancelled(_))));
    }
}
