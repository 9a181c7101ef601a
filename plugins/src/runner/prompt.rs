use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use taskflow_core::error::NodeError;
use taskflow_core::executor::{NodeContext, NodeRunner};
use taskflow_core::workflow::Node;

use super::refs;

/// Renders `data.prompt`, substituting `{{node.output}}` placeholders from the
/// context. Stands in for the model call: the rendered prompt is the output.
///
/// `data.latency_ms` simulates a slow backend and honours cancellation.
#[derive(Debug, Default)]
pub struct PromptRunner;

#[async_trait]
impl NodeRunner for PromptRunner {
    fn name(&self) -> &str {
        "prompt"
    }

    async fn run_node(&self, node: &Node, ctx: &NodeContext) -> Result<Value, NodeError> {
        let template = node
            .data
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                NodeError::InvalidPayload(format!("node '{}' has no data.prompt", node.id))
            })?;

        let rendered = refs::render(template, &ctx.view)?;

        if let Some(ms) = node.data.get("latency_ms").and_then(Value::as_u64) {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                _ = ctx.cancel.cancelled() => return Err(NodeError::Cancelled),
            }
        }

        tracing::debug!(task_id = %ctx.task_id, chars = rendered.len(), "prompt rendered");
        Ok(Value::String(rendered))
    }
}
