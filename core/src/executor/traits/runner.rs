use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;
use crate::executor::cancel::CancelSignal;
use crate::executor::context::ContextView;
use crate::workflow::Node;

/// Performs the actual work of a node (LLM call, tool invocation, document write...).
///
/// The executor only cares about the returned value or error. Implementations
/// should watch `ctx.cancel` when they await long external calls.
#[async_trait]
pub trait NodeRunner: Send + Sync {
    /// Runner name (unique identifier)
    fn name(&self) -> &str;

    async fn run_node(&self, node: &Node, ctx: &NodeContext) -> Result<Value, NodeError>;
}

/// Everything a runner may look at while executing one attempt of a task.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub run_id: String,
    pub task_id: String,
    /// 0 for the first attempt
    pub attempt: u32,
    /// Outputs of tasks that completed before this one started
    pub view: ContextView,
    pub cancel: CancelSignal,
}
