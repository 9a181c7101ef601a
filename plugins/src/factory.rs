use std::sync::Arc;

use anyhow::Result;

use taskflow_core::executor::types::RetryConfig;
use taskflow_core::executor::{NodeRunnerRegistry, ProgressSink, RetryStrategyPlugin};
use taskflow_core::workflow::NodeType;

use crate::executor::{
    ExponentialBackoffPlugin, JsonlRendererPlugin, LinearRetryPlugin, TextRendererPlugin,
};
use crate::runner::{ConditionRunner, MaterialRunner, PromptRunner, ResultRunner};

/// Runners for the built-in node families. Other node types have no runner
/// and are rejected when the graph is built.
pub fn build_registry() -> NodeRunnerRegistry {
    NodeRunnerRegistry::new()
        .with(NodeType::Material, Arc::new(MaterialRunner))
        .with(NodeType::Ai, Arc::new(PromptRunner))
        .with(NodeType::Condition, Arc::new(ConditionRunner))
        .with(NodeType::Result, Arc::new(ResultRunner))
}

pub fn build_retry(cfg: &RetryConfig) -> Result<Option<Arc<dyn RetryStrategyPlugin>>> {
    match cfg.strategy.as_str() {
        "none" | "" => Ok(None),
        "exponential-backoff" | "exponential" => {
            Ok(Some(Arc::new(ExponentialBackoffPlugin::new(cfg.clone()))))
        }
        "linear" => Ok(Some(Arc::new(LinearRetryPlugin::new(cfg.clone())))),
        other => anyhow::bail!("unknown retry strategy '{other}'"),
    }
}

pub fn build_sink(format: &str, ascii_only: bool) -> Arc<dyn ProgressSink> {
    match format {
        "jsonl" => Arc::new(JsonlRendererPlugin::new(false)),
        // Anything other than jsonl behaves like text.
        _ => Arc::new(TextRendererPlugin::new(ascii_only)),
    }
}
