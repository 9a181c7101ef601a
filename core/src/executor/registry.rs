use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;
use crate::workflow::{Node, NodeType};

use super::traits::{NodeContext, NodeRunner};

/// Maps node families to the runner that executes them.
///
/// Lookups happen once per task while the graph is built.
#[derive(Clone, Default)]
pub struct NodeRunnerRegistry {
    runners: HashMap<NodeType, Arc<dyn NodeRunner>>,
    fallback: Option<Arc<dyn NodeRunner>>,
}

impl NodeRunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node_type: impl Into<NodeType>, runner: Arc<dyn NodeRunner>) {
        self.runners.insert(node_type.into(), runner);
    }

    pub fn with(mut self, node_type: impl Into<NodeType>, runner: Arc<dyn NodeRunner>) -> Self {
        self.register(node_type, runner);
        self
    }

    /// Runner used for node types without a dedicated registration.
    pub fn with_fallback(mut self, runner: Arc<dyn NodeRunner>) -> Self {
        self.fallback = Some(runner);
        self
    }

    pub fn resolve(&self, node_type: &NodeType) -> Option<Arc<dyn NodeRunner>> {
        self.runners
            .get(node_type)
            .cloned()
            .or_else(|| self.fallback.clone())
    }

    pub fn node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.runners.keys().map(|t| t.to_string()).collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for NodeRunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRunnerRegistry")
            .field("node_types", &self.node_types())
            .field("fallback", &self.fallback.as_ref().map(|r| r.name().to_string()))
            .finish()
    }
}

/// Adapts an async closure into a [`NodeRunner`].
pub struct FnRunner<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnRunner<F>
where
    F: Fn(Arc<Node>, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, NodeError>> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> NodeRunner for FnRunner<F>
where
    F: Fn(Arc<Node>, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, NodeError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_node(&self, node: &Node, ctx: &NodeContext) -> Result<Value, NodeError> {
        (self.f)(Arc::new(node.clone()), ctx.clone()).await
    }
}
