use async_trait::async_trait;
use serde_json::Value;
use taskflow_core::error::NodeError;
use taskflow_core::executor::{NodeContext, NodeRunner};
use taskflow_core::workflow::Node;

/// Emits static material: `data.value`, or the whole `data` object.
#[derive(Debug, Default)]
pub struct MaterialRunner;

#[async_trait]
impl NodeRunner for MaterialRunner {
    fn name(&self) -> &str {
        "material"
    }

    async fn run_node(&self, node: &Node, _ctx: &NodeContext) -> Result<Value, NodeError> {
        match &node.data {
            Value::Null => Err(NodeError::InvalidPayload(format!(
                "material node '{}' has no data",
                node.id
            ))),
            Value::Object(map) if map.contains_key("value") => Ok(map["value"].clone()),
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskflow_core::executor::{CancelSignal, ContextView};
    use taskflow_core::workflow::NodeType;

    fn ctx() -> NodeContext {
        NodeContext {
            run_id: "run".into(),
            task_id: "doc".into(),
            attempt: 0,
            view: ContextView::default(),
            cancel: CancelSignal::new(),
        }
    }

    #[tokio::test]
    async fn test_returns_value_field() {
        let node = Node::new("doc", NodeType::Material).with_data(json!({"value": 5}));
        assert_eq!(MaterialRunner.run_node(&node, &ctx()).await.unwrap(), json!(5));
    }

    #[tokio::test]
    async fn test_returns_whole_data_without_value() {
        let node = Node::new("doc", NodeType::Material).with_data(json!({"title": "x"}));
        assert_eq!(
            MaterialRunner.run_node(&node, &ctx()).await.unwrap(),
            json!({"title": "x"})
        );
    }

    #[tokio::test]
    async fn test_missing_data_is_invalid() {
        let node = Node::new("doc", NodeType::Material);
        assert!(matches!(
            MaterialRunner.run_node(&node, &ctx()).await,
            Err(NodeError::InvalidPayload(_))
        ));
    }
}
