use async_trait::async_trait;
use serde_json::{Map, Value};
use taskflow_core::error::NodeError;
use taskflow_core::executor::{NodeContext, NodeRunner};
use taskflow_core::workflow::Node;

/// Collects `data.inputs` context keys into one object, or the whole
/// context when no inputs are listed.
#[derive(Debug, Default)]
pub struct ResultRunner;

#[async_trait]
impl NodeRunner for ResultRunner {
    fn name(&self) -> &str {
        "result"
    }

    async fn run_node(&self, node: &Node, ctx: &NodeContext) -> Result<Value, NodeError> {
        let inputs: Vec<&str> = match node.data.get("inputs") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        NodeError::InvalidPayload(format!(
                            "result '{}': inputs must be strings",
                            node.id
                        ))
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(NodeError::InvalidPayload(format!(
                    "result '{}': inputs must be an array",
                    node.id
                )))
            }
        };

        let mut out = Map::new();
        if inputs.is_empty() {
            for (key, value) in ctx.view.iter() {
                out.insert(key.clone(), value.clone());
            }
        } else {
            for key in inputs {
                let value = ctx
                    .view
                    .get(key)
                    .ok_or_else(|| NodeError::MissingInput(key.to_string()))?;
                out.insert(key.to_string(), value.clone());
            }
        }

        Ok(Value::Object(out))
    }
}
