//! Workflow definition as handed to the executor: typed nodes and directed edges.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node family. Runners are registered per family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    /// Material / input node
    Material,
    /// AI execution node
    Ai,
    Condition,
    Result,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Material => "material",
            Self::Ai => "ai",
            Self::Condition => "condition",
            Self::Result => "result",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "material" | "input" => Self::Material,
            "ai" | "ai_execution" => Self::Ai,
            "condition" => Self::Condition,
            "result" | "output" => Self::Result,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow node. `data` is opaque to the engine and only read by runners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,

    #[serde(rename = "type")]
    pub node_type: NodeType,

    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub data: Value,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<NodeType>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            outputs: Vec::new(),
            data: Value::Null,
        }
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Key under which an output of this node is published: `<id>.<output>`.
    pub fn output_key(&self, output: &str) -> String {
        format!("{}.{}", self.id, output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub id: Option<String>,

    pub nodes: Vec<Node>,

    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            id: None,
            nodes,
            edges,
        }
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read {} failed: {e}", path.display()))?;
        Ok(Self::from_json(&s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_workflow_json() {
        let wf = Workflow::from_json(
            r#"{
                "nodes": [
                    {"id": "doc", "type": "input", "outputs": ["text"], "data": {"value": "hi"}},
                    {"id": "llm", "type": "ai", "outputs": ["answer"]},
                    {"id": "custom", "type": "webhook"}
                ],
                "edges": [{"source": "doc", "target": "llm"}]
            }"#,
        )
        .unwrap();

        assert_eq!(wf.nodes.len(), 3);
        assert_eq!(wf.nodes[0].node_type, NodeType::Material);
        assert_eq!(wf.nodes[0].data, json!({"value": "hi"}));
        assert_eq!(wf.nodes[1].node_type, NodeType::Ai);
        assert_eq!(wf.nodes[2].node_type, NodeType::Other("webhook".into()));
        assert!(wf.nodes[2].outputs.is_empty());
        assert_eq!(wf.edges, vec![Edge::new("doc", "llm")]);
    }

    #[test]
    fn test_node_type_serializes_canonical_name() {
        let node = Node::new("a", "input");
        let v = serde_json::to_value(&node).unwrap();
        assert_eq!(v["type"], "material");
    }

    #[test]
    fn test_output_key() {
        let node = Node::new("A", NodeType::Material).with_outputs(["x"]);
        assert_eq!(node.output_key("x"), "A.x");
    }
}
