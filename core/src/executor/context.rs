//! Shared execution context: `<nodeId>.<outputName>` -> value, written once per key.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::error::ExecutorError;
use crate::workflow::Node;

/// Run-scoped output store. Only the driving loop writes to it, after the
/// producing task has finished; units receive immutable [`ContextView`]s.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    entries: Arc<BTreeMap<String, Value>>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key exactly once. A second write to the same key is rejected.
    pub fn insert(&mut self, key: String, value: Value) -> Result<(), ExecutorError> {
        if self.entries.contains_key(&key) {
            return Err(ExecutorError::ContextKeyConflict(key));
        }
        Arc::make_mut(&mut self.entries).insert(key, value);
        Ok(())
    }

    /// Publish a finished node's result under its declared outputs.
    ///
    /// A single declared output receives the whole value. With several outputs,
    /// an object result is split by output name; otherwise the whole value goes
    /// to the first output. Returns the keys written.
    ///
    /// Either every key is written or none is.
    pub fn publish(&mut self, node: &Node, value: &Value) -> Result<Vec<String>, ExecutorError> {
        let entries = output_entries(node, value);
        if let Some((key, _)) = entries.iter().find(|(k, _)| self.entries.contains_key(k)) {
            return Err(ExecutorError::ContextKeyConflict(key.clone()));
        }

        // Keys are unique and unwritten, so no insert below can fail half-way.
        let mut written = Vec::with_capacity(entries.len());
        for (key, v) in entries {
            self.insert(key.clone(), v)?;
            written.push(key);
        }
        Ok(written)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cheap snapshot handed to a launched unit.
    pub fn view(&self) -> ContextView {
        ContextView {
            entries: self.entries.clone(),
        }
    }

    pub fn into_map(self) -> BTreeMap<String, Value> {
        Arc::try_unwrap(self.entries).unwrap_or_else(|shared| (*shared).clone())
    }
}

/// Keys are unique: an output declared twice is published once.
fn output_entries(node: &Node, value: &Value) -> Vec<(String, Value)> {
    let mut seen = HashSet::new();
    let outputs: Vec<&String> = node
        .outputs
        .iter()
        .filter(|out| seen.insert(*out))
        .collect();

    match outputs.as_slice() {
        [] => Vec::new(),
        [only] => vec![(node.output_key(only), value.clone())],
        [first, ..] => {
            if let Value::Object(map) = value {
                let split: Vec<(String, Value)> = outputs
                    .iter()
                    .filter_map(|out| map.get(*out).map(|v| (node.output_key(out), v.clone())))
                    .collect();
                if !split.is_empty() {
                    return split;
                }
            }
            vec![(node.output_key(first), value.clone())]
        }
    }
}

/// Read-only snapshot of the context taken when a task was launched.
#[derive(Debug, Clone, Default)]
pub struct ContextView {
    entries: Arc<BTreeMap<String, Value>>,
}

impl ContextView {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn output(&self, node_id: &str, output: &str) -> Option<&Value> {
        self.entries.get(&format!("{node_id}.{output}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<String, Value> {
        (*self.entries).clone()
    }
}

impl From<BTreeMap<String, Value>> for ContextView {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::NodeType;
    use serde_json::json;

    #[test]
    fn test_insert_is_write_once() {
        let mut ctx = SharedContext::new();
        ctx.insert("A.x".into(), json!(5)).unwrap();
        let err = ctx.insert("A.x".into(), json!(6)).unwrap_err();
        assert!(matches!(err, ExecutorError::ContextKeyConflict(k) if k == "A.x"));
        assert_eq!(ctx.get("A.x"), Some(&json!(5)));
    }

    #[test]
    fn test_view_is_a_snapshot() {
        let mut ctx = SharedContext::new();
        ctx.insert("A.x".into(), json!(1)).unwrap();
        let view = ctx.view();
        ctx.insert("B.y".into(), json!(2)).unwrap();

        assert_eq!(view.len(), 1);
        assert_eq!(view.output("A", "x"), Some(&json!(1)));
        assert!(view.get("B.y").is_none());
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_publish_single_output_takes_whole_value() {
        let node = Node::new("A", NodeType::Ai).with_outputs(["answer"]);
        let mut ctx = SharedContext::new();
        let keys = ctx.publish(&node, &json!({"answer": 1, "extra": 2})).unwrap();
        assert_eq!(keys, vec!["A.answer".to_string()]);
        assert_eq!(ctx.get("A.answer"), Some(&json!({"answer": 1, "extra": 2})));
    }

    #[test]
    fn test_publish_multiple_outputs_splits_object() {
        let node = Node::new("A", NodeType::Ai).with_outputs(["title", "body"]);
        let mut ctx = SharedContext::new();
        ctx.publish(&node, &json!({"title": "t", "body": "b"})).unwrap();
        assert_eq!(ctx.get("A.title"), Some(&json!("t")));
        assert_eq!(ctx.get("A.body"), Some(&json!("b")));
    }

    #[test]
    fn test_publish_multiple_outputs_non_object_goes_to_first() {
        let node = Node::new("A", NodeType::Ai).with_outputs(["title", "body"]);
        let mut ctx = SharedContext::new();
        ctx.publish(&node, &json!("plain")).unwrap();
        assert_eq!(ctx.get("A.title"), Some(&json!("plain")));
        assert!(ctx.get("A.body").is_none());
    }

    #[test]
    fn test_publish_repeated_output_is_written_once() {
        let node = Node::new("A", NodeType::Ai).with_outputs(["x", "x"]);
        let mut ctx = SharedContext::new();
        let keys = ctx.publish(&node, &json!({"x": 1})).unwrap();
        assert_eq!(keys, vec!["A.x".to_string()]);
        assert_eq!(ctx.get("A.x"), Some(&json!({"x": 1})));
    }

    #[test]
    fn test_publish_conflict_writes_nothing() {
        let node = Node::new("A", NodeType::Ai).with_outputs(["title", "body"]);
        let mut ctx = SharedContext::new();
        ctx.insert("A.body".into(), json!("old")).unwrap();

        let err = ctx
            .publish(&node, &json!({"title": "t", "body": "b"}))
            .unwrap_err();
        assert!(matches!(err, ExecutorError::ContextKeyConflict(k) if k == "A.body"));
        assert!(ctx.get("A.title").is_none());
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_publish_without_outputs_writes_nothing() {
        let node = Node::new("A", NodeType::Result);
        let mut ctx = SharedContext::new();
        assert!(ctx.publish(&node, &json!(1)).unwrap().is_empty());
        assert!(ctx.is_empty());
    }
}
