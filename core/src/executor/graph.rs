use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::ExecutorError;
use crate::workflow::{Edge, Node};

use super::registry::NodeRunnerRegistry;
use super::types::Task;

/// Task dependency graph (DAG) for one run
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Task records: task_id -> Task
    pub tasks: HashMap<String, Task>,

    /// Original insertion order (for stable sorting)
    insertion_order: Vec<String>,

    /// Topological order, dependencies first
    topo_order: Vec<String>,
}

impl TaskGraph {
    /// Construct the task graph from nodes and edges.
    ///
    /// Edges naming unknown nodes are ignored. Duplicate node ids, cycles and
    /// node types without a runner are rejected.
    pub fn build(
        nodes: &[Node],
        edges: &[Edge],
        registry: &NodeRunnerRegistry,
    ) -> Result<Self, ExecutorError> {
        let mut tasks: HashMap<String, Task> = HashMap::with_capacity(nodes.len());
        let mut insertion_order = Vec::with_capacity(nodes.len());

        for (order, node) in nodes.iter().enumerate() {
            if tasks.contains_key(&node.id) {
                return Err(ExecutorError::DuplicateTaskId(node.id.clone()));
            }

            let runner =
                registry
                    .resolve(&node.node_type)
                    .ok_or_else(|| ExecutorError::NoRunner {
                        task_id: node.id.clone(),
                        node_type: node.node_type.to_string(),
                    })?;

            tasks.insert(
                node.id.clone(),
                Task::new(Arc::new(node.clone()), runner, order),
            );
            insertion_order.push(node.id.clone());
        }

        for edge in edges {
            if !tasks.contains_key(&edge.source) || !tasks.contains_key(&edge.target) {
                tracing::warn!(
                    source = %edge.source,
                    target = %edge.target,
                    "ignoring edge that references an unknown node"
                );
                continue;
            }
            if edge.source == edge.target {
                return Err(ExecutorError::CircularDependency(format_cycle_path(&[
                    edge.source.clone(),
                    edge.target.clone(),
                ])));
            }

            if let Some(target) = tasks.get_mut(&edge.target) {
                target.dependencies.insert(edge.source.clone());
            }
            if let Some(source) = tasks.get_mut(&edge.source) {
                source.dependents.insert(edge.target.clone());
            }
        }

        let mut graph = Self {
            tasks,
            insertion_order,
            topo_order: Vec::new(),
        };

        graph.topo_order = graph.topological_sort()?;
        graph.assign_priorities();

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn insertion_order(&self) -> &[String] {
        &self.insertion_order
    }

    pub fn topo_order(&self) -> &[String] {
        &self.topo_order
    }

    /// Task id -> priority, for inspection and tests
    pub fn priorities(&self) -> HashMap<String, u32> {
        self.tasks
            .iter()
            .map(|(id, task)| (id.clone(), task.priority))
            .collect()
    }

    /// Tasks without dependencies, highest priority first, ties by insertion order.
    pub fn initial_ready(&self) -> Vec<String> {
        let mut seeds: Vec<&Task> = self
            .tasks
            .values()
            .filter(|task| task.dependencies.is_empty())
            .collect();
        seeds.sort_by_key(|task| (std::cmp::Reverse(task.priority), task.order));
        seeds.into_iter().map(|task| task.id.clone()).collect()
    }

    /// Topological sort using Kahn's algorithm
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of tasks, E = number of dependencies
    fn topological_sort(&self) -> Result<Vec<String>, ExecutorError> {
        let mut in_degree: HashMap<&str, usize> = self
            .tasks
            .iter()
            .map(|(id, task)| (id.as_str(), task.dependencies.len()))
            .collect();

        // Seed in insertion order for stable output
        let mut queue: VecDeque<&str> = self
            .insertion_order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        let mut sorted = Vec::with_capacity(self.tasks.len());

        while let Some(task_id) = queue.pop_front() {
            sorted.push(task_id.to_string());

            let Some(task) = self.tasks.get(task_id) else {
                continue;
            };
            for dependent in &task.dependents {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        // Verify all nodes processed (no cycles)
        if sorted.len() != self.tasks.len() {
            let cycle = self
                .detect_cycle()
                .unwrap_or_else(|| "unable to complete topological sort".to_string());
            return Err(ExecutorError::CircularDependency(cycle));
        }

        Ok(sorted)
    }

    /// Longest path to a leaf, computed in one reverse-topological pass.
    fn assign_priorities(&mut self) {
        let mut priorities: HashMap<String, u32> = HashMap::with_capacity(self.tasks.len());

        for task_id in self.topo_order.iter().rev() {
            let Some(task) = self.tasks.get(task_id) else {
                continue;
            };
            let longest_dependent = task
                .dependents
                .iter()
                .filter_map(|d| priorities.get(d))
                .copied()
                .max()
                .unwrap_or(0);
            priorities.insert(task_id.clone(), longest_dependent + 1);
        }

        for (task_id, priority) in priorities {
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.priority = priority;
            }
        }
    }

    /// Detect circular dependencies using DFS, returning the cycle path
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(task_id, &mut visited, &mut stack) {
                return Some(format_cycle_path(&stack));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        if let Some(task) = self.tasks.get(node) {
            for dependent in &task.dependents {
                // Dependent already on the current path: cycle
                if let Some(pos) = stack.iter().position(|x| x == dependent) {
                    stack.push(dependent.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dependent) && self.dfs_cycle(dependent, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}

fn format_cycle_path(stack: &[String]) -> String {
    stack.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::registry::FnRunner;
    use crate::workflow::NodeType;
    use serde_json::Value;

    fn registry() -> NodeRunnerRegistry {
        NodeRunnerRegistry::new().with_fallback(Arc::new(FnRunner::new(
            "noop",
            |_node, _ctx| async { Ok(Value::Null) },
        )))
    }

    fn nodes(ids: &[&str]) -> Vec<Node> {
        ids.iter().map(|id| Node::new(*id, NodeType::Ai)).collect()
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<Edge> {
        pairs.iter().map(|(s, t)| Edge::new(*s, *t)).collect()
    }

    #[test]
    fn test_build_dependencies_and_dependents() {
        let graph = TaskGraph::build(
            &nodes(&["a", "b", "c"]),
            &edges(&[("a", "b"), ("a", "c"), ("b", "c")]),
            &registry(),
        )
        .unwrap();

        let c = graph.get("c").unwrap();
        assert_eq!(
            c.dependencies.iter().cloned().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let a = graph.get("a").unwrap();
        assert_eq!(
            a.dependents.iter().cloned().collect::<Vec<_>>(),
            vec!["b", "c"]
        );
        assert_eq!(graph.topo_order(), &["a", "b", "c"]);
    }

    #[test]
    fn test_priority_is_longest_chain_to_leaf() {
        // a -> b -> d -> e, a -> c -> e
        let graph = TaskGraph::build(
            &nodes(&["a", "b", "c", "d", "e"]),
            &edges(&[("a", "b"), ("b", "d"), ("d", "e"), ("a", "c"), ("c", "e")]),
            &registry(),
        )
        .unwrap();

        let p = graph.priorities();
        assert_eq!(p["e"], 1);
        assert_eq!(p["d"], 2);
        assert_eq!(p["c"], 2);
        assert_eq!(p["b"], 3);
        assert_eq!(p["a"], 4);
    }

    #[test]
    fn test_build_is_idempotent() {
        let n = nodes(&["a", "b", "c", "d"]);
        let e = edges(&[("a", "b"), ("a", "c"), ("b", "d")]);
        let first = TaskGraph::build(&n, &e, &registry()).unwrap();
        let second = TaskGraph::build(&n, &e, &registry()).unwrap();
        assert_eq!(first.priorities(), second.priorities());
        assert_eq!(first.initial_ready(), second.initial_ready());
    }

    #[test]
    fn test_initial_ready_sorted_by_priority_then_insertion() {
        // x and y are independent leaves; z heads a 2-chain
        let graph = TaskGraph::build(
            &nodes(&["x", "y", "z", "w"]),
            &edges(&[("z", "w")]),
            &registry(),
        )
        .unwrap();
        assert_eq!(graph.initial_ready(), vec!["z", "x", "y"]);
    }

    #[test]
    fn test_unknown_edges_are_ignored() {
        let graph = TaskGraph::build(
            &nodes(&["a", "b"]),
            &edges(&[("a", "ghost"), ("ghost", "b"), ("a", "b")]),
            &registry(),
        )
        .unwrap();
        assert_eq!(graph.get("b").unwrap().dependencies.len(), 1);
        assert_eq!(graph.get("a").unwrap().dependents.len(), 1);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let err = TaskGraph::build(&nodes(&["a", "a"]), &[], &registry()).unwrap_err();
        assert!(matches!(err, ExecutorError::DuplicateTaskId(id) if id == "a"));
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let err = TaskGraph::build(
            &nodes(&["a", "b", "c", "d"]),
            &edges(&[("a", "b"), ("b", "c"), ("c", "b"), ("c", "d")]),
            &registry(),
        )
        .unwrap_err();

        match err {
            ExecutorError::CircularDependency(path) => {
                assert!(path.contains("b -> c -> b"), "unexpected path: {path}");
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_edge_rejected() {
        let err = TaskGraph::build(&nodes(&["a"]), &edges(&[("a", "a")]), &registry()).unwrap_err();
        assert!(matches!(err, ExecutorError::CircularDependency(_)));
    }

    #[test]
    fn test_missing_runner_rejected() {
        let registry = NodeRunnerRegistry::new();
        let err = TaskGraph::build(&nodes(&["a"]), &[], &registry).unwrap_err();
        assert!(matches!(err, ExecutorError::NoRunner { ref node_type, .. } if node_type == "ai"));
    }
}
