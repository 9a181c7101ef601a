use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executor::traits::NodeRunner;
use crate::workflow::Node;

/// Lifecycle of a task within one run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    /// Never run because an upstream task failed
    Skipped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run execution record for one workflow node.
#[derive(Clone)]
pub struct Task {
    pub id: String,
    pub node: Arc<Node>,
    /// Runner resolved once when the graph is built
    pub runner: Arc<dyn NodeRunner>,
    pub dependencies: BTreeSet<String>,
    pub dependents: BTreeSet<String>,
    pub status: TaskStatus,
    /// Longest downstream chain length (leaf = 1)
    pub priority: u32,
    /// Discovery order, used as the stable tie-breaker
    pub order: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub retry_count: u32,
}

impl Task {
    pub fn new(node: Arc<Node>, runner: Arc<dyn NodeRunner>, order: usize) -> Self {
        Self {
            id: node.id.clone(),
            node,
            runner,
            dependencies: BTreeSet::new(),
            dependents: BTreeSet::new(),
            status: TaskStatus::Pending,
            priority: 1,
            order,
            started_at: None,
            ended_at: None,
            result: None,
            error: None,
            retry_count: 0,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("runner", &self.runner.name())
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("status", &self.status)
            .field("priority", &self.priority)
            .field("order", &self.order)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}
