use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::task::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
    Cancelled,
}

/// Number of tasks in each scheduler partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCounts {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl PartitionCounts {
    pub fn total(&self) -> usize {
        self.pending + self.ready + self.running + self.completed + self.failed + self.skipped
    }

    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Aggregate statistics of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_execution_time_ms: u64,
    /// Mean duration of tasks that actually ran
    pub average_task_time_ms: f64,
    pub peak_cpu_percent: f32,
    pub peak_memory_mb: f64,
    /// Highest number of tasks observed running at once
    pub peak_running: usize,
    pub max_concurrent_tasks: usize,
}

impl ExecutionStats {
    pub fn failure_ratio(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.failed as f64 / self.total_tasks as f64
    }
}

/// Final record of a single task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    pub priority: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
}

impl From<&Task> for TaskOutcome {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            priority: task.priority,
            started_at: task.started_at,
            ended_at: task.ended_at,
            duration_ms: task.duration_ms(),
            result: task.result.clone(),
            error: task.error.clone(),
            retry_count: task.retry_count,
        }
    }
}

/// Result of executing a workflow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    /// Shared execution context accumulated during the run (partial on failure)
    pub context: BTreeMap<String, Value>,
    pub stats: ExecutionStats,
    pub partitions: PartitionCounts,
    /// Per-task outcomes in workflow order
    pub tasks: Vec<TaskOutcome>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn ids_with_status(&self, status: TaskStatus) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.task_id.clone())
            .collect()
    }

    pub fn completed_ids(&self) -> Vec<String> {
        self.ids_with_status(TaskStatus::Completed)
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.ids_with_status(TaskStatus::Failed)
    }

    pub fn skipped_ids(&self) -> Vec<String> {
        self.ids_with_status(TaskStatus::Skipped)
    }
}
