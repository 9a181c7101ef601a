use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::executor::types::PartitionCounts;

/// Receives progress events from the executor loop.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    fn name(&self) -> &str;
    async fn emit(&self, event: &ProgressEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    RunStarted,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskSkipped,
    RunFinished,
}

impl ProgressEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::TaskStarted => "task_started",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskSkipped => "task_skipped",
            Self::RunFinished => "run_finished",
        }
    }
}

/// Progress event with a snapshot of the partition counts at emission time.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub kind: ProgressEventKind,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub status: PartitionCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(kind: ProgressEventKind, run_id: &str, status: PartitionCounts) -> Self {
        Self {
            kind,
            run_id: run_id.to_string(),
            task_id: None,
            status,
            result: None,
            error: None,
            duration_ms: None,
            timestamp: Utc::now(),
        }
    }

    pub fn task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn result(mut self, result: Option<Value>) -> Self {
        self.result = result;
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn duration(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}
