use thiserror::Error;

use super::codes::ErrorCode;

/// Executor-specific errors for task graph construction and run control.
///
/// Node-level failures are not represented here: they are recorded on the
/// task and reported through the run result instead.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("No runner registered for node type '{node_type}' (task '{task_id}')")]
    NoRunner { task_id: String, node_type: String },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid transition for task '{task_id}': {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Context key already written: {0}")]
    ContextKeyConflict(String),

    #[error("Executor is already running a workflow")]
    AlreadyRunning,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Map executor error to protocol error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DuplicateTaskId(_) => ErrorCode::ValidationError,
            Self::CircularDependency(_) => ErrorCode::CircularDependency,
            Self::NoRunner { .. } => ErrorCode::RunnerNotFound,
            Self::TaskNotFound(_) => ErrorCode::TaskNotFound,
            Self::InvalidTransition { .. } => ErrorCode::GeneralError,
            Self::ContextKeyConflict(_) => ErrorCode::GeneralError,
            Self::AlreadyRunning => ErrorCode::Busy,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
        }
    }

    /// True for errors caused by a malformed workflow graph.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTaskId(_) | Self::CircularDependency(_) | Self::NoRunner { .. }
        )
    }
}
