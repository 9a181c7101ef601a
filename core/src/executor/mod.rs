//! Concurrent execution of workflow task graphs.
//!
//! The executor builds a [`TaskGraph`] once per run, hands it to a ready-queue
//! [`Scheduler`] and drives a single cooperative loop that admits tasks while
//! the [`ResourceSampler`] allows it. Finished units publish their outputs to
//! the write-once run context; the [`PerformanceOptimizer`] tunes the
//! concurrency cap between runs.
//!
//! # Architecture
//!
//! ```text
//! Workflow { nodes, edges }
//!   ↓
//! TaskGraph::build() → duplicate / cycle / runner checks, priorities
//!   ↓
//! Scheduler { pending, ready, running, completed, failed, skipped }
//!   ↓
//! Executor::run() ⇄ ResourceSampler::overloaded()
//!   ↓                  FuturesUnordered<unit>
//! RunResult { status, context, stats, tasks }
//!   ↓
//! PerformanceOptimizer::analyze() → OptimizationReport
//! ```

mod cancel;
mod context;
mod engine;
mod graph;
mod optimizer;
mod progress;
mod registry;
mod sampler;
mod scheduler;
pub mod traits;
pub mod types;

pub use cancel::CancelSignal;
pub use context::{ContextView, SharedContext};
pub use engine::{Executor, ExecutorBuilder, PerformanceStats};
pub use graph::TaskGraph;
pub use optimizer::{IssueType, OptimizationReport, PerformanceOptimizer, Recommendation};
pub use progress::ProgressMonitor;
pub use registry::{FnRunner, NodeRunnerRegistry};
pub use sampler::{ResourceProbe, ResourceSampler, ResourceUsage, StaticProbe, SystemProbe};
pub use scheduler::Scheduler;
pub use traits::{
    NodeContext, NodeRunner, ProgressEvent, ProgressEventKind, ProgressSink, RetryStrategyPlugin,
};
pub use types::{
    ExecutionStats, ExecutorConfig, OptimizerConfig, PartitionCounts, RetryConfig, RunResult,
    RunStatus, SamplerConfig, Task, TaskOutcome, TaskStatus,
};
