use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ExecutorError, NodeError};
use crate::workflow::{Node, Workflow};

use super::cancel::CancelSignal;
use super::context::SharedContext;
use super::graph::TaskGraph;
use super::optimizer::{OptimizationReport, PerformanceOptimizer, Recommendation};
use super::progress::ProgressMonitor;
use super::registry::NodeRunnerRegistry;
use super::sampler::{ResourceProbe, ResourceSampler, ResourceUsage};
use super::scheduler::Scheduler;
use super::traits::{
    NodeContext, NodeRunner, ProgressEvent, ProgressEventKind, ProgressSink, RetryStrategyPlugin,
};
use super::types::{
    ExecutionStats, ExecutorConfig, PartitionCounts, RunResult, RunStatus, Task, TaskStatus,
};

/// Snapshot returned by [`Executor::performance_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    /// Stats of the last finished run, if any
    pub last_run: Option<ExecutionStats>,
    pub current_usage: ResourceUsage,
    pub average_usage: ResourceUsage,
    pub partitions: PartitionCounts,
    pub max_concurrent_tasks: usize,
}

/// Concurrent workflow executor.
///
/// Builds the task graph once per run, admits ready tasks while the resource
/// sampler allows it and never runs more than `max_concurrent_tasks` units at
/// a time. One run at a time per instance.
pub struct Executor {
    registry: Arc<NodeRunnerRegistry>,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
    optimizer: Mutex<PerformanceOptimizer>,
    sampler: Arc<ResourceSampler>,
    running: AtomicBool,
    status: Mutex<PartitionCounts>,
    last_run: Mutex<Option<(ExecutionStats, ResourceUsage)>>,
}

pub struct ExecutorBuilder {
    config: ExecutorConfig,
    registry: NodeRunnerRegistry,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
    probe: Option<Box<dyn ResourceProbe>>,
}

impl ExecutorBuilder {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            registry: NodeRunnerRegistry::new(),
            retry_strategy: None,
            probe: None,
        }
    }

    pub fn registry(mut self, registry: NodeRunnerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn retry_strategy(mut self, strategy: Arc<dyn RetryStrategyPlugin>) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    /// Replace the default `sysinfo` probe.
    pub fn probe(mut self, probe: Box<dyn ResourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> Executor {
        let sampler = match self.probe {
            Some(probe) => ResourceSampler::new(&self.config, probe),
            None => ResourceSampler::system(&self.config),
        };

        Executor {
            registry: Arc::new(self.registry),
            retry_strategy: self.retry_strategy,
            optimizer: Mutex::new(PerformanceOptimizer::new(self.config)),
            sampler: Arc::new(sampler),
            running: AtomicBool::new(false),
            status: Mutex::new(PartitionCounts::default()),
            last_run: Mutex::new(None),
        }
    }
}

/// Releases the re-entrancy flag on every exit path.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, ExecutorError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ExecutorError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What a finished unit hands back to the driving loop.
struct UnitOutcome {
    task_id: String,
    result: Result<Value, NodeError>,
    retries: u32,
}

impl Executor {
    pub fn new(config: ExecutorConfig, registry: NodeRunnerRegistry) -> Self {
        Self::builder(config).registry(registry).build()
    }

    pub fn builder(config: ExecutorConfig) -> ExecutorBuilder {
        ExecutorBuilder::new(config)
    }

    /// Configuration the next run starts with.
    pub fn config(&self) -> ExecutorConfig {
        match self.optimizer.lock() {
            Ok(opt) => opt.config().clone(),
            Err(poisoned) => poisoned.into_inner().config().clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn sampler(&self) -> &ResourceSampler {
        &self.sampler
    }

    /// Live partition counts; can be polled while a run is in progress.
    pub fn status(&self) -> PartitionCounts {
        self.status.lock().map(|s| *s).unwrap_or_default()
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        let last_run = self
            .last_run
            .lock()
            .ok()
            .and_then(|l| l.as_ref().map(|(stats, _)| stats.clone()));

        PerformanceStats {
            last_run,
            current_usage: self.sampler.current_usage(),
            average_usage: self.sampler.average_usage(self.usage_window()),
            partitions: self.status(),
            max_concurrent_tasks: self.config().max_concurrent_tasks,
        }
    }

    /// Analyse the last finished run. `None` before the first run.
    pub fn optimize(&self) -> Option<OptimizationReport> {
        let (stats, usage) = self.last_run.lock().ok()?.clone()?;
        let optimizer = self.optimizer.lock().ok()?;
        Some(optimizer.analyze(&stats, &usage))
    }

    /// Apply a recommendation to the configuration of the next run.
    pub fn apply_recommendation(
        &self,
        recommendation: &Recommendation,
    ) -> Result<bool, ExecutorError> {
        let _guard = RunGuard::acquire(&self.running)?;
        let mut optimizer = self
            .optimizer
            .lock()
            .map_err(|_| ExecutorError::Config("optimizer state poisoned".into()))?;
        let changed = optimizer.apply(recommendation);
        if changed {
            self.sampler
                .set_max_concurrent(optimizer.config().max_concurrent_tasks);
        }
        Ok(changed)
    }

    pub async fn run(
        &self,
        workflow: &Workflow,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> Result<RunResult, ExecutorError> {
        self.run_with_cancel(workflow, sink, CancelSignal::new())
            .await
    }

    /// Run a workflow to completion, failure or cancellation.
    ///
    /// Graph errors and a concurrent run on the same instance are returned as
    /// `Err`; node failures are recorded in the returned [`RunResult`].
    pub async fn run_with_cancel(
        &self,
        workflow: &Workflow,
        sink: Option<Arc<dyn ProgressSink>>,
        cancel: CancelSignal,
    ) -> Result<RunResult, ExecutorError> {
        let _guard = RunGuard::acquire(&self.running)?;
        let config = self.config();

        let run_id = workflow
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let graph = TaskGraph::build(&workflow.nodes, &workflow.edges, &self.registry)?;
        let total_tasks = graph.len();

        let mut sinks: Vec<Arc<dyn ProgressSink>> = sink.into_iter().collect();
        if config.progress_bar {
            sinks.push(Arc::new(ProgressMonitor::new(total_tasks, true)));
        }

        let mut run = RunState {
            run_id,
            scheduler: Scheduler::new(graph),
            context: SharedContext::new(),
            sinks,
            status: &self.status,
            peak_running: 0,
        };
        run.publish_status();

        self.sampler.set_max_concurrent(config.max_concurrent_tasks);
        self.sampler.set_active_tasks(0);
        self.sampler.clear_history();
        self.sampler.reset_peaks();
        self.sampler.sample_now();
        self.sampler.start();

        tracing::info!(
            run_id = %run.run_id,
            tasks = total_tasks,
            max_concurrent = config.max_concurrent_tasks,
            "workflow run started"
        );
        run.emit(ProgressEvent::new(
            ProgressEventKind::RunStarted,
            &run.run_id,
            run.scheduler.status(),
        ))
        .await;

        let started = Instant::now();
        let driven = self.drive(&mut run, &config, &cancel).await;

        self.sampler.stop().await;
        self.sampler.set_active_tasks(0);
        let cancelled = driven?;

        let stats = self.collect_stats(&run, &config, started.elapsed());
        let status = if cancelled {
            RunStatus::Cancelled
        } else if stats.failed > 0 {
            RunStatus::Failure
        } else {
            RunStatus::Success
        };

        let usage = self.sampler.average_usage(self.usage_window());
        if let Ok(mut last) = self.last_run.lock() {
            *last = Some((stats.clone(), usage));
        }

        tracing::info!(
            run_id = %run.run_id,
            status = ?status,
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            duration_ms = stats.total_execution_time_ms,
            "workflow run finished"
        );
        let finished = ProgressEvent::new(
            ProgressEventKind::RunFinished,
            &run.run_id,
            run.scheduler.status(),
        )
        .duration(Some(stats.total_execution_time_ms))
        .error(cancelled.then(|| "run cancelled".to_string()));
        run.emit(finished).await;

        Ok(RunResult {
            run_id: run.run_id.clone(),
            status,
            partitions: run.scheduler.status(),
            tasks: run.scheduler.outcomes(),
            stats,
            context: run.context.into_map(),
        })
    }

    /// Main loop. Returns whether the run was cancelled.
    async fn drive(
        &self,
        run: &mut RunState<'_>,
        config: &ExecutorConfig,
        cancel: &CancelSignal,
    ) -> Result<bool, ExecutorError> {
        let max_concurrent = config.max_concurrent_tasks.max(1);
        let backoff = Duration::from_millis(config.overload_backoff_ms.max(1));
        let deadline = (config.task_timeout_ms > 0)
            .then(|| Duration::from_millis(config.task_timeout_ms));

        let mut units: FuturesUnordered<BoxFuture<'static, UnitOutcome>> =
            FuturesUnordered::new();
        let mut cancelled = false;

        loop {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
                tracing::warn!(
                    run_id = %run.run_id,
                    in_flight = units.len(),
                    "run cancelled, draining in-flight tasks"
                );
            }

            if !cancelled {
                while !self.sampler.overloaded() {
                    let Some(task_id) = run.scheduler.next_ready(max_concurrent) else {
                        break;
                    };
                    self.sampler.set_active_tasks(run.scheduler.running_count());

                    let task = run
                        .scheduler
                        .task(&task_id)
                        .ok_or_else(|| ExecutorError::TaskNotFound(task_id.clone()))?;
                    let node_ctx = NodeContext {
                        run_id: run.run_id.clone(),
                        task_id: task_id.clone(),
                        attempt: 0,
                        view: run.context.view(),
                        cancel: cancel.child(),
                    };
                    units.push(launch_unit(
                        task,
                        node_ctx,
                        deadline,
                        self.retry_strategy.clone(),
                    ));

                    tracing::debug!(
                        run_id = %run.run_id,
                        task_id = %task_id,
                        priority = task.priority,
                        running = run.scheduler.running_count(),
                        "task admitted"
                    );

                    run.peak_running = run.peak_running.max(run.scheduler.running_count());
                    run.publish_status();
                    run.emit(
                        ProgressEvent::new(
                            ProgressEventKind::TaskStarted,
                            &run.run_id,
                            run.scheduler.status(),
                        )
                        .task(&task_id),
                    )
                    .await;
                }
            }

            if units.is_empty() && (cancelled || run.scheduler.is_idle()) {
                break;
            }

            // Ready work held back by host pressure: poll again after the backoff.
            // A full set of slots only frees up when a unit finishes.
            let blocked = !cancelled
                && run.scheduler.has_ready()
                && (units.is_empty() || self.sampler.under_pressure());

            tokio::select! {
                Some(outcome) = units.next(), if !units.is_empty() => {
                    run.finish_unit(outcome).await?;
                    self.sampler.set_active_tasks(run.scheduler.running_count());
                }
                _ = tokio::time::sleep(backoff), if blocked => {
                    tracing::trace!(run_id = %run.run_id, "admission paused by resource gate");
                }
                _ = cancel.cancelled(), if !cancelled => {}
                else => break,
            }
        }

        if cancelled {
            let skipped = run.scheduler.skip_remaining("run cancelled");
            for task_id in &skipped {
                run.emit(
                    ProgressEvent::new(
                        ProgressEventKind::TaskSkipped,
                        &run.run_id,
                        run.scheduler.status(),
                    )
                    .task(task_id)
                    .error(Some("run cancelled".to_string())),
                )
                .await;
            }
            run.publish_status();
        }

        Ok(cancelled)
    }

    fn collect_stats(
        &self,
        run: &RunState<'_>,
        config: &ExecutorConfig,
        elapsed: Duration,
    ) -> ExecutionStats {
        let outcomes = run.scheduler.outcomes();
        let durations: Vec<u64> = outcomes
            .iter()
            .filter(|o| matches!(o.status, TaskStatus::Completed | TaskStatus::Failed))
            .filter_map(|o| o.duration_ms)
            .collect();
        let average_task_time_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };

        let counts = run.scheduler.status();
        let (peak_cpu_percent, peak_memory_mb) = self.sampler.peaks();

        ExecutionStats {
            total_tasks: counts.total(),
            completed: counts.completed,
            failed: counts.failed,
            skipped: counts.skipped,
            total_execution_time_ms: elapsed.as_millis() as u64,
            average_task_time_ms,
            peak_cpu_percent,
            peak_memory_mb,
            peak_running: run.peak_running,
            max_concurrent_tasks: config.max_concurrent_tasks,
        }
    }

    fn usage_window(&self) -> Duration {
        let sampler = self.config().sampler;
        Duration::from_millis(sampler.interval_ms.saturating_mul(sampler.history_size as u64))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("registry", &self.registry)
            .field("retry_strategy", &self.retry_strategy.as_ref().map(|s| s.name()))
            .field("running", &self.is_running())
            .field("sampler", &self.sampler)
            .finish()
    }
}

/// Per-run state owned by the driving loop.
struct RunState<'a> {
    run_id: String,
    scheduler: Scheduler,
    context: SharedContext,
    sinks: Vec<Arc<dyn ProgressSink>>,
    status: &'a Mutex<PartitionCounts>,
    peak_running: usize,
}

impl RunState<'_> {
    fn publish_status(&self) {
        if let Ok(mut status) = self.status.lock() {
            *status = self.scheduler.status();
        }
    }

    async fn emit(&self, event: ProgressEvent) {
        for sink in &self.sinks {
            sink.emit(&event).await;
        }
    }

    async fn finish_unit(&mut self, outcome: UnitOutcome) -> Result<(), ExecutorError> {
        let UnitOutcome {
            task_id,
            result,
            retries,
        } = outcome;
        self.scheduler.set_retry_count(&task_id, retries);

        let result = match result {
            Ok(value) => self.publish(&task_id, &value).map(|()| value),
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => {
                let promoted = self.scheduler.complete(&task_id, value.clone())?;
                let duration = self.scheduler.task(&task_id).and_then(Task::duration_ms);
                tracing::debug!(
                    run_id = %self.run_id,
                    task_id = %task_id,
                    promoted = ?promoted,
                    "task completed"
                );
                self.publish_status();
                self.emit(
                    ProgressEvent::new(
                        ProgressEventKind::TaskCompleted,
                        &self.run_id,
                        self.scheduler.status(),
                    )
                    .task(&task_id)
                    .result(Some(value))
                    .duration(duration),
                )
                .await;
            }
            Err(err) => {
                let message = err.to_string();
                let skipped = self.scheduler.fail(&task_id, message.clone())?;
                let duration = self.scheduler.task(&task_id).and_then(Task::duration_ms);
                tracing::error!(
                    run_id = %self.run_id,
                    task_id = %task_id,
                    code = err.error_code().as_u16(),
                    retries,
                    error = %message,
                    "task failed"
                );
                self.publish_status();
                self.emit(
                    ProgressEvent::new(
                        ProgressEventKind::TaskFailed,
                        &self.run_id,
                        self.scheduler.status(),
                    )
                    .task(&task_id)
                    .error(Some(message))
                    .duration(duration),
                )
                .await;

                for skipped_id in &skipped {
                    let reason = self
                        .scheduler
                        .task(skipped_id)
                        .and_then(|t| t.error.clone());
                    self.emit(
                        ProgressEvent::new(
                            ProgressEventKind::TaskSkipped,
                            &self.run_id,
                            self.scheduler.status(),
                        )
                        .task(skipped_id)
                        .error(reason),
                    )
                    .await;
                }
            }
        }

        Ok(())
    }

    /// Write a finished task's outputs. A key conflict fails only that task.
    fn publish(&mut self, task_id: &str, value: &Value) -> Result<(), NodeError> {
        let node = self
            .scheduler
            .task(task_id)
            .map(|t| t.node.clone())
            .ok_or_else(|| NodeError::failed(format!("unknown task '{task_id}'")))?;

        self.context
            .publish(&node, value)
            .map(|_| ())
            .map_err(|e| NodeError::failed(e.to_string()))
    }
}

/// Package one task as a self-contained future: retries, deadline and
/// cancellation all happen inside the unit.
fn launch_unit(
    task: &Task,
    ctx: NodeContext,
    deadline: Option<Duration>,
    retry: Option<Arc<dyn RetryStrategyPlugin>>,
) -> BoxFuture<'static, UnitOutcome> {
    let runner = task.runner.clone();
    let node = task.node.clone();

    async move {
        let mut attempt: u32 = 0;
        loop {
            let attempt_ctx = NodeContext {
                attempt,
                ..ctx.clone()
            };
            let err = match run_attempt(runner.as_ref(), &node, &attempt_ctx, deadline).await {
                Ok(value) => {
                    return UnitOutcome {
                        task_id: ctx.task_id,
                        result: Ok(value),
                        retries: attempt,
                    }
                }
                Err(err) => err,
            };

            let next = attempt + 1;
            let delay = retry
                .as_ref()
                .filter(|s| !ctx.cancel.is_cancelled() && s.should_retry(next, &err))
                .and_then(|s| s.next_delay(next, &err));

            let Some(delay) = delay else {
                return UnitOutcome {
                    task_id: ctx.task_id,
                    result: Err(err),
                    retries: attempt,
                };
            };

            tracing::warn!(
                task_id = %ctx.task_id,
                attempt = next,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying task"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancel.cancelled() => {
                    return UnitOutcome {
                        task_id: ctx.task_id.clone(),
                        result: Err(NodeError::Cancelled),
                        retries: attempt,
                    };
                }
            }
            attempt = next;
        }
    }
    .boxed()
}

async fn run_attempt(
    runner: &dyn NodeRunner,
    node: &Node,
    ctx: &NodeContext,
    deadline: Option<Duration>,
) -> Result<Value, NodeError> {
    let call = async {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(NodeError::Cancelled),
            result = runner.run_node(node, ctx) => result,
        }
    };

    let Some(limit) = deadline else {
        return call.await;
    };

    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            ctx.cancel.cancel();
            Err(NodeError::Timeout(limit.as_millis() as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::registry::FnRunner;
    use crate::executor::sampler::StaticProbe;
    use crate::workflow::{Edge, NodeType};

    fn executor(registry: NodeRunnerRegistry) -> Executor {
        let config = ExecutorConfig {
            max_concurrent_tasks: 4,
            ..ExecutorConfig::default()
        };
        Executor::builder(config)
            .registry(registry)
            .probe(Box::new(StaticProbe::new(1.0, 1.0)))
            .build()
    }

    fn echo_registry() -> NodeRunnerRegistry {
        NodeRunnerRegistry::new().with_fallback(Arc::new(FnRunner::new(
            "echo",
            |node: Arc<Node>, _ctx| async move { Ok(Value::String(node.id.clone())) },
        )))
    }

    #[tokio::test]
    async fn test_empty_workflow_succeeds() {
        let exec = executor(echo_registry());
        let result = exec.run(&Workflow::default(), None).await.unwrap();
        assert!(result.is_success());
        assert!(result.context.is_empty());
        assert_eq!(result.stats.total_tasks, 0);
    }

    #[tokio::test]
    async fn test_chain_publishes_outputs() {
        let exec = executor(echo_registry());
        let wf = Workflow::new(
            vec![
                Node::new("a", NodeType::Ai).with_outputs(["out"]),
                Node::new("b", NodeType::Ai).with_outputs(["out"]),
            ],
            vec![Edge::new("a", "b")],
        );
        let result = exec.run(&wf, None).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.context["a.out"], Value::String("a".into()));
        assert_eq!(result.context["b.out"], Value::String("b".into()));
        assert_eq!(exec.status().completed, 2);
        assert!(!exec.is_running());
    }

    #[tokio::test]
    async fn test_graph_error_releases_guard() {
        let exec = executor(echo_registry());
        let wf = Workflow::new(
            vec![Node::new("a", NodeType::Ai), Node::new("a", NodeType::Ai)],
            vec![],
        );
        assert!(matches!(
            exec.run(&wf, None).await,
            Err(ExecutorError::DuplicateTaskId(_))
        ));
        assert!(!exec.is_running());
        assert!(exec.run(&Workflow::default(), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_optimize_requires_a_finished_run() {
        let exec = executor(echo_registry());
        assert!(exec.optimize().is_none());
        exec.run(&Workflow::default(), None).await.unwrap();
        let report = exec.optimize().unwrap();
        assert!(report.health_score <= 100);
    }
}
