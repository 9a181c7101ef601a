#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use taskflow_core::error::NodeError;
use taskflow_core::executor::{
    Executor, ExecutorConfig, FnRunner, NodeRunner, NodeRunnerRegistry, ProgressEvent,
    ProgressEventKind, ProgressSink, SamplerConfig, StaticProbe,
};
use taskflow_core::workflow::{Node, NodeType};

/// Route engine logs to the test harness. `RUST_LOG=taskflow_core=debug` to see them.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(max_concurrent: usize) -> ExecutorConfig {
    ExecutorConfig {
        max_concurrent_tasks: max_concurrent,
        overload_backoff_ms: 5,
        sampler: SamplerConfig {
            interval_ms: 10,
            history_size: 60,
        },
        ..ExecutorConfig::default()
    }
}

pub fn executor_with(config: ExecutorConfig, registry: NodeRunnerRegistry, probe: StaticProbe) -> Executor {
    Executor::builder(config)
        .registry(registry)
        .probe(Box::new(probe))
        .build()
}

/// Executor over an idle fake host.
pub fn executor(registry: NodeRunnerRegistry, max_concurrent: usize) -> Executor {
    executor_with(config(max_concurrent), registry, StaticProbe::new(1.0, 1.0))
}

pub fn node(id: &str, outputs: &[&str]) -> Node {
    Node::new(id, NodeType::Ai).with_outputs(outputs.iter().copied())
}

/// Runner that sleeps for `ms` and returns the node id.
pub fn sleeping(ms: u64) -> Arc<dyn NodeRunner> {
    Arc::new(FnRunner::new("sleep", move |node: Arc<Node>, _ctx| async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(Value::String(node.id.clone()))
    }))
}

pub fn sleeping_registry(ms: u64) -> NodeRunnerRegistry {
    NodeRunnerRegistry::new().with_fallback(sleeping(ms))
}

/// Tracks how many runs are in flight at once.
#[derive(Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn max_seen(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct TrackingRunner {
    pub probe: Arc<ConcurrencyProbe>,
    pub sleep_ms: u64,
}

#[async_trait]
impl NodeRunner for TrackingRunner {
    fn name(&self) -> &str {
        "tracking"
    }

    async fn run_node(
        &self,
        node: &Node,
        _ctx: &taskflow_core::executor::NodeContext,
    ) -> Result<Value, NodeError> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.probe.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.sleep_ms)).await;
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
        Ok(Value::String(node.id.clone()))
    }
}

/// Sink that keeps every event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn task_ids(&self, kind: ProgressEventKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| e.task_id)
            .collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn emit(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
