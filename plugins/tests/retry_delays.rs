use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio::time::Instant;

use taskflow_core::error::NodeError;
use taskflow_core::executor::{
    Executor, ExecutorConfig, FnRunner, NodeRunnerRegistry, RetryConfig, RunStatus, StaticProbe,
};
use taskflow_core::workflow::{Node, NodeType, Workflow};
use taskflow_plugins::factory::build_retry;

/// Fails until it has been called `fail_times` times; records each call time.
fn flaky(fail_times: usize, calls: Arc<Mutex<Vec<Instant>>>) -> NodeRunnerRegistry {
    NodeRunnerRegistry::new().with_fallback(Arc::new(FnRunner::new(
        "flaky",
        move |node: Arc<Node>, _ctx| {
            let calls = calls.clone();
            async move {
                let seen = {
                    let mut calls = calls.lock().unwrap();
                    calls.push(Instant::now());
                    calls.len()
                };
                if seen <= fail_times {
                    Err(NodeError::failed("upstream unavailable"))
                } else {
                    Ok(Value::String(node.id.clone()))
                }
            }
        },
    )))
}

async fn gaps_for(strategy: &str) -> Vec<Duration> {
    let retry = RetryConfig {
        strategy: strategy.to_string(),
        base_delay_ms: 100,
        max_delay_ms: 10_000,
        max_attempts: 3,
    };
    let calls = Arc::new(Mutex::new(Vec::new()));
    let exec = Executor::builder(ExecutorConfig::default())
        .registry(flaky(2, calls.clone()))
        .retry_strategy(build_retry(&retry).unwrap().unwrap())
        .probe(Box::new(StaticProbe::new(1.0, 1.0)))
        .build();
    let wf = Workflow::new(vec![Node::new("a", NodeType::Ai)], vec![]);

    let result = exec.run(&wf, None).await.unwrap();
    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.task("a").unwrap().retry_count, 2);

    let calls = calls.lock().unwrap();
    calls.windows(2).map(|w| w[1] - w[0]).collect()
}

#[tokio::test(start_paused = true)]
async fn exponential_first_retry_waits_base_delay() {
    assert_eq!(
        gaps_for("exponential-backoff").await,
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test(start_paused = true)]
async fn linear_retries_grow_by_base_delay() {
    assert_eq!(
        gaps_for("linear").await,
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}
