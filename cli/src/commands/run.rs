use std::sync::Arc;

use serde_json::json;

use taskflow_core::config::AppConfig;
use taskflow_core::error::CliError;
use taskflow_core::executor::types::{ExecutorConfig, RunStatus};
use taskflow_core::executor::{CancelSignal, Executor, ProgressSink};
use taskflow_plugins::factory;

use super::cli::{OutputFormat, RunArgs};
use super::load_workflow;

pub fn apply_run_overrides(args: &RunArgs, cfg: &mut ExecutorConfig) {
    if let Some(n) = args.max_concurrent.filter(|n| *n > 0) {
        cfg.max_concurrent_tasks = n;
    }
    if let Some(ms) = args.timeout_ms {
        cfg.task_timeout_ms = ms;
    }
    // Bars and the text renderer share stderr; the jsonl stream stays clean.
    cfg.progress_bar = args.progress && args.format == OutputFormat::Text;
}

pub fn exit_code_for_status(status: RunStatus) -> i32 {
    match status {
        RunStatus::Success => 0,
        RunStatus::Failure => 1,
        RunStatus::Cancelled => 2,
    }
}

pub async fn run_cmd(args: RunArgs, cfg: AppConfig) -> Result<i32, CliError> {
    let workflow = load_workflow(&args.workflow)?;

    let mut exec_cfg = cfg.executor;
    apply_run_overrides(&args, &mut exec_cfg);

    let retry =
        factory::build_retry(&exec_cfg.retry).map_err(|e| CliError::Config(e.to_string()))?;
    let mut builder = Executor::builder(exec_cfg.clone()).registry(factory::build_registry());
    if let Some(strategy) = retry {
        builder = builder.retry_strategy(strategy);
    }
    let executor = builder.build();

    let sink: Option<Arc<dyn ProgressSink>> = if exec_cfg.progress_bar {
        None
    } else {
        Some(factory::build_sink(args.format.as_str(), args.ascii))
    };

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    tracing::info!(
        workflow = %args.workflow.display(),
        max_concurrent = exec_cfg.max_concurrent_tasks,
        "starting workflow"
    );
    let result = executor.run_with_cancel(&workflow, sink, cancel).await;
    interrupt.abort();
    let result = result?;

    let report = executor.optimize();
    if let Some(report) = report.as_ref() {
        for rec in &report.recommendations {
            tracing::info!(issue = %rec.issue_type, "{}", rec.message);
        }
    }

    let summary = json!({
        "type": "run.result",
        "result": result,
        "optimization": report,
    });
    let rendered = match args.format {
        OutputFormat::Jsonl => serde_json::to_string(&summary),
        OutputFormat::Text => serde_json::to_string_pretty(&summary),
    }
    .map_err(|e| CliError::Anyhow(e.into()))?;
    println!("{rendered}");

    Ok(exit_code_for_status(result.status))
}
