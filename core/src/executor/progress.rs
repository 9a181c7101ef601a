use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::traits::{ProgressEvent, ProgressEventKind, ProgressSink};

/// Visual progress monitor for a workflow run
///
/// One overall bar plus a spinner per running task. Driven entirely by
/// progress events, so it can be plugged in next to any other sink.
pub struct ProgressMonitor {
    /// Multi-progress container
    multi: MultiProgress,
    /// Overall progress bar
    overall: ProgressBar,
    /// Per-task spinners, keyed by task id
    task_bars: Mutex<HashMap<String, ProgressBar>>,
    /// Whether monitoring is enabled
    enabled: bool,
}

impl ProgressMonitor {
    /// Create a new progress monitor
    ///
    /// # Arguments
    ///
    /// * `total_tasks` - Number of tasks in the run
    /// * `enabled` - Whether to draw anything (disabled for jsonl output)
    pub fn new(total_tasks: usize, enabled: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                task_bars: Mutex::new(HashMap::new()),
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_tasks as u64));

        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  ");
        overall.set_style(style);
        overall.set_message("Starting...");

        Self {
            multi,
            overall,
            task_bars: Mutex::new(HashMap::new()),
            enabled: true,
        }
    }

    /// Add a task and create its spinner
    pub fn add_task(&self, task_id: &str) {
        if !self.enabled {
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        let style = ProgressStyle::default_spinner()
            .template("  {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        bar.set_style(style);
        bar.set_message(format!("⏳ {}", task_id));
        bar.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut bars) = self.task_bars.lock() {
            bars.insert(task_id.to_string(), bar);
        }
    }

    /// Finish a task's spinner and advance the overall bar
    pub fn complete_task(&self, task_id: &str, success: bool, duration_ms: u64) {
        if !self.enabled {
            return;
        }

        let bar = self.task_bars.lock().ok().and_then(|mut b| b.remove(task_id));
        if let Some(bar) = bar {
            let icon = if success { "✅" } else { "❌" };
            bar.finish_with_message(format!("{} {} ({}ms)", icon, task_id, duration_ms));
        }

        self.overall.inc(1);
    }

    /// Count a task that never ran
    pub fn skip_task(&self, task_id: &str) {
        if !self.enabled {
            return;
        }
        self.overall.println(format!("  ⏭  {} skipped", task_id));
        self.overall.inc(1);
    }

    pub fn set_message(&self, msg: &str) {
        if self.enabled {
            self.overall.set_message(msg.to_string());
        }
    }

    /// Finish overall progress
    pub fn finish(&self, success: bool) {
        if !self.enabled {
            return;
        }

        let msg = if success {
            "✅ All tasks completed"
        } else {
            "❌ Execution failed"
        };

        self.overall.finish_with_message(msg.to_string());
    }

    /// Clear all progress indicators
    pub fn clear(&self) {
        if self.enabled {
            self.overall.finish_and_clear();
        }
    }
}

#[async_trait]
impl ProgressSink for ProgressMonitor {
    fn name(&self) -> &str {
        "progress-bar"
    }

    async fn emit(&self, event: &ProgressEvent) {
        let task_id = event.task_id.as_deref().unwrap_or_default();
        match event.kind {
            ProgressEventKind::RunStarted => self.set_message(&format!("run {}", event.run_id)),
            ProgressEventKind::TaskStarted => self.add_task(task_id),
            ProgressEventKind::TaskCompleted => {
                self.complete_task(task_id, true, event.duration_ms.unwrap_or(0))
            }
            ProgressEventKind::TaskFailed => {
                self.complete_task(task_id, false, event.duration_ms.unwrap_or(0))
            }
            ProgressEventKind::TaskSkipped => self.skip_task(task_id),
            ProgressEventKind::RunFinished => {
                self.finish(event.status.failed == 0 && event.error.is_none())
            }
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        // Ensure all spinners are cleaned up
        if let Ok(mut bars) = self.task_bars.lock() {
            for (_, bar) in bars.drain() {
                bar.finish_and_clear();
            }
        }
    }
}
