use async_trait::async_trait;
use taskflow_core::executor::{ProgressEvent, ProgressEventKind, ProgressSink};

pub struct TextRendererPlugin {
    ascii_only: bool,
}

impl TextRendererPlugin {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }

    fn format_event(&self, event: &ProgressEvent) -> String {
        let task = event.task_id.as_deref().unwrap_or("-");
        let s = &event.status;
        match event.kind {
            ProgressEventKind::RunStarted => format!(
                "RUN START {} (tasks: {}, ready: {})",
                event.run_id,
                s.total(),
                s.ready
            ),
            ProgressEventKind::TaskStarted => format!(
                "TASK START {} (task {}, running {})",
                event.run_id, task, s.running
            ),
            ProgressEventKind::TaskCompleted | ProgressEventKind::TaskFailed => {
                let ok = event.kind == ProgressEventKind::TaskCompleted;
                let status = match (ok, self.ascii_only) {
                    (true, true) => "OK",
                    (true, false) => "SUCCESS",
                    (false, true) => "FAIL",
                    (false, false) => "FAILED",
                };
                let mut line = format!(
                    "TASK END {} (task {}, status {}, duration {}ms)",
                    event.run_id,
                    task,
                    status,
                    event.duration_ms.unwrap_or(0)
                );
                if let Some(err) = &event.error {
                    line.push_str(&format!(": {}", err));
                }
                line
            }
            ProgressEventKind::TaskSkipped => {
                let mut line = format!("TASK SKIP {} (task {})", event.run_id, task);
                if let Some(reason) = &event.error {
                    line.push_str(&format!(": {}", reason));
                }
                line
            }
            ProgressEventKind::RunFinished => format!(
                "RUN END {} ({}/{} finished: completed {}, failed {}, skipped {}, duration {}ms)",
                event.run_id,
                s.finished(),
                s.total(),
                s.completed,
                s.failed,
                s.skipped,
                event.duration_ms.unwrap_or(0)
            ),
        }
    }
}

#[async_trait]
impl ProgressSink for TextRendererPlugin {
    fn name(&self) -> &str {
        "text-renderer"
    }

    async fn emit(&self, event: &ProgressEvent) {
        eprintln!("{}", self.format_event(event));
    }
}
