use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use taskflow_core::executor::{ProgressEvent, ProgressEventKind, ProgressSink};

pub struct JsonlRendererPlugin {
    pretty_print: bool,
}

impl JsonlRendererPlugin {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn event_type(kind: ProgressEventKind) -> &'static str {
        match kind {
            ProgressEventKind::RunStarted => "run.start",
            ProgressEventKind::TaskStarted => "task.start",
            ProgressEventKind::TaskCompleted => "task.end",
            ProgressEventKind::TaskFailed => "task.error",
            ProgressEventKind::TaskSkipped => "task.skip",
            ProgressEventKind::RunFinished => "run.end",
        }
    }

    fn event_to_json(&self, event: &ProgressEvent) -> Value {
        let mut value = json!({
            "v": 1,
            "event_type": Self::event_type(event.kind),
            "ts": Local::now().to_rfc3339(),
            "run_id": event.run_id,
            "metadata": {
                "status": event.status,
            }
        });

        if let Some(task_id) = &event.task_id {
            value["task_id"] = json!(task_id);
        }
        if let Some(result) = &event.result {
            value["output"] = result.clone();
        }
        if let Some(error) = &event.error {
            value["error"] = json!(error);
        }
        if let Some(duration_ms) = event.duration_ms {
            value["metadata"]["duration_ms"] = json!(duration_ms);
        }
        if event.kind == ProgressEventKind::RunFinished {
            value["metadata"]["success"] = json!(event.status.failed == 0 && event.error.is_none());
        }

        value
    }
}

#[async_trait]
impl ProgressSink for JsonlRendererPlugin {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    async fn emit(&self, event: &ProgressEvent) {
        let value = self.event_to_json(event);
        if self.pretty_print {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".into()));
        } else {
            println!("{}", serde_json::to_string(&value).unwrap_or_else(|_| "{}".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow_core::executor::PartitionCounts;

    fn counts() -> PartitionCounts {
        PartitionCounts {
            pending: 1,
            running: 1,
            completed: 2,
            ..PartitionCounts::default()
        }
    }

    #[test]
    fn test_jsonl_renderer_event_type() {
        let renderer = JsonlRendererPlugin::new(false);
        let event = ProgressEvent::new(ProgressEventKind::RunStarted, "run", counts());

        let value = renderer.event_to_json(&event);
        assert_eq!(value["event_type"], "run.start");
        assert_eq!(value["metadata"]["status"]["completed"], 2);
        assert!(value.get("task_id").is_none());
    }

    #[test]
    fn test_jsonl_renderer_task_complete() {
        let renderer = JsonlRendererPlugin::new(false);
        let event = ProgressEvent::new(ProgressEventKind::TaskCompleted, "run", counts())
            .task("task")
            .result(Some(json!({"answer": 42})))
            .duration(Some(12));

        let value = renderer.event_to_json(&event);
        assert_eq!(value["event_type"], "task.end");
        assert_eq!(value["task_id"], "task");
        assert_eq!(value["output"]["answer"], 42);
        assert_eq!(value["metadata"]["duration_ms"], 12);
    }

    #[test]
    fn test_jsonl_renderer_run_end() {
        let renderer = JsonlRendererPlugin::new(false);
        let event = ProgressEvent::new(ProgressEventKind::RunFinished, "run", counts())
            .error(Some("run cancelled".into()));

        let value = renderer.event_to_json(&event);
        assert_eq!(value["event_type"], "run.end");
        assert_eq!(value["metadata"]["success"], false);
        assert_eq!(value["error"], "run cancelled");
    }
}
