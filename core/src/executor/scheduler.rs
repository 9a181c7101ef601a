use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use chrono::Utc;
use serde_json::Value;

use crate::error::ExecutorError;

use super::graph::TaskGraph;
use super::types::{PartitionCounts, Task, TaskOutcome, TaskStatus};

/// Ready-queue scheduler over a [`TaskGraph`].
///
/// Every task id lives in exactly one partition, mirrored by `Task::status`.
/// `ready` is ordered highest priority first.
#[derive(Debug)]
pub struct Scheduler {
    tasks: HashMap<String, Task>,
    insertion_order: Vec<String>,
    pending: HashSet<String>,
    ready: VecDeque<String>,
    running: HashSet<String>,
    completed: Vec<String>,
    failed: Vec<String>,
    skipped: Vec<String>,
}

impl Scheduler {
    pub fn new(graph: TaskGraph) -> Self {
        let seeds = graph.initial_ready();
        let insertion_order = graph.insertion_order().to_vec();
        let mut tasks = graph.tasks;

        let mut ready = VecDeque::with_capacity(seeds.len());
        for id in seeds {
            if let Some(task) = tasks.get_mut(&id) {
                task.status = TaskStatus::Ready;
            }
            ready.push_back(id);
        }

        let pending = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
            .collect();

        Self {
            tasks,
            insertion_order,
            pending,
            ready,
            running: HashSet::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Admit the head of the ready queue if fewer than `max_concurrent` tasks
    /// are running. The admitted task is started before it is returned.
    /// Refusal has no side effects.
    pub fn next_ready(&mut self, max_concurrent: usize) -> Option<String> {
        if self.running.len() >= max_concurrent {
            return None;
        }
        let id = self.ready.front()?.clone();
        self.start(&id).ok()?;
        Some(id)
    }

    /// Move a ready task to running and stamp its start time.
    pub fn start(&mut self, task_id: &str) -> Result<(), ExecutorError> {
        self.expect_status(task_id, TaskStatus::Ready, TaskStatus::Running)?;

        if let Some(pos) = self.ready.iter().position(|id| id == task_id) {
            self.ready.remove(pos);
        }
        self.running.insert(task_id.to_string());

        let task = self.task_mut(task_id)?;
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark a running task completed and promote dependents whose
    /// dependencies are now all completed. Returns the promoted ids.
    pub fn complete(&mut self, task_id: &str, result: Value) -> Result<Vec<String>, ExecutorError> {
        self.expect_status(task_id, TaskStatus::Running, TaskStatus::Completed)?;

        self.running.remove(task_id);
        self.completed.push(task_id.to_string());

        let dependents = {
            let task = self.task_mut(task_id)?;
            task.status = TaskStatus::Completed;
            task.ended_at = Some(Utc::now());
            task.result = Some(result);
            task.dependents.clone()
        };

        let mut promoted = Vec::new();
        for dependent in dependents {
            if !self.pending.contains(&dependent) || !self.dependencies_met(&dependent) {
                continue;
            }
            self.pending.remove(&dependent);
            self.enqueue_ready(&dependent);
            promoted.push(dependent);
        }

        Ok(promoted)
    }

    /// Mark a running task failed. Every transitive dependent still pending
    /// is moved to `skipped`; returns the skipped ids.
    pub fn fail(&mut self, task_id: &str, error: String) -> Result<Vec<String>, ExecutorError> {
        self.expect_status(task_id, TaskStatus::Running, TaskStatus::Failed)?;

        self.running.remove(task_id);
        self.failed.push(task_id.to_string());

        let dependents = {
            let task = self.task_mut(task_id)?;
            task.status = TaskStatus::Failed;
            task.ended_at = Some(Utc::now());
            task.error = Some(error);
            task.dependents.clone()
        };

        let reason = format!("upstream task '{task_id}' failed");
        let mut skipped = Vec::new();
        let mut frontier: VecDeque<String> = dependents.into_iter().collect();

        while let Some(id) = frontier.pop_front() {
            if !self.pending.remove(&id) {
                continue;
            }
            let next = {
                let task = self.task_mut(&id)?;
                task.status = TaskStatus::Skipped;
                task.error = Some(reason.clone());
                task.dependents.clone()
            };
            self.skipped.push(id.clone());
            skipped.push(id);
            frontier.extend(next);
        }

        Ok(skipped)
    }

    /// Skip every task that has not started yet (used when a run is cancelled).
    pub fn skip_remaining(&mut self, reason: &str) -> Vec<String> {
        let mut ids: Vec<String> = self.ready.drain(..).collect();
        ids.extend(self.pending.drain());
        ids.sort_by_key(|id| self.tasks.get(id).map(|t| t.order).unwrap_or(usize::MAX));

        for id in &ids {
            if let Some(task) = self.tasks.get_mut(id) {
                task.status = TaskStatus::Skipped;
                task.error = Some(reason.to_string());
            }
            self.skipped.push(id.clone());
        }
        ids
    }

    pub fn set_retry_count(&mut self, task_id: &str, retries: u32) {
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.retry_count = retries;
        }
    }

    pub fn status(&self) -> PartitionCounts {
        PartitionCounts {
            pending: self.pending.len(),
            ready: self.ready.len(),
            running: self.running.len(),
            completed: self.completed.len(),
            failed: self.failed.len(),
            skipped: self.skipped.len(),
        }
    }

    /// No task is running and none is ready: no further progress is possible.
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.running.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    #[cfg(test)]
    fn ready_ids(&self) -> Vec<String> {
        self.ready.iter().cloned().collect()
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Final per-task records in workflow order
    pub fn outcomes(&self) -> Vec<TaskOutcome> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .map(TaskOutcome::from)
            .collect()
    }

    fn dependencies_met(&self, task_id: &str) -> bool {
        let Some(task) = self.tasks.get(task_id) else {
            return false;
        };
        let deps: &BTreeSet<String> = &task.dependencies;
        deps.iter().all(|dep| {
            self.tasks
                .get(dep)
                .is_some_and(|d| d.status == TaskStatus::Completed)
        })
    }

    /// Stable insertion: after every ready task with priority >= this one.
    fn enqueue_ready(&mut self, task_id: &str) {
        let Some(priority) = self.tasks.get(task_id).map(|t| t.priority) else {
            return;
        };
        let tasks = &self.tasks;
        let pos = self
            .ready
            .partition_point(|id| tasks.get(id).map(|t| t.priority).unwrap_or(0) >= priority);
        self.ready.insert(pos, task_id.to_string());

        if let Some(task) = self.tasks.get_mut(task_id) {
            task.status = TaskStatus::Ready;
        }
    }

    fn expect_status(
        &self,
        task_id: &str,
        expected: TaskStatus,
        to: TaskStatus,
    ) -> Result<(), ExecutorError> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| ExecutorError::TaskNotFound(task_id.to_string()))?;
        if task.status != expected {
            return Err(ExecutorError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status.as_str(),
                to: to.as_str(),
            });
        }
        Ok(())
    }

    fn task_mut(&mut self, task_id: &str) -> Result<&mut Task, ExecutorError> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| ExecutorError::TaskNotFound(task_id.to_string()))
    }
}
