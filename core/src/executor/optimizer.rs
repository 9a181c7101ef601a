use std::fmt;

use serde::{Deserialize, Serialize};

use super::sampler::ResourceUsage;
use super::types::{ExecutionStats, ExecutorConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    HighCpu,
    LowCpu,
    HighMemory,
    SlowTasks,
    HighFailureRate,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighCpu => "high_cpu",
            Self::LowCpu => "low_cpu",
            Self::HighMemory => "high_memory",
            Self::SlowTasks => "slow_tasks",
            Self::HighFailureRate => "high_failure_rate",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub issue_type: IssueType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl Recommendation {
    fn concurrency(issue_type: IssueType, message: String, value: usize) -> Self {
        Self {
            issue_type,
            message,
            suggested_concurrency: Some(value),
            suggested_action: None,
        }
    }

    fn action(issue_type: IssueType, message: String, action: &str) -> Self {
        Self {
            issue_type,
            message,
            suggested_concurrency: None,
            suggested_action: Some(action.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub recommendations: Vec<Recommendation>,
    /// 0..=100
    pub health_score: u8,
}

impl OptimizationReport {
    pub fn has(&self, issue: IssueType) -> bool {
        self.recommendations.iter().any(|r| r.issue_type == issue)
    }
}

const HEALTH_CPU_PENALTY: i32 = 20;
const HEALTH_MEMORY_PENALTY: i32 = 20;
const HEALTH_SLOW_PENALTY: i32 = 15;
const HEALTH_FAILURE_PENALTY: i32 = 25;
const CONCURRENCY_STEP: usize = 2;

/// Post-run tuning of the concurrency cap. Holds the executor configuration
/// that the next run is started with.
#[derive(Debug, Clone)]
pub struct PerformanceOptimizer {
    config: ExecutorConfig,
}

impl PerformanceOptimizer {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn analyze(&self, stats: &ExecutionStats, usage: &ResourceUsage) -> OptimizationReport {
        let thresholds = &self.config.optimizer;
        let cap = self.config.max_concurrent_tasks;
        let ceiling = thresholds.concurrency_ceiling.max(1);

        let mut recommendations = Vec::new();
        let mut score: i32 = 100;

        if usage.cpu_percent > thresholds.cpu_high {
            recommendations.push(Recommendation::concurrency(
                IssueType::HighCpu,
                format!(
                    "average CPU {:.1}% above {:.0}%; reduce concurrency",
                    usage.cpu_percent, thresholds.cpu_high
                ),
                cap.saturating_sub(CONCURRENCY_STEP).max(1),
            ));
            score -= HEALTH_CPU_PENALTY;
        } else if usage.cpu_percent < thresholds.cpu_low && cap < ceiling {
            recommendations.push(Recommendation::concurrency(
                IssueType::LowCpu,
                format!(
                    "average CPU {:.1}% below {:.0}%; concurrency can be raised",
                    usage.cpu_percent, thresholds.cpu_low
                ),
                (cap + CONCURRENCY_STEP).min(ceiling),
            ));
        }

        if usage.memory_mb > self.config.memory_ceiling_mb {
            recommendations.push(Recommendation::action(
                IssueType::HighMemory,
                format!(
                    "memory {:.0} MB above ceiling {:.0} MB",
                    usage.memory_mb, self.config.memory_ceiling_mb
                ),
                "reduce payload sizes held in the run context or lower concurrency",
            ));
            score -= HEALTH_MEMORY_PENALTY;
        }

        if stats.average_task_time_ms > thresholds.slow_task_ms {
            recommendations.push(Recommendation::action(
                IssueType::SlowTasks,
                format!(
                    "average task time {:.0} ms exceeds {:.0} ms",
                    stats.average_task_time_ms, thresholds.slow_task_ms
                ),
                "split long-running nodes or cache their inputs",
            ));
            score -= HEALTH_SLOW_PENALTY;
        }

        let failure_ratio = stats.failure_ratio();
        if failure_ratio > thresholds.failure_ratio {
            recommendations.push(Recommendation::action(
                IssueType::HighFailureRate,
                format!(
                    "{} of {} tasks failed ({:.0}%)",
                    stats.failed,
                    stats.total_tasks,
                    failure_ratio * 100.0
                ),
                "inspect failing nodes or enable a retry strategy",
            ));
            score -= HEALTH_FAILURE_PENALTY;
        }

        OptimizationReport {
            recommendations,
            health_score: score.clamp(0, 100) as u8,
        }
    }

    /// Apply a concurrency recommendation. Returns whether the cap changed.
    pub fn apply(&mut self, recommendation: &Recommendation) -> bool {
        let Some(suggested) = recommendation.suggested_concurrency else {
            return false;
        };
        let ceiling = self.config.optimizer.concurrency_ceiling.max(1);
        let next = suggested.clamp(1, ceiling);
        if next == self.config.max_concurrent_tasks {
            return false;
        }

        tracing::info!(
            issue = %recommendation.issue_type,
            from = self.config.max_concurrent_tasks,
            to = next,
            "applying concurrency recommendation"
        );
        self.config.max_concurrent_tasks = next;
        true
    }
}
