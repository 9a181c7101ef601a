use serde::{Deserialize, Serialize};

/// Executor configuration. Passed explicitly to each `Executor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of tasks running at once
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Host CPU percentage above which admission is paused
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f32,

    /// Process memory (MB) above which admission is paused
    #[serde(default = "default_memory_ceiling_mb")]
    pub memory_ceiling_mb: f64,

    /// Backoff between admission attempts while overloaded
    #[serde(default = "default_overload_backoff_ms")]
    pub overload_backoff_ms: u64,

    /// Per-task deadline; 0 disables the deadline
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    /// Enable visual progress bar
    #[serde(default)]
    pub progress_bar: bool,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

fn default_max_concurrent_tasks() -> usize {
    num_cpus::get().clamp(2, 8)
}

fn default_cpu_threshold() -> f32 {
    80.0
}

fn default_memory_ceiling_mb() -> f64 {
    2048.0
}

fn default_overload_backoff_ms() -> u64 {
    100
}

fn default_task_timeout_ms() -> u64 {
    300_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            cpu_threshold: default_cpu_threshold(),
            memory_ceiling_mb: default_memory_ceiling_mb(),
            overload_backoff_ms: default_overload_backoff_ms(),
            task_timeout_ms: default_task_timeout_ms(),
            progress_bar: false,
            sampler: SamplerConfig::default(),
            retry: RetryConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_sampler_interval_ms")]
    pub interval_ms: u64,

    /// Number of samples kept in the rolling history
    #[serde(default = "default_sampler_history_size")]
    pub history_size: usize,
}

fn default_sampler_interval_ms() -> u64 {
    1_000
}

fn default_sampler_history_size() -> usize {
    60
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sampler_interval_ms(),
            history_size: default_sampler_history_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// "none", "exponential-backoff" or "linear"
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Total attempts including the first one
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            max_attempts: default_retry_max_attempts(),
        }
    }
}

fn default_retry_strategy() -> String {
    "none".to_string()
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}

fn default_retry_max_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_cpu_high")]
    pub cpu_high: f32,
    #[serde(default = "default_cpu_low")]
    pub cpu_low: f32,
    /// Upper bound for suggested concurrency
    #[serde(default = "default_concurrency_ceiling")]
    pub concurrency_ceiling: usize,
    #[serde(default = "default_slow_task_ms")]
    pub slow_task_ms: f64,
    #[serde(default = "default_failure_ratio")]
    pub failure_ratio: f64,
}

fn default_cpu_high() -> f32 {
    80.0
}

fn default_cpu_low() -> f32 {
    30.0
}

fn default_concurrency_ceiling() -> usize {
    20
}

fn default_slow_task_ms() -> f64 {
    30_000.0
}

fn default_failure_ratio() -> f64 {
    0.1
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cpu_high: default_cpu_high(),
            cpu_low: default_cpu_low(),
            concurrency_ceiling: default_concurrency_ceiling(),
            slow_task_ms: default_slow_task_ms(),
            failure_ratio: default_failure_ratio(),
        }
    }
}
