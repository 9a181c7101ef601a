//! Periodic CPU / memory sampling used for admission control.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::SamplerError;
use crate::executor::types::{ExecutorConfig, SamplerConfig};

/// One resource sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub active_tasks: usize,
    pub max_concurrent_tasks: usize,
    pub timestamp: DateTime<Utc>,
}

impl ResourceUsage {
    pub fn zero(active_tasks: usize, max_concurrent_tasks: usize) -> Self {
        Self {
            cpu_percent: 0.0,
            memory_mb: 0.0,
            active_tasks,
            max_concurrent_tasks,
            timestamp: Utc::now(),
        }
    }

    /// CPU or memory above its limit, regardless of the task count.
    pub fn exceeds_limits(&self, cpu_threshold: f32, memory_ceiling_mb: f64) -> bool {
        self.cpu_percent > cpu_threshold || self.memory_mb > memory_ceiling_mb
    }

    pub fn is_overloaded(&self, cpu_threshold: f32, memory_ceiling_mb: f64) -> bool {
        self.exceeds_limits(cpu_threshold, memory_ceiling_mb)
            || self.active_tasks >= self.max_concurrent_tasks
    }
}

/// Source of raw (cpu %, memory MB) readings.
pub trait ResourceProbe: Send {
    fn sample(&mut self) -> Result<(f32, f64), SamplerError>;
}

/// Host CPU and current-process memory via `sysinfo`.
pub struct SystemProbe {
    sys: sysinfo::System,
    pid: sysinfo::Pid,
}

impl SystemProbe {
    pub fn new() -> Result<Self, SamplerError> {
        let pid = sysinfo::get_current_pid().map_err(|e| SamplerError::Unavailable(e.to_string()))?;
        let mut sys = sysinfo::System::new();
        // First CPU reading is always 0; prime it so the next refresh has a delta.
        sys.refresh_cpu();
        Ok(Self { sys, pid })
    }
}

impl ResourceProbe for SystemProbe {
    fn sample(&mut self) -> Result<(f32, f64), SamplerError> {
        self.sys.refresh_cpu();
        let cpu_count = self.sys.cpus().len().max(1);
        let cpu_usage =
            self.sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / cpu_count as f32;

        if !self.sys.refresh_process(self.pid) {
            return Err(SamplerError::ProcessNotFound(self.pid.as_u32()));
        }
        let process = self
            .sys
            .process(self.pid)
            .ok_or(SamplerError::ProcessNotFound(self.pid.as_u32()))?;
        let memory_mb = process.memory() as f64 / (1024.0 * 1024.0);

        Ok((cpu_usage, memory_mb))
    }
}

/// Probe used when the platform cannot be sampled; every sample is skipped.
struct UnavailableProbe(String);

impl ResourceProbe for UnavailableProbe {
    fn sample(&mut self) -> Result<(f32, f64), SamplerError> {
        Err(SamplerError::Unavailable(self.0.clone()))
    }
}

struct SamplerInner {
    probe: Mutex<Box<dyn ResourceProbe>>,
    history: Mutex<VecDeque<ResourceUsage>>,
    peaks: Mutex<(f32, f64)>,
    history_size: usize,
    interval: Duration,
    cpu_threshold: f32,
    memory_ceiling_mb: f64,
    active_tasks: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl SamplerInner {
    fn sample_once(&self) -> Option<ResourceUsage> {
        let reading = {
            let mut probe = match self.probe.lock() {
                Ok(probe) => probe,
                Err(poisoned) => poisoned.into_inner(),
            };
            probe.sample()
        };

        let (cpu_percent, memory_mb) = match reading {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "resource sample failed, skipping");
                return None;
            }
        };

        let usage = ResourceUsage {
            cpu_percent,
            memory_mb,
            active_tasks: self.active_tasks.load(Ordering::SeqCst),
            max_concurrent_tasks: self.max_concurrent.load(Ordering::SeqCst),
            timestamp: Utc::now(),
        };

        if let Ok(mut history) = self.history.lock() {
            history.push_back(usage);
            while history.len() > self.history_size {
                history.pop_front();
            }
        }
        if let Ok(mut peaks) = self.peaks.lock() {
            peaks.0 = peaks.0.max(cpu_percent);
            peaks.1 = peaks.1.max(memory_mb);
        }

        Some(usage)
    }
}

/// Samples resources on a fixed interval into a bounded rolling history.
pub struct ResourceSampler {
    inner: Arc<SamplerInner>,
    worker: Mutex<Option<(JoinHandle<()>, watch::Sender<bool>)>>,
}

impl ResourceSampler {
    pub fn new(config: &ExecutorConfig, probe: Box<dyn ResourceProbe>) -> Self {
        Self::with_sampler_config(
            &config.sampler,
            config.cpu_threshold,
            config.memory_ceiling_mb,
            config.max_concurrent_tasks,
            probe,
        )
    }

    /// Sampler backed by [`SystemProbe`]; falls back to skipping samples when
    /// the current process cannot be inspected.
    pub fn system(config: &ExecutorConfig) -> Self {
        let probe: Box<dyn ResourceProbe> = match SystemProbe::new() {
            Ok(probe) => Box::new(probe),
            Err(e) => {
                tracing::warn!(error = %e, "system sampling unavailable");
                Box::new(UnavailableProbe(e.to_string()))
            }
        };
        Self::new(config, probe)
    }

    pub fn with_sampler_config(
        sampler: &SamplerConfig,
        cpu_threshold: f32,
        memory_ceiling_mb: f64,
        max_concurrent_tasks: usize,
        probe: Box<dyn ResourceProbe>,
    ) -> Self {
        let inner = SamplerInner {
            probe: Mutex::new(probe),
            history: Mutex::new(VecDeque::with_capacity(sampler.history_size)),
            peaks: Mutex::new((0.0, 0.0)),
            history_size: sampler.history_size.max(1),
            interval: Duration::from_millis(sampler.interval_ms.max(1)),
            cpu_threshold,
            memory_ceiling_mb,
            active_tasks: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(max_concurrent_tasks.max(1)),
        };
        Self {
            inner: Arc::new(inner),
            worker: Mutex::new(None),
        }
    }

    /// Start the background sampling loop. No-op if already started.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut worker = match self.worker.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if worker.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        inner.sample_once();
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("resource sampler stopped");
        });

        *worker = Some((handle, stop_tx));
    }

    /// Stop the sampling loop and wait for it to exit. No-op if not started.
    pub async fn stop(&self) {
        let worker = match self.worker.lock() {
            Ok(mut w) => w.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some((handle, stop_tx)) = worker {
            let _ = stop_tx.send(true);
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "resource sampler task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().map(|w| w.is_some()).unwrap_or(false)
    }

    /// Take one sample immediately, outside the periodic loop.
    pub fn sample_now(&self) -> Option<ResourceUsage> {
        self.inner.sample_once()
    }

    /// Latest sample, with the live active/max task counts.
    pub fn current_usage(&self) -> ResourceUsage {
        let active = self.active_tasks();
        let max = self.max_concurrent();
        let latest = self
            .inner
            .history
            .lock()
            .ok()
            .and_then(|h| h.back().copied());

        match latest {
            Some(sample) => ResourceUsage {
                active_tasks: active,
                max_concurrent_tasks: max,
                ..sample
            },
            None => ResourceUsage::zero(active, max),
        }
    }

    /// Mean over samples taken within the trailing `window`; zero-valued if none.
    pub fn average_usage(&self, window: Duration) -> ResourceUsage {
        let max = self.max_concurrent();
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());

        let Ok(history) = self.inner.history.lock() else {
            return ResourceUsage::zero(0, max);
        };
        let recent: Vec<&ResourceUsage> =
            history.iter().filter(|s| s.timestamp >= cutoff).collect();
        if recent.is_empty() {
            return ResourceUsage::zero(0, max);
        }

        let n = recent.len();
        ResourceUsage {
            cpu_percent: recent.iter().map(|s| s.cpu_percent).sum::<f32>() / n as f32,
            memory_mb: recent.iter().map(|s| s.memory_mb).sum::<f64>() / n as f64,
            active_tasks: recent.iter().map(|s| s.active_tasks).sum::<usize>() / n,
            max_concurrent_tasks: max,
            timestamp: Utc::now(),
        }
    }

    /// True when no new task should be admitted.
    pub fn overloaded(&self) -> bool {
        self.current_usage()
            .is_overloaded(self.inner.cpu_threshold, self.inner.memory_ceiling_mb)
    }

    /// Host pressure alone holds admission back; a full task slot set does not count.
    pub fn under_pressure(&self) -> bool {
        self.current_usage()
            .exceeds_limits(self.inner.cpu_threshold, self.inner.memory_ceiling_mb)
    }

    pub fn history_len(&self) -> usize {
        self.inner.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    /// (peak cpu %, peak memory MB) since the last reset
    pub fn peaks(&self) -> (f32, f64) {
        self.inner.peaks.lock().map(|p| *p).unwrap_or((0.0, 0.0))
    }

    /// Forget every sample, so averages only cover what is sampled next.
    pub fn clear_history(&self) {
        if let Ok(mut history) = self.inner.history.lock() {
            history.clear();
        }
    }

    pub fn reset_peaks(&self) {
        if let Ok(mut peaks) = self.inner.peaks.lock() {
            *peaks = (0.0, 0.0);
        }
    }

    pub fn active_tasks(&self) -> usize {
        self.inner.active_tasks.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent.load(Ordering::SeqCst)
    }

    /// Written only by the executor's driving loop.
    pub fn set_active_tasks(&self, n: usize) {
        self.inner.active_tasks.store(n, Ordering::SeqCst);
    }

    pub fn set_max_concurrent(&self, n: usize) {
        self.inner.max_concurrent.store(n.max(1), Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ResourceSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSampler")
            .field("interval", &self.inner.interval)
            .field("history_size", &self.inner.history_size)
            .field("cpu_threshold", &self.inner.cpu_threshold)
            .field("memory_ceiling_mb", &self.inner.memory_ceiling_mb)
            .field("active_tasks", &self.active_tasks())
            .field("max_concurrent", &self.max_concurrent())
            .finish()
    }
}

/// Probe with externally controlled readings, for tests and simulations.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    reading: Arc<Mutex<Result<(f32, f64), String>>>,
}

impl StaticProbe {
    pub fn new(cpu_percent: f32, memory_mb: f64) -> Self {
        Self {
            reading: Arc::new(Mutex::new(Ok((cpu_percent, memory_mb)))),
        }
    }

    pub fn set(&self, cpu_percent: f32, memory_mb: f64) {
        if let Ok(mut r) = self.reading.lock() {
            *r = Ok((cpu_percent, memory_mb));
        }
    }

    /// Make subsequent samples fail with `reason`.
    pub fn set_failing(&self, reason: &str) {
        if let Ok(mut r) = self.reading.lock() {
            *r = Err(reason.to_string());
        }
    }
}

impl Default for StaticProbe {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl ResourceProbe for StaticProbe {
    fn sample(&mut self) -> Result<(f32, f64), SamplerError> {
        match self.reading.lock() {
            Ok(r) => r.clone().map_err(SamplerError::Unavailable),
            Err(_) => Err(SamplerError::Unavailable("probe lock poisoned".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(probe: StaticProbe, max: usize, history: usize) -> ResourceSampler {
        let sampler_cfg = SamplerConfig {
            interval_ms: 10,
            history_size: history,
        };
        ResourceSampler::with_sampler_config(&sampler_cfg, 80.0, 1024.0, max, Box::new(probe))
    }

    #[test]
    fn test_overloaded_predicate() {
        let mut usage = ResourceUsage::zero(0, 4);
        assert!(!usage.is_overloaded(80.0, 1024.0));

        usage.cpu_percent = 80.5;
        assert!(usage.is_overloaded(80.0, 1024.0));

        usage.cpu_percent = 10.0;
        usage.memory_mb = 2048.0;
        assert!(usage.is_overloaded(80.0, 1024.0));

        usage.memory_mb = 10.0;
        usage.active_tasks = 4;
        assert!(usage.is_overloaded(80.0, 1024.0));
        assert!(!usage.exceeds_limits(80.0, 1024.0));
    }

    #[test]
    fn test_current_usage_without_samples_is_zero() {
        let s = sampler(StaticProbe::new(50.0, 100.0), 3, 10);
        s.set_active_tasks(2);
        let usage = s.current_usage();
        assert_eq!(usage.cpu_percent, 0.0);
        assert_eq!(usage.active_tasks, 2);
        assert_eq!(usage.max_concurrent_tasks, 3);
    }

    #[test]
    fn test_history_is_bounded() {
        let s = sampler(StaticProbe::new(10.0, 10.0), 4, 3);
        for _ in 0..10 {
            s.sample_now();
        }
        assert_eq!(s.history_len(), 3);
    }

    #[test]
    fn test_failed_sample_is_skipped() {
        let probe = StaticProbe::new(10.0, 10.0);
        let s = sampler(probe.clone(), 4, 10);
        s.sample_now();
        probe.set_failing("no procfs");
        assert!(s.sample_now().is_none());
        assert_eq!(s.history_len(), 1);
        assert_eq!(s.current_usage().cpu_percent, 10.0);
    }

    #[test]
    fn test_overload_follows_probe_and_active_count() {
        let probe = StaticProbe::new(95.0, 10.0);
        let s = sampler(probe.clone(), 2, 10);
        s.sample_now();
        assert!(s.overloaded());

        probe.set(20.0, 10.0);
        s.sample_now();
        assert!(!s.overloaded());

        s.set_active_tasks(2);
        assert!(s.overloaded());
        s.set_max_concurrent(3);
        assert!(!s.overloaded());
    }

    #[test]
    fn test_average_usage_and_peaks() {
        let probe = StaticProbe::new(20.0, 100.0);
        let s = sampler(probe.clone(), 4, 10);
        s.sample_now();
        probe.set(60.0, 300.0);
        s.sample_now();

        let avg = s.average_usage(Duration::from_secs(60));
        assert!((avg.cpu_percent - 40.0).abs() < f32::EPSILON);
        assert!((avg.memory_mb - 200.0).abs() < f64::EPSILON);
        assert_eq!(s.peaks(), (60.0, 300.0));

        s.reset_peaks();
        assert_eq!(s.peaks(), (0.0, 0.0));
    }

    #[test]
    fn test_full_slots_are_not_pressure() {
        let probe = StaticProbe::new(20.0, 10.0);
        let s = sampler(probe.clone(), 2, 10);
        s.sample_now();
        s.set_active_tasks(2);
        assert!(s.overloaded());
        assert!(!s.under_pressure());

        probe.set(95.0, 10.0);
        s.sample_now();
        assert!(s.under_pressure());
    }

    #[test]
    fn test_clear_history_drops_previous_samples() {
        let probe = StaticProbe::new(5.0, 100.0);
        let s = sampler(probe.clone(), 4, 10);
        s.sample_now();
        s.sample_now();

        s.clear_history();
        assert_eq!(s.history_len(), 0);

        probe.set(50.0, 100.0);
        s.sample_now();
        let avg = s.average_usage(Duration::from_secs(60));
        assert_eq!(avg.cpu_percent, 50.0);
    }

    #[test]
    fn test_average_usage_empty_window() {
        let s = sampler(StaticProbe::new(20.0, 100.0), 4, 10);
        let avg = s.average_usage(Duration::from_secs(1));
        assert_eq!(avg.cpu_percent, 0.0);
        assert_eq!(avg.memory_mb, 0.0);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_joins() {
        let s = sampler(StaticProbe::new(5.0, 5.0), 4, 100);
        s.start();
        s.start();
        assert!(s.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        s.stop().await;
        assert!(!s.is_running());
        assert!(s.history_len() >= 1);

        let len = s.history_len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(s.history_len(), len);

        // stopping twice is harmless
        s.stop().await;
    }
}
