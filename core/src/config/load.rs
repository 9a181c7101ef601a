use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default taskflow data directory: ~/.taskflow
pub fn get_taskflow_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".taskflow"))
}

/// Load a config file, falling back to defaults for every missing field.
pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read {} failed: {e}", path.display()))?;
    let cfg = toml::from_str::<AppConfig>(&s)?;
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.taskflow/config.toml (highest)
    let data_dir = get_taskflow_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./taskflow.toml (current directory)
    let local_config = Path::new("taskflow.toml");

    let mut cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    // Environment variable overrides (Priority 0: highest)
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());

    Ok(cfg)
}

/// Apply `TASKFLOW_*` overrides. Blank or unparsable values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("TASKFLOW_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(n) = get("TASKFLOW_MAX_CONCURRENT").and_then(|v| v.trim().parse::<usize>().ok()) {
        if n > 0 {
            cfg.executor.max_concurrent_tasks = n;
        }
    }
    if let Some(ms) = get("TASKFLOW_TASK_TIMEOUT_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
        cfg.executor.task_timeout_ms = ms;
    }
    if let Some(mb) = get("TASKFLOW_MEMORY_CEILING_MB").and_then(|v| v.trim().parse::<f64>().ok())
    {
        cfg.executor.memory_ceiling_mb = mb;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[executor]\nmax_concurrent_tasks = 3\n\n[executor.sampler]\ninterval_ms = 250\n"
        )
        .unwrap();

        let cfg = load_from_path(file.path()).unwrap();
        assert_eq!(cfg.executor.max_concurrent_tasks, 3);
        assert_eq!(cfg.executor.sampler.interval_ms, 250);
        assert_eq!(cfg.executor.sampler.history_size, 60);
        assert_eq!(cfg.executor.cpu_threshold, 80.0);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_load_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor\nmax_concurrent_tasks = ").unwrap();
        assert!(load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TASKFLOW_MAX_CONCURRENT", "6"),
            ("TASKFLOW_LOG_LEVEL", "taskflow_core=debug"),
            ("TASKFLOW_TASK_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        let timeout_before = cfg.executor.task_timeout_ms;
        apply_env_overrides(&mut cfg, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.executor.max_concurrent_tasks, 6);
        assert_eq!(cfg.logging.level, "taskflow_core=debug");
        assert_eq!(cfg.executor.task_timeout_ms, timeout_before);
    }

    #[test]
    fn test_env_override_rejects_zero_concurrency() {
        let mut cfg = AppConfig::default();
        let before = cfg.executor.max_concurrent_tasks;
        apply_env_overrides(&mut cfg, |k| {
            (k == "TASKFLOW_MAX_CONCURRENT").then(|| "0".to_string())
        });
        assert_eq!(cfg.executor.max_concurrent_tasks, before);
    }
}
