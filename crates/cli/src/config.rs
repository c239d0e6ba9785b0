use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use tasker_core::{ConfigError, SchedulerConfig, ShutdownPolicy};

pub const WORKER_THREADS_VAR: &str = "TASKER_WORKER_THREADS";
pub const SHUTDOWN_POLICY_VAR: &str = "TASKER_SHUTDOWN_POLICY";

/// Load `.env` into the process environment, if present.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Resolve the scheduler config.
/// Priority: CLI flags > environment > config file > defaults.
pub fn resolve(
    path: Option<&Path>,
    workers: Option<usize>,
    shutdown_policy: Option<ShutdownPolicy>,
) -> Result<SchedulerConfig> {
    let mut config = load(path)?;
    apply_env(&mut config, env_opt).context("invalid scheduler environment")?;

    if let Some(workers) = workers {
        config.worker_threads = workers;
    }
    if let Some(policy) = shutdown_policy {
        config.shutdown_policy = policy;
    }
    Ok(config)
}

/// Load config from the given TOML file, or defaults when no path is given.
pub fn load(path: Option<&Path>) -> Result<SchedulerConfig> {
    let Some(path) = path else {
        debug!("No config file given, using defaults");
        return Ok(SchedulerConfig::default());
    };

    debug!(?path, "Loading config");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let config: SchedulerConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))?;
    Ok(config)
}

/// Apply `TASKER_*` overrides found through `lookup`.
pub fn apply_env(
    config: &mut SchedulerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(WORKER_THREADS_VAR) {
        config.worker_threads = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::WorkerThreads(raw.clone()))?;
    }
    if let Some(raw) = lookup(SHUTDOWN_POLICY_VAR) {
        config.shutdown_policy = raw.parse()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn no_path_gives_defaults() {
        assert_eq!(load(None).unwrap(), SchedulerConfig::default());
    }

    #[test]
    fn loads_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker_threads = 8").unwrap();
        writeln!(file, "thread_name_prefix = \"bench\"").unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.thread_name_prefix, "bench");
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Graceful);
    }

    #[test]
    fn missing_or_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(load(Some(&missing)).is_err());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "worker_threads = \"many\"").unwrap();
        let err = load(Some(&bad)).unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = SchedulerConfig::with_workers(8);
        apply_env(
            &mut config,
            lookup(&[(WORKER_THREADS_VAR, " 2 "), (SHUTDOWN_POLICY_VAR, "Immediate")]),
        )
        .unwrap();

        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Immediate);
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let mut config = SchedulerConfig::default();
        let err = apply_env(&mut config, lookup(&[(WORKER_THREADS_VAR, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::WorkerThreads(v) if v == "lots"));

        let err = apply_env(&mut config, lookup(&[(SHUTDOWN_POLICY_VAR, "never")])).unwrap_err();
        assert!(matches!(err, ConfigError::ShutdownPolicy(_)));
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn flags_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker_threads = 8").unwrap();
        writeln!(file, "shutdown_policy = \"immediate\"").unwrap();

        let config = resolve(Some(file.path()), Some(3), Some(ShutdownPolicy::Graceful)).unwrap();
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Graceful);
    }
}
