use std::sync::Arc;
use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::Result;
use directories::ProjectDirs;
use serde::Deserialize;

/// Construction-time configuration for the dispatcher. Supplied once; the
/// scheduler has no hot-reload path.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker count; also sizes the hot queue and the active-job tracker.
    pub worker_count: usize,
    /// Overflow queue capacity.
    pub overflow_capacity: usize,
    /// Safety-net TTL for active jobs that never report completion.
    pub active_job_ttl_secs: u64,
    /// Background expiry sweep interval.
    pub sweep_interval_secs: u64,
    /// Base URL of the external job-runner service.
    pub runner_url: Arc<str>,
    /// HTTP timeout for job-runner calls.
    pub runner_timeout_secs: u64,
    /// Interval at which the dispatcher logs queue/tracker sizes.
    pub stats_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    worker_count: usize,
    overflow_capacity: usize,
    #[serde(default = "default_active_job_ttl_secs")]
    active_job_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,
    runner_url: String,
    #[serde(default = "default_runner_timeout_secs")]
    runner_timeout_secs: u64,
    #[serde(default = "default_stats_interval_secs")]
    stats_interval_secs: u64,
}

fn default_active_job_ttl_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    5
}

fn default_runner_timeout_secs() -> u64 {
    30
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        Self {
            worker_count: raw.worker_count,
            overflow_capacity: raw.overflow_capacity,
            active_job_ttl_secs: raw.active_job_ttl_secs,
            sweep_interval_secs: raw.sweep_interval_secs,
            runner_url: raw.runner_url.into(),
            runner_timeout_secs: raw.runner_timeout_secs,
            stats_interval_secs: raw.stats_interval_secs,
        }
    }
}

impl Config {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut cfg = if let Some(path) = path {
            let raw = fs::read_to_string(path)?;
            Config::from(toml::from_str::<RawConfig>(&raw)?)
        } else {
            let default_path = default_config_path();
            if default_path.exists() {
                let raw = fs::read_to_string(&default_path)?;
                Config::from(toml::from_str::<RawConfig>(&raw)?)
            } else {
                Self::default_from_env()?
            }
        };

        maybe_env_usize(&mut cfg.worker_count, "WORKER_COUNT");
        maybe_env_usize(&mut cfg.overflow_capacity, "OVERFLOW_CAPACITY");
        maybe_env_u64(&mut cfg.active_job_ttl_secs, "ACTIVE_JOB_TTL_SECS");
        maybe_env_u64(&mut cfg.sweep_interval_secs, "SWEEP_INTERVAL_SECS");
        maybe_env_u64(&mut cfg.runner_timeout_secs, "RUNNER_TIMEOUT_SECS");
        maybe_env_u64(&mut cfg.stats_interval_secs, "STATS_INTERVAL_SECS");
        if let Ok(v) = env::var("RUNNER_URL") {
            cfg.runner_url = v.into();
        }
        validate_required(&cfg)?;
        Ok(cfg)
    }

    pub fn active_job_ttl(&self) -> Duration {
        Duration::from_secs(self.active_job_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn runner_timeout(&self) -> Duration {
        Duration::from_secs(self.runner_timeout_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

impl Config {
    fn default_from_env() -> Result<Self> {
        Ok(Self {
            worker_count: env_usize("WORKER_COUNT", 5),
            overflow_capacity: env_usize("OVERFLOW_CAPACITY", 100),
            active_job_ttl_secs: env_u64("ACTIVE_JOB_TTL_SECS", default_active_job_ttl_secs()),
            sweep_interval_secs: env_u64("SWEEP_INTERVAL_SECS", default_sweep_interval_secs()),
            runner_url: env_required("RUNNER_URL")?.into(),
            runner_timeout_secs: env_u64("RUNNER_TIMEOUT_SECS", default_runner_timeout_secs()),
            stats_interval_secs: env_u64("STATS_INTERVAL_SECS", default_stats_interval_secs()),
        })
    }
}

fn default_config_path() -> PathBuf {
    default_state_dir().join("config.toml")
}

fn default_state_dir() -> PathBuf {
    ProjectDirs::from("com", "firmsched", "firmsched")
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".firmsched"))
}

fn validate_required(cfg: &Config) -> Result<()> {
    if cfg.worker_count == 0 {
        anyhow::bail!("WORKER_COUNT must be at least 1");
    }
    if cfg.overflow_capacity == 0 {
        anyhow::bail!("OVERFLOW_CAPACITY must be at least 1");
    }
    if cfg.active_job_ttl_secs == 0 {
        anyhow::bail!("ACTIVE_JOB_TTL_SECS must be at least 1");
    }
    if cfg.runner_url.trim().is_empty() {
        anyhow::bail!("RUNNER_URL is required (set via env or config)");
    }
    Ok(())
}

fn maybe_env_usize(val: &mut usize, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<usize>() {
            *val = n;
        }
    }
}

fn maybe_env_u64(val: &mut u64, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<u64>() {
            *val = n;
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_required(key: &str) -> Result<String> {
    let val = env::var(key).unwrap_or_default();
    if val.trim().is_empty() {
        anyhow::bail!("{key} is required");
    }
    Ok(val)
}
