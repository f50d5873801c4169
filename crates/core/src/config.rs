//! Process-wide configuration, built once at startup from environment
//! variables and passed down through the orchestrator and assembler
//! constructors. No module-level globals.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Runtime configuration shared by the ingestion and assembly stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of all durable state (series files, reports, outputs).
    pub data_dir: PathBuf,

    /// Worker pool size; 1 runs jobs strictly sequentially.
    pub n_jobs: usize,

    /// Upper bound on any single adapter fetch.
    pub fetch_timeout_secs: u64,

    /// User agent sent by HTTP-backed adapters.
    pub user_agent: String,
}

impl Config {
    /// Build config from environment variables (call [`load_dotenv`]
    /// first).
    pub fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(env_or("EPIWATCH_DATA_DIR", "data")),
            n_jobs: env_usize("EPIWATCH_N_JOBS", 4).max(1),
            fetch_timeout_secs: env_u64("EPIWATCH_FETCH_TIMEOUT_SECS", 30),
            user_agent: env_or("EPIWATCH_USER_AGENT", "epiwatch/0.1"),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Canonical series files, one per (domain, location).
    pub fn series_dir(&self) -> PathBuf {
        self.data_dir.join("series")
    }

    /// Run reports, one per domain per run.
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    /// Static reference table consumed by the assembler.
    pub fn reference_path(&self) -> PathBuf {
        self.data_dir.join("reference.json")
    }

    /// Assembled dataset and latest-snapshot view.
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  data_dir:      {}", self.data_dir.display());
        tracing::info!("  n_jobs:        {}", self.n_jobs);
        tracing::info!("  fetch_timeout: {}s", self.fetch_timeout_secs);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            n_jobs: 4,
            fetch_timeout_secs: 30,
            user_agent: "epiwatch/0.1".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_hang_off_data_dir() {
        let config = Config {
            data_dir: PathBuf::from("/tmp/epiwatch"),
            ..Config::default()
        };
        assert_eq!(config.series_dir(), PathBuf::from("/tmp/epiwatch/series"));
        assert_eq!(config.reports_dir(), PathBuf::from("/tmp/epiwatch/reports"));
        assert_eq!(config.reference_path(), PathBuf::from("/tmp/epiwatch/reference.json"));
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/epiwatch/output"));
    }

    #[test]
    fn n_jobs_is_never_zero() {
        let config = Config { n_jobs: 1, ..Config::default() };
        assert!(config.n_jobs >= 1);
        assert_eq!(Config::default().fetch_timeout(), Duration::from_secs(30));
    }
}
