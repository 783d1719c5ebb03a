//! Harness configuration
//!
//! Settings are read from an optional YAML file and then overridden field by
//! field from `CERTSUITE_QE_*` environment variables. The file location
//! resolution chain (highest priority first):
//! 1. Explicit `--config` flag
//! 2. `CERTSUITE_QE_CONFIG` environment variable
//! 3. Built-in defaults (no file)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::telemetry::LogFormat;
use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "CERTSUITE_QE_CONFIG";

const ENV_PREFIX: &str = "CERTSUITE_QE_";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// How `exists()` classifies server errors other than "not found"
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExistencePolicy {
    /// Surface the error to the caller
    #[default]
    Strict,
    /// Report the object as present on any error other than "not found"
    Legacy,
}

impl std::str::FromStr for ExistencePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "legacy" => Ok(Self::Legacy),
            other => Err(Error::config(format!("unknown existence policy '{}'", other))),
        }
    }
}

/// Settings shared by every wait primitive and the CLI
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SuiteConfig {
    /// Kubeconfig path; `None` falls back to kube's inference chain
    pub kubeconfig: Option<PathBuf>,
    /// Interval between checks of single-object waits
    pub poll_interval_secs: u64,
    /// Default budget for single-object waits
    pub default_timeout_secs: u64,
    /// Sample interval inside a stability window
    pub stability_sample_interval_secs: u64,
    /// Tick interval of the reboot transition tracker
    pub transition_poll_interval_secs: u64,
    /// Maximum concurrent per-entity fetches within one tick
    pub fetch_concurrency: usize,
    /// Classification of non-404 errors in `exists()`
    pub existence_policy: ExistencePolicy,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            stability_sample_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            transition_poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            fetch_concurrency: 1,
            existence_policy: ExistencePolicy::Strict,
            log_format: LogFormat::Text,
        }
    }
}

impl SuiteConfig {
    /// Load configuration following the resolution chain, then apply
    /// environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit.map(Path::to_path_buf).or_else(|| {
            std::env::var(CONFIG_PATH_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        });

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_yaml::from_str(&data)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded suite configuration");
        Ok(config)
    }

    /// Apply `CERTSUITE_QE_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty());

        if let Some(v) = var("KUBECONFIG") {
            self.kubeconfig = Some(PathBuf::from(v));
        }
        if let Some(v) = var("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_number("POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = var("DEFAULT_TIMEOUT_SECS") {
            self.default_timeout_secs = parse_number("DEFAULT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("STABILITY_SAMPLE_INTERVAL_SECS") {
            self.stability_sample_interval_secs =
                parse_number("STABILITY_SAMPLE_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = var("TRANSITION_POLL_INTERVAL_SECS") {
            self.transition_poll_interval_secs =
                parse_number("TRANSITION_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = var("FETCH_CONCURRENCY") {
            self.fetch_concurrency = parse_number("FETCH_CONCURRENCY", &v)?;
        }
        if let Some(v) = var("EXISTENCE_POLICY") {
            self.existence_policy = v.parse()?;
        }
        if let Some(v) = var("LOG_FORMAT") {
            self.log_format = v.parse()?;
        }
        Ok(())
    }

    /// Reject settings that would make every wait spin or never sample
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::config("pollIntervalSecs must be at least 1"));
        }
        if self.stability_sample_interval_secs == 0 {
            return Err(Error::config("stabilitySampleIntervalSecs must be at least 1"));
        }
        if self.transition_poll_interval_secs == 0 {
            return Err(Error::config("transitionPollIntervalSecs must be at least 1"));
        }
        if self.fetch_concurrency == 0 {
            return Err(Error::config("fetchConcurrency must be at least 1"));
        }
        Ok(())
    }

    /// Interval between checks of single-object waits
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Default budget for single-object waits
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Sample interval inside a stability window
    pub fn stability_sample_interval(&self) -> Duration {
        Duration::from_secs(self.stability_sample_interval_secs)
    }

    /// Tick interval of the reboot transition tracker
    pub fn transition_poll_interval(&self) -> Duration {
        Duration::from_secs(self.transition_poll_interval_secs)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::config(format!(
            "{}{} must be a non-negative integer, got '{}'",
            ENV_PREFIX, name, value
        ))
    })
}
