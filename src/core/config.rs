//! Pipeline configuration loaded from a JSON file.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::{PipelineError, PipelineResult};

const DEFAULT_HEALTH_CHECK_SECS: u64 = 10;

const ENV_HEALTH_CHECK_SECS: &str = "IMAGE_PIPELINE_HEALTH_CHECK_SECS";
const ENV_TIMEOUT_SECS: &str = "IMAGE_PIPELINE_TIMEOUT_SECS";

/// Configuration for a pipeline process.
///
/// ```json
/// {
///   "sources": [
///     { "name": "local", "uri": "/srv/images" },
///     { "name": "cdn", "uri": "http://10.0.0.1:3000,10.0.0.2:3000/ping" }
///   ],
///   "healthCheckIntervalSecs": 5,
///   "timeoutSecs": 30
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Named sources registered at startup
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    /// Interval between health checks of HTTP upstream hosts
    #[serde(rename = "healthCheckIntervalSecs", default = "default_health_check_secs")]
    pub health_check_interval_secs: u64,
    /// Deadline for a whole task chain; unbounded when absent
    #[serde(rename = "timeoutSecs", default)]
    pub timeout_secs: Option<u64>,
}

/// One named source and the URI it is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    pub uri: String,
}

fn default_health_check_secs() -> u64 {
    DEFAULT_HEALTH_CHECK_SECS
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            health_check_interval_secs: DEFAULT_HEALTH_CHECK_SECS,
            timeout_secs: None,
        }
    }
}

impl PipelineConfig {
    /// Loads and validates a config file, then applies environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::configuration(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        debug!("Loaded config from {} ({} sources)", path.display(), config.sources.len());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> PipelineResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| PipelineError::configuration(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides looked up by variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> PipelineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_HEALTH_CHECK_SECS) {
            self.health_check_interval_secs = parse_secs(ENV_HEALTH_CHECK_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = Some(parse_secs(ENV_TIMEOUT_SECS, &value)?);
        }
        Ok(())
    }

    /// Source names must be non-empty and unique.
    pub fn validate(&self) -> PipelineResult<()> {
        let mut seen = HashSet::new();
        for entry in &self.sources {
            if entry.name.is_empty() {
                return Err(PipelineError::configuration("Source name can not be empty"));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(PipelineError::configuration(format!(
                    "Duplicate source name: {}", entry.name
                )));
            }
        }
        if self.health_check_interval_secs == 0 {
            return Err(PipelineError::configuration("Health check interval must be positive"));
        }
        Ok(())
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn parse_secs(key: &str, value: &str) -> PipelineResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| PipelineError::configuration(format!("{} must be a number of seconds, got {:?}", key, value)))
}
