//! Configuration management for Timegate.

use clap::ValueEnum;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TimegateError};
use crate::limiter::{ConcurrencyLimiter, SlidingWindowLimiter, SlotLimiter};

/// Prefix of environment variables that override file settings,
/// e.g. `TIMEGATE__LIMITER__CAPACITY=10`.
pub const ENV_PREFIX: &str = "TIMEGATE";

/// Main configuration for Timegate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimegateConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Batch driver configuration
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Which limiter to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LimiterMode {
    /// Capacity plus per-slot cooldown window
    Window,
    /// Capacity only
    Concurrency,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Limiter flavour
    #[serde(default = "default_mode")]
    pub mode: LimiterMode,

    /// Maximum number of slots held at once
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Minimum time between a slot's release and its reuse, in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            capacity: default_capacity(),
            window_ms: default_window_ms(),
        }
    }
}

fn default_mode() -> LimiterMode {
    LimiterMode::Window
}

fn default_capacity() -> usize {
    5
}

fn default_window_ms() -> u64 {
    1000
}

impl LimiterConfig {
    /// The configured window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Build the configured limiter.
    pub fn build(&self) -> Result<Arc<dyn SlotLimiter>> {
        let limiter: Arc<dyn SlotLimiter> = match self.mode {
            LimiterMode::Window => {
                Arc::new(SlidingWindowLimiter::new(self.capacity, self.window())?)
            }
            LimiterMode::Concurrency => Arc::new(ConcurrencyLimiter::new(self.capacity)?),
        };
        Ok(limiter)
    }
}

/// Batch driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of jobs to run through the limiter
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Simulated work per job, in milliseconds
    #[serde(default = "default_work_ms")]
    pub work_ms: u64,

    /// Random extra work per job, up to this many milliseconds
    #[serde(default)]
    pub jitter_ms: u64,

    /// Cancel jobs that have not started after this many milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            work_ms: default_work_ms(),
            jitter_ms: 0,
            deadline_ms: None,
        }
    }
}

fn default_jobs() -> usize {
    6
}

fn default_work_ms() -> u64 {
    300
}

impl TimegateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TimegateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TimegateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file layered under
    /// `TIMEGATE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(File::from(path));
        }

        let config: TimegateConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TimegateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot rule out.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.capacity == 0 {
            return Err(TimegateError::Config("limiter.capacity must be at least 1".to_string()));
        }
        if self.batch.jobs == 0 {
            return Err(TimegateError::Config("batch.jobs must be at least 1".to_string()));
        }
        Ok(())
    }
}
