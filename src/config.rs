//! Configuration management for metadiff
//!
//! This module provides configuration structures and defaults for the scope
//! filter and the result-set watcher, loaded from TOML and overridable from
//! the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Global configuration for metadiff
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaDiffConfig {
    /// Scope filter configuration
    pub filter: FilterConfig,
    /// Result-set watcher configuration
    pub watcher: WatcherConfig,
}

/// Configuration for the scoped depth filter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Root folders results must live under; empty disables scoping
    pub folders: Vec<PathBuf>,
    /// Maximum depth below a root folder, negative disables scoping
    pub max_depth: isize,
    /// Worker threads, 0 uses the available parallelism
    pub workers: usize,
    /// Result sets smaller than this are filtered on the calling thread
    pub parallel_threshold: usize,
}

/// Configuration for watching a result set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Debounce duration for file events in milliseconds
    pub event_debounce_ms: u64,
    /// Maximum number of items tracked at once
    pub max_items: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            max_depth: 1,
            workers: 0,
            parallel_threshold: 64,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            event_debounce_ms: 100,
            max_items: 10_000,
        }
    }
}

impl FilterConfig {
    /// Join relative folders onto `base` so they can prefix absolute paths
    pub fn anchor_folders(&mut self, base: &Path) {
        for folder in &mut self.folders {
            if folder.is_relative() {
                *folder = base.join(&*folder);
            }
        }
    }

    /// Resolve symlinks in folders that exist; the others are kept as given
    pub fn canonicalize_folders(&mut self) {
        for folder in &mut self.folders {
            match folder.canonicalize() {
                Ok(canonical) => *folder = canonical,
                Err(err) => tracing::debug!(folder = %folder.display(), "keeping folder as given: {}", err),
            }
        }
    }
}

impl WatcherConfig {
    /// Get event debounce duration
    pub fn event_debounce_duration(&self) -> Duration {
        Duration::from_millis(self.event_debounce_ms)
    }
}

/// Configuration loading and management
impl MetaDiffConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` when given, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("METADIFF_MAX_DEPTH") {
            if let Ok(depth) = val.parse::<isize>() {
                self.filter.max_depth = depth;
            }
        }

        if let Ok(val) = std::env::var("METADIFF_WORKERS") {
            if let Ok(workers) = val.parse::<usize>() {
                self.filter.workers = workers;
            }
        }

        if let Ok(val) = std::env::var("METADIFF_PARALLEL_THRESHOLD") {
            if let Ok(threshold) = val.parse::<usize>() {
                self.filter.parallel_threshold = threshold;
            }
        }

        if let Ok(val) = std::env::var("METADIFF_EVENT_DEBOUNCE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.watcher.event_debounce_ms = ms;
            }
        }

        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.watcher.max_items == 0 {
            return Err("max_items must be greater than 0".to_string());
        }

        if self.filter.parallel_threshold == 0 {
            return Err("parallel_threshold must be greater than 0".to_string());
        }

        Ok(())
    }
}
