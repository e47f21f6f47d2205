//! Configuration for Tributary.
//!
//! Configuration lives in `.tributary/config.yaml`. Every field has a
//! default, so a missing file or a partial file is fine:
//!
//! ```yaml
//! database-path: .tributary/lineage.db
//! traversal:
//!   default-max-depth: 5
//!   max-depth-limit: 64
//! analysis:
//!   low-confidence-threshold: 0.5
//! storage:
//!   busy-timeout-ms: 5000
//!   upsert-retries: 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the tributary directory
pub const TRIBUTARY_DIR_NAME: &str = ".tributary";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the database file
pub const DATABASE_FILE_NAME: &str = "lineage.db";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Path to the `SQLite` database, relative to the working directory
    pub database_path: PathBuf,
    /// Traversal limits
    pub traversal: TraversalConfig,
    /// Run ledger classification
    pub analysis: AnalysisConfig,
    /// `SQLite` tuning
    pub storage: StorageConfig,
}

/// Traversal limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TraversalConfig {
    /// Depth used when the caller does not pass one
    pub default_max_depth: u32,
    /// Hard ceiling; larger requested depths are clamped to it
    pub max_depth_limit: u32,
}

/// Run ledger classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AnalysisConfig {
    /// Edges below this confidence count as low-certainty in run records
    pub low_confidence_threshold: f64,
}

/// `SQLite` tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// How long a writer waits for another connection's lock
    pub busy_timeout_ms: u64,
    /// Attempts for a node upsert that keeps hitting a locked database
    pub upsert_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(TRIBUTARY_DIR_NAME).join(DATABASE_FILE_NAME),
            traversal: TraversalConfig::default(),
            analysis: AnalysisConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            default_max_depth: 5,
            max_depth_limit: 64,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: 0.5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            upsert_retries: 5,
        }
    }
}

impl Config {
    /// Default configuration with the database at `path`.
    #[must_use]
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a YAML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.analysis.low_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "low-confidence-threshold must be within [0, 1], got {threshold}"
            )));
        }
        if self.traversal.max_depth_limit == 0 {
            return Err(Error::Config(
                "max-depth-limit must be at least 1".to_string(),
            ));
        }
        if self.traversal.default_max_depth > self.traversal.max_depth_limit {
            return Err(Error::Config(format!(
                "default-max-depth ({}) exceeds max-depth-limit ({})",
                self.traversal.default_max_depth, self.traversal.max_depth_limit
            )));
        }
        if self.storage.upsert_retries == 0 {
            return Err(Error::Config(
                "upsert-retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Clamp a requested traversal depth to the configured ceiling.
    #[must_use]
    pub fn clamp_depth(&self, requested: u32) -> u32 {
        let limit = self.traversal.max_depth_limit;
        if requested > limit {
            tracing::warn!(requested, limit, "Traversal depth clamped to configured limit");
            limit
        } else {
            requested
        }
    }
}
