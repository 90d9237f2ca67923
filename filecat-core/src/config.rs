//! Configuration for filecat

use crate::CatalogError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Filecat Configuration

[indexing]
# Flush the staging buffer once it holds roughly this many bytes (200 MiB)
watermark_bytes = 209715200
# Drained batches allowed in flight between the walker and the writer
pipeline_depth = 1
# Descend into symlinked directories
follow_links = false
# Stay on the filesystem the root lives on
one_file_system = false

[ignore]
# Glob patterns (relative to the indexed root) that are never catalogued
patterns = []

[query]
# Default maximum results returned by lookups
default_limit = 100
"#;

/// Filecat configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub ignore: IgnoreConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_watermark_bytes")]
    pub watermark_bytes: usize,
    #[serde(default = "default_pipeline_depth")]
    pub pipeline_depth: usize,
    #[serde(default)]
    pub follow_links: bool,
    #[serde(default)]
    pub one_file_system: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IgnoreConfig {
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

// Default value functions
fn default_watermark_bytes() -> usize {
    200 * 1024 * 1024
}
fn default_pipeline_depth() -> usize {
    1
}
fn default_limit() -> usize {
    100
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            watermark_bytes: default_watermark_bytes(),
            pipeline_depth: default_pipeline_depth(),
            follow_links: false,
            one_file_system: false,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load config from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| CatalogError::ConfigParse(e.to_string()))
    }

    /// Write the default config to `path`, refusing to overwrite
    pub fn write_default(path: &Path) -> crate::Result<()> {
        if path.exists() {
            return Err(CatalogError::ConfigExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }

    /// Override the flush watermark
    pub fn with_watermark(mut self, bytes: usize) -> Self {
        self.indexing.watermark_bytes = bytes;
        self
    }

    /// Add exclusion patterns
    pub fn with_ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }
}
