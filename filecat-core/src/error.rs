//! Error types for catalog operations

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid root {}: {reason}", .path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Config already exists at {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("Glob pattern error: {0}")]
    GlobPattern(String),

    #[error("Schema version mismatch: database is v{found}, expected v{expected}. Delete the catalog file and index again.")]
    SchemaVersionMismatch { found: i32, expected: i32 },

    #[error("Flush failed after {attempts} attempts: {source}")]
    FlushFailed {
        attempts: u32,
        #[source]
        source: Box<CatalogError>,
    },

    #[error("Walker thread terminated unexpectedly")]
    WalkerPanicked,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
