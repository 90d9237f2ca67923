//! Filecat Core - Incremental filesystem catalog
//!
//! This library walks a filesystem tree, stages what it finds in a
//! memory-bounded buffer, flushes batches into a SQLite catalog and sweeps
//! rows for paths that disappeared since the previous run.

pub mod buffer;
pub mod config;
pub mod error;
pub mod flush;
pub mod indexer;
pub mod reconcile;
pub mod store;
pub mod walker;

pub use buffer::{Batch, BatchBuffer, DetachedFile, DirectoryRecord, FilePlacement, FileRecord};
pub use config::Config;
pub use error::CatalogError;
pub use flush::{FlushController, FlushOutcome};
pub use indexer::{IndexStats, Indexer};
pub use reconcile::{Reconciler, SweepOutcome};
pub use store::{BatchReceipt, Catalog, CatalogStatus, FileMatch, ResolvedFile, SqliteCatalog};
pub use walker::{EntryKind, TreeWalker, WalkEntry, WalkOptions};

/// Result type alias for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
