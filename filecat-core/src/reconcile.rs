//! Mark-and-sweep of catalog rows over one generation.
//!
//! Every id present before the walk starts is a stale candidate. Ids returned
//! by batch writes are struck off; whatever is left once the walk has
//! finished belongs to paths that are gone, and is deleted.

use crate::store::{BatchReceipt, Catalog};
use std::collections::HashSet;

/// Rows removed by a sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub directories_deleted: usize,
    pub files_deleted: usize,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    stale_directories: HashSet<i64>,
    stale_files: HashSet<i64>,
}

impl Reconciler {
    /// Snapshot every id currently in the catalog
    pub fn snapshot<C: Catalog>(catalog: &C) -> crate::Result<Self> {
        Ok(Self {
            stale_directories: catalog.known_directory_ids()?,
            stale_files: catalog.known_file_ids()?,
        })
    }

    pub fn confirm(&mut self, receipt: &BatchReceipt) {
        self.confirm_directories(&receipt.directory_ids);
        self.confirm_files(&receipt.file_ids);
    }

    pub fn confirm_directories(&mut self, ids: &[i64]) {
        for id in ids {
            self.stale_directories.remove(id);
        }
    }

    pub fn confirm_files(&mut self, ids: &[i64]) {
        for id in ids {
            self.stale_files.remove(id);
        }
    }

    pub fn pending_directories(&self) -> usize {
        self.stale_directories.len()
    }

    pub fn pending_files(&self) -> usize {
        self.stale_files.len()
    }

    /// Delete every unconfirmed id. Files go first so no file row is ever
    /// left pointing at a deleted directory.
    pub fn sweep<C: Catalog>(self, catalog: &mut C) -> crate::Result<SweepOutcome> {
        let mut files: Vec<i64> = self.stale_files.into_iter().collect();
        files.sort_unstable();
        let mut directories: Vec<i64> = self.stale_directories.into_iter().collect();
        directories.sort_unstable();

        let files_deleted = if files.is_empty() {
            0
        } else {
            catalog.delete_files(&files)?
        };
        let directories_deleted = if directories.is_empty() {
            0
        } else {
            catalog.delete_directories(&directories)?
        };

        Ok(SweepOutcome {
            directories_deleted,
            files_deleted,
        })
    }
}
