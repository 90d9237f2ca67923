//! Depth-first, pre-order filesystem walk built on the ignore crate.

use crate::config::Config;
use crate::error::CatalogError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Kind of a walked entry. Anything that is not a directory is catalogued as a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One entry of the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub kind: EntryKind,
    pub name: String,
    pub path: String,
    /// Path of the containing directory; `None` only for the root
    pub parent: Option<String>,
    /// Modification time in unix seconds
    pub modified: i64,
    pub depth: usize,
}

/// Walk settings resolved from config
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub follow_links: bool,
    pub one_file_system: bool,
    exclude: GlobSet,
}

impl WalkOptions {
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self {
            follow_links: config.indexing.follow_links,
            one_file_system: config.indexing.one_file_system,
            exclude: build_exclude_set(&config.ignore.patterns)?,
        })
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            one_file_system: false,
            exclude: GlobSet::empty(),
        }
    }
}

/// Lazy pre-order walk over a root directory.
///
/// Unreadable entries are skipped and counted, never fatal.
pub struct TreeWalker {
    root: PathBuf,
    inner: ignore::Walk,
    skipped: usize,
}

impl TreeWalker {
    pub fn new(root: &Path, options: &WalkOptions) -> crate::Result<Self> {
        let root = Self::resolve_root(root)?;

        let mut builder = WalkBuilder::new(&root);
        builder.standard_filters(false);
        builder.follow_links(options.follow_links);
        builder.same_file_system(options.one_file_system);
        builder.sort_by_file_name(|a, b| a.cmp(b));

        if !options.exclude.is_empty() {
            let exclude = options.exclude.clone();
            let filter_root = root.clone();
            builder.filter_entry(move |entry| {
                let relative = entry
                    .path()
                    .strip_prefix(&filter_root)
                    .unwrap_or(entry.path());
                relative.as_os_str().is_empty() || !exclude.is_match(relative)
            });
        }

        Ok(Self {
            inner: builder.build(),
            root,
            skipped: 0,
        })
    }

    /// Canonicalize `root` and check that it is a readable directory
    pub fn resolve_root(root: &Path) -> crate::Result<PathBuf> {
        let canonical = root.canonicalize().map_err(|e| CatalogError::InvalidRoot {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !canonical.is_dir() {
            return Err(CatalogError::InvalidRoot {
                path: canonical,
                reason: "not a directory".to_string(),
            });
        }
        if canonical.to_str().is_none() {
            return Err(CatalogError::NonUtf8Path(canonical));
        }

        Ok(canonical)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries skipped so far (unreadable, vanished or non-UTF-8)
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn convert(&self, entry: &DirEntry) -> Option<WalkEntry> {
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                debug!(path = %entry.path().display(), error = %err, "skipping entry without metadata");
                return None;
            }
        };

        let path = match entry.path().to_str() {
            Some(p) => p.to_string(),
            None => {
                debug!(path = %entry.path().display(), "skipping non-UTF-8 path");
                return None;
            }
        };

        let name = if entry.depth() == 0 {
            path.clone()
        } else {
            entry.file_name().to_str()?.to_string()
        };

        let parent = if entry.depth() == 0 {
            None
        } else {
            Some(entry.path().parent()?.to_str()?.to_string())
        };

        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        let modified = metadata.modified().map(unix_seconds).unwrap_or(0);

        Some(WalkEntry {
            kind,
            name,
            path,
            parent,
            modified,
            depth: entry.depth(),
        })
    }
}

impl Iterator for TreeWalker {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        loop {
            let entry = match self.inner.next()? {
                Ok(e) => e,
                Err(err) => {
                    debug!(error = %err, "skipping unreadable entry");
                    self.skipped += 1;
                    continue;
                }
            };

            match self.convert(&entry) {
                Some(walked) => return Some(walked),
                None => self.skipped += 1,
            }
        }
    }
}

/// Convert a timestamp to unix seconds; times before the epoch are negative.
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

fn build_exclude_set(patterns: &[String]) -> crate::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob_pattern = if pattern.contains('*') || pattern.contains('?') || pattern.contains('/')
        {
            pattern.clone()
        } else {
            format!("**/{}", pattern)
        };
        builder.add(Glob::new(&glob_pattern).map_err(|e| CatalogError::GlobPattern(e.to_string()))?);
    }
    builder
        .build()
        .map_err(|e| CatalogError::GlobPattern(e.to_string()))
}
