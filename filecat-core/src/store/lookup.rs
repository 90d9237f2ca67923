//! Read-only lookups against the catalog

use super::{SqliteCatalog, SCHEMA_VERSION};
use rusqlite::params;
use serde::Serialize;
use std::path::Path;

/// A file found by a lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMatch {
    pub path: String,
    pub name: String,
    pub modified: i64,
    pub file_id: i64,
    pub directory_id: i64,
}

/// Catalog summary
#[derive(Debug, Serialize)]
pub struct CatalogStatus {
    pub directories: usize,
    pub files: usize,
    pub schema_version: i32,
    pub name_index: bool,
    pub size_bytes: u64,
}

const MATCH_SELECT: &str = "SELECT d.di_path, f.fi_name, f.fi_modified_date, f.fi_no, d.di_no
     FROM file_info f
     JOIN directory_info d ON f.fi_parent = d.di_no";

impl SqliteCatalog {
    /// Files whose name is exactly `name`
    pub fn find_by_name(&self, name: &str, limit: usize) -> crate::Result<Vec<FileMatch>> {
        self.query_matches(
            &format!("{MATCH_SELECT} WHERE f.fi_name = ? ORDER BY d.di_path LIMIT ?"),
            name,
            limit,
        )
    }

    /// Files whose name matches a glob-style pattern (`*`, `?`, `[...]`), case-sensitive
    pub fn find_matching(&self, pattern: &str, limit: usize) -> crate::Result<Vec<FileMatch>> {
        self.query_matches(
            &format!("{MATCH_SELECT} WHERE f.fi_name GLOB ? ORDER BY d.di_path, f.fi_name LIMIT ?"),
            pattern,
            limit,
        )
    }

    pub fn directory_count(&self) -> crate::Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM directory_info", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn file_count(&self) -> crate::Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM file_info", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn status(&self) -> crate::Result<CatalogStatus> {
        let name_index: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'file_info_fi_name_idx'",
            [],
            |row| row.get(0),
        )?;
        let page_count: i64 = self
            .conn
            .pragma_query_value(None, "page_count", |row| row.get(0))?;
        let page_size: i64 = self
            .conn
            .pragma_query_value(None, "page_size", |row| row.get(0))?;

        Ok(CatalogStatus {
            directories: self.directory_count()?,
            files: self.file_count()?,
            schema_version: SCHEMA_VERSION,
            name_index: name_index > 0,
            size_bytes: (page_count * page_size) as u64,
        })
    }

    fn query_matches(&self, sql: &str, value: &str, limit: usize) -> crate::Result<Vec<FileMatch>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![value, limit as i64], |row| {
            let dir: String = row.get(0)?;
            let name: String = row.get(1)?;
            Ok(FileMatch {
                path: join_path(&dir, &name),
                name,
                modified: row.get(2)?,
                file_id: row.get(3)?,
                directory_id: row.get(4)?,
            })
        })?;

        let mut matches = Vec::new();
        for row in rows {
            matches.push(row?);
        }
        Ok(matches)
    }
}

fn join_path(dir: &str, name: &str) -> String {
    Path::new(dir).join(name).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Batch, DirectoryRecord, FileRecord};
    use crate::store::Catalog;

    fn seeded() -> SqliteCatalog {
        let mut catalog = SqliteCatalog::in_memory().unwrap();
        let file = |name: &str| FileRecord {
            name: name.to_string(),
            modified: 5,
        };
        let batch = Batch {
            directories: vec![
                DirectoryRecord {
                    path: "/".to_string(),
                    modified: 1,
                    children: vec![file("notes.txt")],
                },
                DirectoryRecord {
                    path: "/home/user".to_string(),
                    modified: 1,
                    children: vec![file("notes.txt"), file("it's.txt"), file("main.rs")],
                },
            ],
            detached: Vec::new(),
            bytes: 0,
        };
        catalog.write_batch(&batch).unwrap();
        catalog.build_name_index().unwrap();
        catalog
    }

    #[test]
    fn test_find_by_name_returns_full_paths() {
        let catalog = seeded();
        let hits = catalog.find_by_name("notes.txt", 10).unwrap();
        let paths: Vec<&str> = hits.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["/notes.txt", "/home/user/notes.txt"]);
        assert_eq!(hits[0].modified, 5);

        assert_eq!(catalog.find_by_name("notes.txt", 1).unwrap().len(), 1);
        assert!(catalog.find_by_name("missing", 10).unwrap().is_empty());
    }

    #[test]
    fn test_find_matching_glob() {
        let catalog = seeded();
        let hits = catalog.find_matching("*.txt", 10).unwrap();
        assert_eq!(hits.len(), 3);

        let quoted = catalog.find_matching("it'?.txt", 10).unwrap();
        assert_eq!(quoted.len(), 1);
        assert_eq!(quoted[0].path, "/home/user/it's.txt");
    }

    #[test]
    fn test_status_counts() {
        let catalog = seeded();
        let status = catalog.status().unwrap();
        assert_eq!(status.directories, 2);
        assert_eq!(status.files, 4);
        assert_eq!(status.schema_version, 1);
        assert!(status.name_index);
        assert!(status.size_bytes > 0);
    }
}
