//! Catalog store backed by SQLite

mod lookup;
mod write;

pub use lookup::{CatalogStatus, FileMatch};

use crate::buffer::{Batch, DirectoryRecord};
use crate::error::CatalogError;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const SCHEMA_VERSION: i32 = 1;

/// A file ready for upsert: its parent directory id is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFile<'a> {
    pub name: &'a str,
    pub modified: i64,
    pub parent_id: i64,
}

/// Ids confirmed by writing one batch
#[derive(Debug, Default, Clone)]
pub struct BatchReceipt {
    pub directory_ids: Vec<i64>,
    pub file_ids: Vec<i64>,
    /// Detached files whose parent directory is not in the catalog
    pub files_dropped: usize,
}

/// Storage operations the indexer needs.
///
/// Every write applies atomically: it either commits fully or leaves the
/// catalog untouched.
pub trait Catalog {
    /// Ids of every directory row (pre-scan snapshot)
    fn known_directory_ids(&self) -> crate::Result<HashSet<i64>>;

    /// Ids of every file row (pre-scan snapshot)
    fn known_file_ids(&self) -> crate::Result<HashSet<i64>>;

    /// Insert or refresh directories; returns `(id, path)` in input order.
    fn upsert_directories(&mut self, records: &[DirectoryRecord])
        -> crate::Result<Vec<(i64, String)>>;

    /// Insert or refresh files keyed on `(name, parent_id)`; returns ids in input order.
    fn upsert_files(&mut self, files: &[ResolvedFile<'_>]) -> crate::Result<Vec<i64>>;

    fn lookup_directory_id(&self, path: &str) -> crate::Result<Option<i64>>;

    /// Write directories, their files and detached files in one transaction.
    fn write_batch(&mut self, batch: &Batch) -> crate::Result<BatchReceipt>;

    fn delete_directories(&mut self, ids: &[i64]) -> crate::Result<usize>;

    fn delete_files(&mut self, ids: &[i64]) -> crate::Result<usize>;

    /// (Re)build the file name index. Idempotent.
    fn build_name_index(&mut self) -> crate::Result<()>;
}

/// SQLite implementation of `Catalog`
pub struct SqliteCatalog {
    pub(crate) conn: Connection,
}

impl SqliteCatalog {
    /// Open or create a catalog database file
    pub fn open(db_path: &Path) -> crate::Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        // WAL for concurrent readers while a scan writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            ",
        )?;
        Self::from_connection(conn)
    }

    /// In-memory catalog, used by tests and dry runs
    pub fn in_memory() -> crate::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an already-open connection, creating the schema if it is missing
    pub fn from_connection(conn: Connection) -> crate::Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for ad-hoc reads
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Give the connection back to the caller, who is responsible for closing it
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn init_schema(conn: &Connection) -> crate::Result<()> {
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version != 0 && version != SCHEMA_VERSION {
            return Err(CatalogError::SchemaVersionMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS directory_info (
                    di_no INTEGER PRIMARY KEY AUTOINCREMENT,
                    di_path TEXT NOT NULL,
                    di_modified_date INTEGER NOT NULL,
                    UNIQUE (di_path)
                );

                CREATE TABLE IF NOT EXISTS file_info (
                    fi_no INTEGER PRIMARY KEY AUTOINCREMENT,
                    fi_name TEXT NOT NULL,
                    fi_modified_date INTEGER NOT NULL,
                    fi_parent INTEGER NOT NULL,
                    UNIQUE (fi_name, fi_parent),
                    FOREIGN KEY (fi_parent) REFERENCES directory_info(di_no)
                );

                PRAGMA user_version = 1;
                ",
            )?;
        }

        Ok(())
    }

    fn collect_ids(&self, sql: &str) -> crate::Result<HashSet<i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut ids = HashSet::new();
        for id in rows {
            ids.insert(id?);
        }
        Ok(ids)
    }
}

impl Catalog for SqliteCatalog {
    fn known_directory_ids(&self) -> crate::Result<HashSet<i64>> {
        self.collect_ids("SELECT di_no FROM directory_info")
    }

    fn known_file_ids(&self) -> crate::Result<HashSet<i64>> {
        self.collect_ids("SELECT fi_no FROM file_info")
    }

    fn upsert_directories(
        &mut self,
        records: &[DirectoryRecord],
    ) -> crate::Result<Vec<(i64, String)>> {
        let tx = self.conn.transaction()?;
        let ids = write::upsert_directories_in_tx(&tx, records)?;
        tx.commit()?;

        Ok(ids
            .into_iter()
            .zip(records)
            .map(|(id, record)| (id, record.path.clone()))
            .collect())
    }

    fn upsert_files(&mut self, files: &[ResolvedFile<'_>]) -> crate::Result<Vec<i64>> {
        let tx = self.conn.transaction()?;
        let ids = write::upsert_files_in_tx(&tx, files)?;
        tx.commit()?;
        Ok(ids)
    }

    fn lookup_directory_id(&self, path: &str) -> crate::Result<Option<i64>> {
        write::lookup_directory_id_in(&self.conn, path)
    }

    fn write_batch(&mut self, batch: &Batch) -> crate::Result<BatchReceipt> {
        let tx = self.conn.transaction()?;

        let directory_ids = write::upsert_directories_in_tx(&tx, &batch.directories)?;

        let mut resolved: Vec<ResolvedFile<'_>> = Vec::with_capacity(batch.file_count());
        for (record, &parent_id) in batch.directories.iter().zip(&directory_ids) {
            resolved.extend(record.children.iter().map(|file| ResolvedFile {
                name: &file.name,
                modified: file.modified,
                parent_id,
            }));
        }

        let mut parents: HashMap<&str, Option<i64>> = HashMap::new();
        let mut files_dropped = 0usize;
        for detached in &batch.detached {
            let parent_id = match parents.get(detached.parent_path.as_str()) {
                Some(cached) => *cached,
                None => {
                    let found = write::lookup_directory_id_in(&tx, &detached.parent_path)?;
                    parents.insert(&detached.parent_path, found);
                    found
                }
            };

            match parent_id {
                Some(parent_id) => resolved.push(ResolvedFile {
                    name: &detached.file.name,
                    modified: detached.file.modified,
                    parent_id,
                }),
                None => {
                    tracing::debug!(
                        parent = %detached.parent_path,
                        name = %detached.file.name,
                        "dropping file with unknown parent"
                    );
                    files_dropped += 1;
                }
            }
        }

        let file_ids = write::upsert_files_in_tx(&tx, &resolved)?;
        tx.commit()?;

        Ok(BatchReceipt {
            directory_ids,
            file_ids,
            files_dropped,
        })
    }

    fn delete_directories(&mut self, ids: &[i64]) -> crate::Result<usize> {
        let tx = self.conn.transaction()?;
        let deleted = write::delete_by_id_in_tx(&tx, "DELETE FROM directory_info WHERE di_no = ?", ids)?;
        tx.commit()?;
        Ok(deleted)
    }

    fn delete_files(&mut self, ids: &[i64]) -> crate::Result<usize> {
        let tx = self.conn.transaction()?;
        let deleted = write::delete_by_id_in_tx(&tx, "DELETE FROM file_info WHERE fi_no = ?", ids)?;
        tx.commit()?;
        Ok(deleted)
    }

    fn build_name_index(&mut self) -> crate::Result<()> {
        self.conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS file_info_fi_name_idx ON file_info (fi_name);",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BatchBuffer, FileRecord};

    fn dir(path: &str, modified: i64, children: &[&str]) -> DirectoryRecord {
        DirectoryRecord {
            path: path.to_string(),
            modified,
            children: children
                .iter()
                .map(|name| FileRecord {
                    name: name.to_string(),
                    modified,
                })
                .collect(),
        }
    }

    #[test]
    fn test_upsert_directories_keeps_ids_stable() {
        let mut catalog = SqliteCatalog::in_memory().unwrap();
        let first = catalog
            .upsert_directories(&[dir("/a", 1, &[]), dir("/b", 1, &[])])
            .unwrap();
        let second = catalog
            .upsert_directories(&[dir("/b", 2, &[]), dir("/a", 2, &[])])
            .unwrap();

        assert_eq!(first[0].1, "/a");
        assert_eq!(second[1], first[0]);
        assert_eq!(second[0], first[1]);

        let modified: i64 = catalog
            .conn
            .query_row(
                "SELECT di_modified_date FROM directory_info WHERE di_path = '/a'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(modified, 2);
    }

    #[test]
    fn test_upsert_files_keyed_on_name_and_parent() {
        let mut catalog = SqliteCatalog::in_memory().unwrap();
        let dirs = catalog
            .upsert_directories(&[dir("/a", 1, &[]), dir("/b", 1, &[])])
            .unwrap();
        let (a, b) = (dirs[0].0, dirs[1].0);

        let files = [
            ResolvedFile { name: "same.txt", modified: 1, parent_id: a },
            ResolvedFile { name: "same.txt", modified: 1, parent_id: b },
        ];
        let first = catalog.upsert_files(&files).unwrap();
        assert_ne!(first[0], first[1]);

        let again = catalog.upsert_files(&files[..1]).unwrap();
        assert_eq!(again, vec![first[0]]);
        assert_eq!(catalog.known_file_ids().unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_file_with_unknown_parent_fails() {
        let mut catalog = SqliteCatalog::in_memory().unwrap();
        let result = catalog.upsert_files(&[ResolvedFile {
            name: "orphan",
            modified: 0,
            parent_id: 9999,
        }]);
        assert!(result.is_err());
        assert!(catalog.known_file_ids().unwrap().is_empty());
    }

    #[test]
    fn test_write_batch_resolves_detached_files() {
        let mut catalog = SqliteCatalog::in_memory().unwrap();
        let mut buffer = BatchBuffer::new();
        buffer.add_directory("/a".to_string(), 1);
        buffer.add_file("/a", "first.txt".to_string(), 1);
        let receipt = catalog.write_batch(&buffer.drain()).unwrap();
        assert_eq!(receipt.directory_ids.len(), 1);
        assert_eq!(receipt.file_ids.len(), 1);

        buffer.add_file("/a", "late.txt".to_string(), 1);
        buffer.add_file("/gone", "lost.txt".to_string(), 1);
        let receipt = catalog.write_batch(&buffer.drain()).unwrap();
        assert_eq!(receipt.file_ids.len(), 1);
        assert_eq!(receipt.files_dropped, 1);

        let parent: i64 = catalog
            .conn
            .query_row(
                "SELECT fi_parent FROM file_info WHERE fi_name = 'late.txt'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(Some(parent), catalog.lookup_directory_id("/a").unwrap());
    }

    #[test]
    fn test_write_batch_is_atomic() {
        let mut catalog = SqliteCatalog::in_memory().unwrap();
        catalog
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON file_info
                 WHEN NEW.fi_name = 'bad' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let batch = Batch {
            directories: vec![dir("/a", 1, &["good", "bad"])],
            detached: Vec::new(),
            bytes: 0,
        };
        assert!(catalog.write_batch(&batch).is_err());
        assert!(catalog.known_directory_ids().unwrap().is_empty());
        assert!(catalog.known_file_ids().unwrap().is_empty());
    }

    #[test]
    fn test_quoted_names_round_trip() {
        let mut catalog = SqliteCatalog::in_memory().unwrap();
        let batch = Batch {
            directories: vec![dir("/it's here", 1, &["it's.txt", "'; DROP TABLE file_info; --"])],
            detached: Vec::new(),
            bytes: 0,
        };
        catalog.write_batch(&batch).unwrap();

        assert!(catalog.lookup_directory_id("/it's here").unwrap().is_some());
        assert_eq!(catalog.known_file_ids().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_files_then_directories() {
        let mut catalog = SqliteCatalog::in_memory().unwrap();
        let batch = Batch {
            directories: vec![dir("/a", 1, &["x.txt"])],
            detached: Vec::new(),
            bytes: 0,
        };
        let receipt = catalog.write_batch(&batch).unwrap();

        assert_eq!(catalog.delete_files(&receipt.file_ids).unwrap(), 1);
        assert_eq!(catalog.delete_directories(&receipt.directory_ids).unwrap(), 1);
        assert_eq!(catalog.delete_files(&[12345]).unwrap(), 0);
        assert!(catalog.known_directory_ids().unwrap().is_empty());
    }

    #[test]
    fn test_build_name_index_is_idempotent() {
        let mut catalog = SqliteCatalog::in_memory().unwrap();
        catalog.build_name_index().unwrap();
        catalog.build_name_index().unwrap();

        let count: i64 = catalog
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'file_info_fi_name_idx'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_schema_version_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 7;").unwrap();
        let err = SqliteCatalog::from_connection(conn).err().unwrap();
        assert!(matches!(
            err,
            CatalogError::SchemaVersionMismatch { found: 7, expected: 1 }
        ));
    }
}
