//! Parameterized write statements shared by the `Catalog` operations.

use super::ResolvedFile;
use crate::buffer::DirectoryRecord;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

const UPSERT_DIRECTORY: &str = "INSERT INTO directory_info (di_path, di_modified_date)
     VALUES (?, ?)
     ON CONFLICT(di_path) DO UPDATE SET di_modified_date = excluded.di_modified_date
     RETURNING di_no";

const UPSERT_FILE: &str = "INSERT INTO file_info (fi_name, fi_modified_date, fi_parent)
     VALUES (?, ?, ?)
     ON CONFLICT(fi_name, fi_parent) DO UPDATE SET fi_modified_date = excluded.fi_modified_date
     RETURNING fi_no";

/// Upsert directories within an existing transaction; ids come back in input order.
pub(super) fn upsert_directories_in_tx(
    tx: &Transaction<'_>,
    records: &[DirectoryRecord],
) -> crate::Result<Vec<i64>> {
    let mut stmt = tx.prepare_cached(UPSERT_DIRECTORY)?;
    let mut ids = Vec::with_capacity(records.len());
    for record in records {
        let id: i64 = stmt.query_row(params![record.path, record.modified], |row| row.get(0))?;
        ids.push(id);
    }
    Ok(ids)
}

/// Upsert files within an existing transaction; ids come back in input order.
pub(super) fn upsert_files_in_tx(
    tx: &Transaction<'_>,
    files: &[ResolvedFile<'_>],
) -> crate::Result<Vec<i64>> {
    let mut stmt = tx.prepare_cached(UPSERT_FILE)?;
    let mut ids = Vec::with_capacity(files.len());
    for file in files {
        let id: i64 = stmt.query_row(params![file.name, file.modified, file.parent_id], |row| {
            row.get(0)
        })?;
        ids.push(id);
    }
    Ok(ids)
}

pub(super) fn lookup_directory_id_in(conn: &Connection, path: &str) -> crate::Result<Option<i64>> {
    let id = conn
        .prepare_cached("SELECT di_no FROM directory_info WHERE di_path = ?")?
        .query_row(params![path], |row| row.get(0))
        .optional()?;
    Ok(id)
}

/// Run a single-id delete statement for every id; returns the rows removed.
pub(super) fn delete_by_id_in_tx(
    tx: &Transaction<'_>,
    sql: &str,
    ids: &[i64],
) -> crate::Result<usize> {
    let mut stmt = tx.prepare_cached(sql)?;
    let mut deleted = 0usize;
    for id in ids {
        deleted += stmt.execute(params![id])?;
    }
    Ok(deleted)
}
