//! In-memory staging of walked entries between flushes.
//!
//! Directory records live in a slot vector; a path -> slot map gives in-place
//! access so appending a child never copies the record. Files whose parent
//! was drained by an earlier flush are kept aside as detached files and get
//! their parent id from the store when their batch is written.

use std::collections::HashMap;
use std::mem;

/// A file observed during the walk, not yet bound to a parent id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    /// Modification time in unix seconds
    pub modified: i64,
}

/// A directory observed during the walk together with its buffered files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    /// Absolute, normalized path
    pub path: String,
    /// Modification time in unix seconds
    pub modified: i64,
    pub children: Vec<FileRecord>,
}

/// A file whose parent directory is no longer buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedFile {
    pub parent_path: String,
    pub file: FileRecord,
}

/// Where `BatchBuffer::add_file` put a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePlacement {
    Buffered,
    Detached,
}

/// Drained content of a `BatchBuffer`, ready to be written in one transaction.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    pub directories: Vec<DirectoryRecord>,
    pub detached: Vec<DetachedFile>,
    /// Buffer bytes this batch held when it was drained
    pub bytes: usize,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.detached.is_empty()
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    /// Buffered children plus detached files
    pub fn file_count(&self) -> usize {
        self.directories
            .iter()
            .map(|d| d.children.len())
            .sum::<usize>()
            + self.detached.len()
    }
}

/// Accumulator keyed by directory path, bounded by the flush watermark.
#[derive(Debug, Default)]
pub struct BatchBuffer {
    records: Vec<DirectoryRecord>,
    slots: HashMap<String, usize>,
    detached: Vec<DetachedFile>,
    bytes: usize,
    peak_bytes: usize,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a directory, or refresh the modification time of a buffered one.
    pub fn add_directory(&mut self, path: String, modified: i64) {
        if let Some(&slot) = self.slots.get(&path) {
            self.records[slot].modified = modified;
            return;
        }

        self.charge(directory_cost(&path));
        let slot = self.records.len();
        self.slots.insert(path.clone(), slot);
        self.records.push(DirectoryRecord {
            path,
            modified,
            children: Vec::new(),
        });
    }

    /// Append a file to its buffered parent, or keep it detached when the
    /// parent has already been drained.
    pub fn add_file(&mut self, parent_path: &str, name: String, modified: i64) -> FilePlacement {
        let file = FileRecord { name, modified };

        match self.slots.get(parent_path) {
            Some(&slot) => {
                self.charge(file_cost(&file));
                self.records[slot].children.push(file);
                FilePlacement::Buffered
            }
            None => {
                self.charge(file_cost(&file) + parent_path.len());
                self.detached.push(DetachedFile {
                    parent_path: parent_path.to_string(),
                    file,
                });
                FilePlacement::Detached
            }
        }
    }

    pub fn directory_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.detached.is_empty()
    }

    /// Approximate heap bytes currently held
    pub fn approx_bytes(&self) -> usize {
        self.bytes
    }

    /// Highest `approx_bytes` observed since construction
    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes
    }

    /// Hand out everything buffered and reset to empty.
    pub fn drain(&mut self) -> Batch {
        self.slots = HashMap::new();
        Batch {
            directories: mem::take(&mut self.records),
            detached: mem::take(&mut self.detached),
            bytes: mem::take(&mut self.bytes),
        }
    }

    fn charge(&mut self, bytes: usize) {
        self.bytes += bytes;
        self.peak_bytes = self.peak_bytes.max(self.bytes);
    }
}

// The path is held twice: once in the record, once as the slot key.
fn directory_cost(path: &str) -> usize {
    mem::size_of::<DirectoryRecord>() + mem::size_of::<(String, usize)>() + 2 * path.len()
}

fn file_cost(file: &FileRecord) -> usize {
    mem::size_of::<FileRecord>() + file.name.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_attach_to_buffered_parent() {
        let mut buffer = BatchBuffer::new();
        buffer.add_directory("/a".to_string(), 10);
        assert_eq!(
            buffer.add_file("/a", "x.txt".to_string(), 11),
            FilePlacement::Buffered
        );
        assert_eq!(
            buffer.add_file("/a", "y.txt".to_string(), 12),
            FilePlacement::Buffered
        );

        let batch = buffer.drain();
        assert_eq!(batch.directory_count(), 1);
        assert_eq!(batch.file_count(), 2);
        assert_eq!(batch.directories[0].children[1].name, "y.txt");
        assert!(batch.detached.is_empty());
    }

    #[test]
    fn test_readding_directory_keeps_children() {
        let mut buffer = BatchBuffer::new();
        buffer.add_directory("/a".to_string(), 10);
        buffer.add_file("/a", "x.txt".to_string(), 11);
        let bytes = buffer.approx_bytes();

        buffer.add_directory("/a".to_string(), 20);
        assert_eq!(buffer.directory_count(), 1);
        assert_eq!(buffer.approx_bytes(), bytes);

        let batch = buffer.drain();
        assert_eq!(batch.directories[0].modified, 20);
        assert_eq!(batch.directories[0].children.len(), 1);
    }

    #[test]
    fn test_file_after_drain_is_detached() {
        let mut buffer = BatchBuffer::new();
        buffer.add_directory("/a".to_string(), 10);
        let first = buffer.drain();
        assert_eq!(first.directory_count(), 1);

        assert_eq!(
            buffer.add_file("/a", "late.txt".to_string(), 11),
            FilePlacement::Detached
        );
        let second = buffer.drain();
        assert!(second.directories.is_empty());
        assert_eq!(second.detached.len(), 1);
        assert_eq!(second.detached[0].parent_path, "/a");
        assert_eq!(second.file_count(), 1);
    }

    #[test]
    fn test_drain_resets_bytes_but_keeps_peak() {
        let mut buffer = BatchBuffer::new();
        assert_eq!(buffer.approx_bytes(), 0);

        buffer.add_directory("/some/dir".to_string(), 1);
        for i in 0..10 {
            buffer.add_file("/some/dir", format!("file_{i}.bin"), 1);
        }
        let held = buffer.approx_bytes();
        assert!(held > 0);

        let batch = buffer.drain();
        assert!(!batch.is_empty());
        assert_eq!(batch.bytes, held);
        assert!(buffer.is_empty());
        assert_eq!(buffer.approx_bytes(), 0);
        assert_eq!(buffer.peak_bytes(), held);

        // The drained directory is gone, so its files now detach
        assert_eq!(
            buffer.add_file("/some/dir", "after.bin".to_string(), 1),
            FilePlacement::Detached
        );
    }
}
