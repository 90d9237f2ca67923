//! One indexing generation: snapshot, walk/write pipeline, sweep.
//!
//! The walk runs on a scoped producer thread that owns the `BatchBuffer`.
//! Drained batches cross a bounded channel to the calling thread, which is
//! the only writer to the catalog and the only owner of the `Reconciler`.
//! A full channel blocks the walker until the writer catches up.
//!
//! The writer acknowledges every batch it has written and released with the
//! batch's byte count. The walker keeps its buffer plus the unacknowledged
//! bytes under the watermark, waiting on acknowledgements when it has to.

use crate::buffer::{Batch, BatchBuffer, FilePlacement};
use crate::config::Config;
use crate::error::CatalogError;
use crate::flush::FlushController;
use crate::reconcile::Reconciler;
use crate::store::Catalog;
use crate::walker::{EntryKind, TreeWalker, WalkOptions};
use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Statistics from one indexing run
#[derive(Debug, Default, Clone, Serialize)]
pub struct IndexStats {
    pub directories_seen: usize,
    pub files_seen: usize,
    pub directories_deleted: usize,
    pub files_deleted: usize,
    /// Entries the walker could not read
    pub entries_skipped: usize,
    /// Files whose parent directory could not be resolved at flush time
    pub files_dropped: usize,
    pub flushes: usize,
    pub flush_retries: usize,
    /// Largest size of the walker's own buffer
    pub peak_buffered_bytes: usize,
    /// Largest buffer plus batches in flight to the writer
    pub peak_staged_bytes: usize,
    pub elapsed_ms: u64,
}

/// Producer-side counters
#[derive(Debug, Default)]
struct WalkSummary {
    directories: usize,
    files: usize,
    detached: usize,
    skipped: usize,
    peak_bytes: usize,
    peak_staged: usize,
}

/// Writer-side counters
#[derive(Debug, Default)]
struct WriteSummary {
    flushes: usize,
    retries: usize,
    files_dropped: usize,
}

/// Entry point: indexes a root into an owned catalog
pub struct Indexer<C: Catalog> {
    catalog: C,
    config: Config,
}

impl<C: Catalog> Indexer<C> {
    pub fn new(catalog: C, config: Config) -> Self {
        Self { catalog, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn into_catalog(self) -> C {
        self.catalog
    }

    /// Run one generation over `root`.
    ///
    /// Rows not confirmed by this walk are deleted only if the walk and every
    /// flush completed; a fatal error leaves the catalog as of the last
    /// successful flush.
    pub fn index(&mut self, root: &Path) -> crate::Result<IndexStats> {
        let started = Instant::now();
        let options = WalkOptions::from_config(&self.config)?;
        let root = TreeWalker::resolve_root(root)?;

        let mut reconciler = Reconciler::snapshot(&self.catalog)?;
        info!(
            root = %root.display(),
            known_directories = reconciler.pending_directories(),
            known_files = reconciler.pending_files(),
            "starting index generation"
        );

        let controller = FlushController::new(self.config.indexing.watermark_bytes);
        let (tx, rx) = crossbeam_channel::bounded::<Batch>(self.config.indexing.pipeline_depth);
        let (ack_tx, ack_rx) = crossbeam_channel::unbounded::<usize>();

        // Set by the writer on a fatal error so the walker stops early
        let cancelled = AtomicBool::new(false);
        let cancelled_ref = &cancelled;
        let root_ref = root.as_path();
        let options_ref = &options;
        let catalog = &mut self.catalog;
        let mut written = WriteSummary::default();

        let (walk_result, write_result) = std::thread::scope(|s| {
            let producer = s.spawn(move || {
                walk_into_batches(root_ref, options_ref, controller, tx, ack_rx, cancelled_ref)
            });

            // rx and ack_tx are consumed here, so a failed writer disconnects
            // both channels and unblocks a walker waiting on either
            let write_result =
                write_batches(catalog, rx, ack_tx, controller, &mut reconciler, &mut written);
            if write_result.is_err() {
                cancelled.store(true, Ordering::Relaxed);
            }

            (producer.join(), write_result)
        });

        write_result?;
        let walked = match walk_result {
            Ok(result) => result?,
            Err(_) => return Err(CatalogError::WalkerPanicked),
        };

        let sweep = reconciler.sweep(&mut self.catalog)?;
        self.catalog.build_name_index()?;

        let stats = IndexStats {
            directories_seen: walked.directories,
            files_seen: walked.files,
            directories_deleted: sweep.directories_deleted,
            files_deleted: sweep.files_deleted,
            entries_skipped: walked.skipped,
            files_dropped: written.files_dropped,
            flushes: written.flushes,
            flush_retries: written.retries,
            peak_buffered_bytes: walked.peak_bytes,
            peak_staged_bytes: walked.peak_staged,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            directories = stats.directories_seen,
            files = stats.files_seen,
            detached_files = walked.detached,
            directories_deleted = stats.directories_deleted,
            files_deleted = stats.files_deleted,
            skipped = stats.entries_skipped,
            flushes = stats.flushes,
            peak_staged_bytes = stats.peak_staged_bytes,
            elapsed_ms = stats.elapsed_ms,
            "index generation complete"
        );

        Ok(stats)
    }
}

/// Producer: walk the tree, buffer entries, send a drained batch whenever the
/// flush threshold is reached at a directory boundary, and once more at the end.
fn walk_into_batches(
    root: &Path,
    options: &WalkOptions,
    controller: FlushController,
    tx: Sender<Batch>,
    acks: Receiver<usize>,
    cancelled: &AtomicBool,
) -> crate::Result<WalkSummary> {
    let mut walker = TreeWalker::new(root, options)?;
    let mut buffer = BatchBuffer::new();
    let mut summary = WalkSummary::default();
    // Bytes sent to the writer and not yet acknowledged
    let mut in_flight = 0usize;

    'walk: for entry in walker.by_ref() {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }

        match entry.kind {
            EntryKind::Directory => {
                in_flight -= acks.try_iter().sum::<usize>();
                while controller.must_wait(buffer.approx_bytes(), in_flight) {
                    match acks.recv() {
                        Ok(bytes) => in_flight -= bytes,
                        // The writer is gone; it reports the cause
                        Err(_) => break 'walk,
                    }
                }

                if controller.should_flush(&buffer) {
                    debug!(
                        bytes = buffer.approx_bytes(),
                        in_flight,
                        directories = buffer.directory_count(),
                        "flush threshold reached, draining buffer"
                    );
                    let batch = buffer.drain();
                    in_flight += batch.bytes;
                    if tx.send(batch).is_err() {
                        break;
                    }
                }
                buffer.add_directory(entry.path, entry.modified);
                summary.directories += 1;
            }
            EntryKind::File => {
                let Some(parent) = entry.parent else {
                    continue;
                };
                if buffer.add_file(&parent, entry.name, entry.modified) == FilePlacement::Detached {
                    summary.detached += 1;
                }
                summary.files += 1;
            }
        }

        summary.peak_staged = summary.peak_staged.max(buffer.approx_bytes() + in_flight);
    }

    if !cancelled.load(Ordering::Relaxed) && !buffer.is_empty() {
        // A send error means the writer already failed; it reports the cause
        let _ = tx.send(buffer.drain());
    }

    summary.skipped = walker.skipped();
    summary.peak_bytes = buffer.peak_bytes();
    Ok(summary)
}

/// Writer: persist batches in arrival order and confirm their ids.
fn write_batches<C: Catalog>(
    catalog: &mut C,
    rx: Receiver<Batch>,
    acks: Sender<usize>,
    controller: FlushController,
    reconciler: &mut Reconciler,
    summary: &mut WriteSummary,
) -> crate::Result<()> {
    for batch in rx.iter() {
        let outcome = controller.write(catalog, &batch)?;
        reconciler.confirm(&outcome.receipt);

        summary.flushes += 1;
        summary.retries += (outcome.attempts - 1) as usize;
        summary.files_dropped += outcome.receipt.files_dropped;

        debug!(
            directories = batch.directory_count(),
            files = batch.file_count(),
            dropped = outcome.receipt.files_dropped,
            attempts = outcome.attempts,
            "batch flushed"
        );

        let bytes = batch.bytes;
        drop(batch);
        // The walker may have finished already; nobody is waiting then
        let _ = acks.send(bytes);
    }
    Ok(())
}
