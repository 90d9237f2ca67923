//! Flush policy: when to drain the buffer, and how a drained batch is written.

use crate::buffer::{Batch, BatchBuffer};
use crate::error::CatalogError;
use crate::store::{BatchReceipt, Catalog};
use tracing::warn;

/// Result of writing one batch
#[derive(Debug)]
pub struct FlushOutcome {
    pub receipt: BatchReceipt,
    /// 1 on first-try success, 2 when the retry was needed
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FlushController {
    watermark_bytes: usize,
}

impl FlushController {
    /// A failed write is retried once before the scan is aborted
    pub const MAX_ATTEMPTS: u32 = 2;

    pub fn new(watermark_bytes: usize) -> Self {
        Self { watermark_bytes }
    }

    /// True when the producer must wait for batches in flight before it
    /// buffers more: `buffered + in_flight` has reached the watermark.
    pub fn must_wait(&self, buffered: usize, in_flight: usize) -> bool {
        in_flight > 0 && buffered.saturating_add(in_flight) >= self.watermark_bytes
    }

    /// True once the buffer holds half the watermark; the other half is left
    /// for the batch the writer is working on.
    ///
    /// Checked when a directory is entered, before it is added. Files of an
    /// already drained directory that the walk reaches later (siblings sorted
    /// after a subdirectory) are buffered as detached files.
    pub fn should_flush(&self, buffer: &BatchBuffer) -> bool {
        !buffer.is_empty() && buffer.approx_bytes() >= self.watermark_bytes / 2
    }

    /// Write `batch`, retrying once. The second failure is fatal.
    pub fn write<C: Catalog>(&self, catalog: &mut C, batch: &Batch) -> crate::Result<FlushOutcome> {
        let mut attempt = 1;
        loop {
            match catalog.write_batch(batch) {
                Ok(receipt) => {
                    return Ok(FlushOutcome {
                        receipt,
                        attempts: attempt,
                    })
                }
                Err(err) if attempt < Self::MAX_ATTEMPTS => {
                    warn!(
                        attempt,
                        directories = batch.directory_count(),
                        files = batch.file_count(),
                        error = %err,
                        "batch write failed, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => {
                    return Err(CatalogError::FlushFailed {
                        attempts: attempt,
                        source: Box::new(err),
                    })
                }
            }
        }
    }
}
