//! Backing source contract
//!
//! A dataset is any read-only, seekable store that can report its shape and
//! serve contiguous row ranges. The cache never assumes more than this.

mod memory;

pub use memory::MemorySource;

use crate::types::{ColumnSchema, RowBlock};
use crate::Result;

/// Read-only, row-addressable backing store.
///
/// Implementations must clamp `end` to `row_count()` and return whatever is
/// available from `start` onward (possibly empty) rather than failing on an
/// overshooting range. An `Err` from `read_rows` means the source itself is
/// broken (file gone, data corrupt), not that the range was empty.
pub trait RowSource {
    /// Total number of rows in the dataset
    fn row_count(&self) -> usize;

    /// Column shape, identical for every row
    fn schema(&self) -> &ColumnSchema;

    /// Read rows `[start, end)`, clamped to the available range
    fn read_rows(&mut self, start: usize, end: usize) -> Result<RowBlock>;
}
