//! In-memory row source
//!
//! Backs small datasets directly from a `Vec` and counts range reads, which
//! lets tests assert that in-window accesses never touch the source.

use super::RowSource;
use crate::types::{ColumnSchema, Row, RowBlock};
use crate::{CacheError, Result};

/// Row source over an in-memory block of rows
pub struct MemorySource {
    schema: ColumnSchema,
    rows: Vec<Row>,
    reads: u64,
}

impl MemorySource {
    /// Create a source over `rows`, all of which must match `schema.width()`
    pub fn new(schema: ColumnSchema, rows: Vec<Row>) -> Result<Self> {
        let width = schema.width();
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(CacheError::InvalidData(format!(
                "row {} has {} values, schema width is {}",
                bad,
                rows[bad].len(),
                width
            )));
        }
        Ok(Self {
            schema,
            rows,
            reads: 0,
        })
    }

    /// Number of range reads served so far
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl RowSource for MemorySource {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    fn read_rows(&mut self, start: usize, end: usize) -> Result<RowBlock> {
        self.reads += 1;
        let end = end.min(self.rows.len());
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(self.rows[start..end].to_vec())
    }
}
