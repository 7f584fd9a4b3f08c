//! Fragment file: chunked read-only table storage
//!
//! ## File Format
//! ```text
//! [Header: magic | version | rows_per_chunk | schema_len | schema (bincode)]
//! [Chunk 0] [Chunk 1] ... [Chunk N-1]
//! [Chunk directory: (offset, compressed_len) per chunk]
//! [Footer: directory_offset | chunk_count | total_rows | magic]
//! ```
//!
//! Each chunk is a bincode-encoded `RowBlock`, Snappy-compressed, followed
//! by a crc32 of the compressed bytes. Reads decode only the chunks that
//! overlap the requested row range.

use crate::source::RowSource;
use crate::types::{ColumnSchema, Row, RowBlock};
use crate::{CacheError, Result};
use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Magic number for fragment files (ASCII "GRID")
const FRAGMENT_MAGIC: u32 = 0x47524944;

/// Fragment format version
const FRAGMENT_VERSION: u32 = 1;

/// Footer size: directory_offset u64 + chunk_count u32 + total_rows u64 + magic u32
const FOOTER_SIZE: usize = 24;

/// Directory entry size: offset u64 + compressed_len u32
const DIR_ENTRY_SIZE: usize = 12;

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// One-shot fragment file builder.
///
/// Rows are appended in order and flushed a chunk at a time; `finish` writes
/// the directory and footer. The produced file is immutable.
pub struct FragmentWriter {
    writer: BufWriter<File>,
    schema: ColumnSchema,
    rows_per_chunk: usize,
    pending: RowBlock,
    directory: Vec<(u64, u32)>,
    offset: u64,
    total_rows: u64,
}

impl FragmentWriter {
    /// Create a fragment file at `path`, truncating any existing file
    pub fn create<P: AsRef<Path>>(
        path: P,
        schema: ColumnSchema,
        rows_per_chunk: usize,
    ) -> Result<Self> {
        if rows_per_chunk == 0 {
            return Err(CacheError::InvalidData(
                "rows_per_chunk must be positive".into(),
            ));
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        let schema_bytes = bincode::serialize(&schema)?;
        writer.write_all(&FRAGMENT_MAGIC.to_le_bytes())?;
        writer.write_all(&FRAGMENT_VERSION.to_le_bytes())?;
        writer.write_all(&(rows_per_chunk as u32).to_le_bytes())?;
        writer.write_all(&(schema_bytes.len() as u32).to_le_bytes())?;
        writer.write_all(&schema_bytes)?;
        let offset = (16 + schema_bytes.len()) as u64;

        Ok(Self {
            writer,
            schema,
            rows_per_chunk,
            pending: Vec::new(),
            directory: Vec::new(),
            offset,
            total_rows: 0,
        })
    }

    /// Append a single row
    pub fn append_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.schema.width() {
            return Err(CacheError::InvalidData(format!(
                "row has {} values, schema width is {}",
                row.len(),
                self.schema.width()
            )));
        }
        self.pending.push(row);
        self.total_rows += 1;
        if self.pending.len() >= self.rows_per_chunk {
            self.flush_chunk()?;
        }
        Ok(())
    }

    /// Append a block of rows
    pub fn append_rows(&mut self, rows: RowBlock) -> Result<()> {
        for row in rows {
            self.append_row(row)?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> Result<()> {
        let encoded = bincode::serialize(&self.pending)?;
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&encoded)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let crc = compute_crc(&compressed);

        self.writer
            .write_all(&(compressed.len() as u32).to_le_bytes())?;
        self.writer.write_all(&compressed)?;
        self.writer.write_all(&crc.to_le_bytes())?;

        self.directory.push((self.offset, compressed.len() as u32));
        self.offset += (4 + compressed.len() + 4) as u64;
        self.pending.clear();
        Ok(())
    }

    /// Flush any partial chunk, write directory and footer, and sync
    pub fn finish(mut self) -> Result<()> {
        if !self.pending.is_empty() {
            self.flush_chunk()?;
        }

        let directory_offset = self.offset;
        for (offset, len) in &self.directory {
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(&len.to_le_bytes())?;
        }

        self.writer.write_all(&directory_offset.to_le_bytes())?;
        self.writer
            .write_all(&(self.directory.len() as u32).to_le_bytes())?;
        self.writer.write_all(&self.total_rows.to_le_bytes())?;
        self.writer.write_all(&FRAGMENT_MAGIC.to_le_bytes())?;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// Memory-mapped fragment file reader
pub struct FragmentReader {
    path: PathBuf,
    mmap: Mmap,
    schema: ColumnSchema,
    rows_per_chunk: usize,
    total_rows: usize,
    directory: Vec<(u64, u32)>,
}

impl FragmentReader {
    /// Open an existing fragment file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // Safety: the file is opened read-only and the format is append-only;
        // nothing remaps or truncates it while the reader is alive.
        let mmap = unsafe { Mmap::map(&file)? };
        let data: &[u8] = &mmap;

        if data.len() < 16 + FOOTER_SIZE {
            return Err(CacheError::Corruption(format!(
                "fragment file too short: {} bytes",
                data.len()
            )));
        }
        if read_u32(data, 0)? != FRAGMENT_MAGIC {
            return Err(CacheError::Corruption("bad fragment magic".into()));
        }
        let version = read_u32(data, 4)?;
        if version != FRAGMENT_VERSION {
            return Err(CacheError::InvalidData(format!(
                "unsupported fragment version {}",
                version
            )));
        }
        let rows_per_chunk = read_u32(data, 8)? as usize;
        if rows_per_chunk == 0 {
            return Err(CacheError::Corruption("zero rows_per_chunk".into()));
        }
        let schema_len = read_u32(data, 12)? as usize;
        let schema_bytes = slice(data, 16, schema_len)?;
        let schema: ColumnSchema = bincode::deserialize(schema_bytes)?;

        let footer_start = data.len() - FOOTER_SIZE;
        if read_u32(data, footer_start + 20)? != FRAGMENT_MAGIC {
            return Err(CacheError::Corruption("bad footer magic".into()));
        }
        let directory_offset = read_u64(data, footer_start)? as usize;
        let chunk_count = read_u32(data, footer_start + 8)? as usize;
        let total_rows = read_u64(data, footer_start + 12)? as usize;

        let mut directory = Vec::with_capacity(chunk_count);
        for i in 0..chunk_count {
            let entry = directory_offset + i * DIR_ENTRY_SIZE;
            directory.push((read_u64(data, entry)?, read_u32(data, entry + 8)?));
        }
        if total_rows > chunk_count * rows_per_chunk {
            return Err(CacheError::Corruption(format!(
                "{} rows cannot fit in {} chunks of {}",
                total_rows, chunk_count, rows_per_chunk
            )));
        }

        Ok(Self {
            path,
            mmap,
            schema,
            rows_per_chunk,
            total_rows,
            directory,
        })
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode one chunk, verifying its checksum
    fn read_chunk(&self, chunk: usize) -> Result<RowBlock> {
        let (offset, len) = self.directory[chunk];
        let data: &[u8] = &self.mmap;
        let compressed = slice(data, offset as usize + 4, len as usize)?;
        let stored_crc = read_u32(data, offset as usize + 4 + len as usize)?;
        let actual_crc = compute_crc(compressed);
        if stored_crc != actual_crc {
            return Err(CacheError::Corruption(format!(
                "chunk {} checksum mismatch: expected {:#010x}, got {:#010x}",
                chunk, stored_crc, actual_crc
            )));
        }
        let encoded = snap::raw::Decoder::new()
            .decompress_vec(compressed)
            .map_err(|e| CacheError::Corruption(e.to_string()))?;
        let block: RowBlock = bincode::deserialize(&encoded)?;
        Ok(block)
    }
}

impl RowSource for FragmentReader {
    fn row_count(&self) -> usize {
        self.total_rows
    }

    fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    fn read_rows(&mut self, start: usize, end: usize) -> Result<RowBlock> {
        let end = end.min(self.total_rows);
        if start >= end {
            return Ok(Vec::new());
        }

        let first_chunk = start / self.rows_per_chunk;
        let last_chunk = (end - 1) / self.rows_per_chunk;

        let mut rows = Vec::with_capacity(end - start);
        for chunk in first_chunk..=last_chunk {
            let block = self.read_chunk(chunk)?;
            let chunk_base = chunk * self.rows_per_chunk;
            let lo = start.saturating_sub(chunk_base);
            let hi = (end - chunk_base).min(block.len());
            if lo >= hi {
                return Err(CacheError::Corruption(format!(
                    "chunk {} holds {} rows, expected coverage of [{}, {})",
                    chunk, block.len(), start, end
                )));
            }
            rows.extend_from_slice(&block[lo..hi]);
        }
        Ok(rows)
    }
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    let bytes = slice(data, at, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(data: &[u8], at: usize) -> Result<u64> {
    let bytes = slice(data, at, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

fn slice(data: &[u8], at: usize, len: usize) -> Result<&[u8]> {
    data.get(at..at + len).ok_or_else(|| {
        CacheError::Corruption(format!(
            "read of {} bytes at {} past end of {}-byte file",
            len,
            at,
            data.len()
        ))
    })
}
