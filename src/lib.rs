//! gridcache
//!
//! Windowed row cache for browsing datasets far too large to hold in
//! memory through a row/column table-view API.
//!
//! ## Architecture
//! - Source layer: `RowSource` contract over any read-only, seekable,
//!   chunked store; `FragmentReader` is the built-in on-disk format
//! - Cache layer: `WindowedTableCache` keeps one contiguous row window
//!   materialized and re-centers it on out-of-window requests
//! - Consumer surface: `row_count` / `column_count` / `column_label` /
//!   `value_at` / `text_at` / `sort`
//!
//! Point queries are amortized O(1) for scroll-dominated access, with peak
//! memory bounded by the configured window size until a global `sort`
//! escalates the cache to full materialization.

pub mod cache;
pub mod config;
pub mod source;
pub mod storage;
pub mod types;

mod error;

pub use cache::{WindowStats, WindowedTableCache};
pub use config::{CacheConfig, DEFAULT_WINDOW_SIZE};
pub use error::{CacheError, Result};
pub use source::{MemorySource, RowSource};
pub use storage::{FragmentReader, FragmentWriter};
pub use types::{ColumnSchema, Row, RowBlock, Value};
