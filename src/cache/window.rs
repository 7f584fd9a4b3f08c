//! Windowed table cache
//!
//! Keeps a contiguous window of rows materialized in memory and answers
//! point queries by translating a global row index into a window-local
//! offset. An out-of-window request replaces the window wholesale with a
//! freshly fetched range centered on the requested row, so scroll-dominated
//! access patterns pay one range read per `window_size` point queries.
//!
//! **Memory**: peak `O(window_size)` rows, regardless of dataset size,
//! until `sort` escalates the cache to full materialization.

use crate::config::CacheConfig;
use crate::source::RowSource;
use crate::types::{ColumnSchema, RowBlock, Value};
use crate::{CacheError, Result};
use std::ops::Range;
use tracing::{debug, warn};

/// The materialized window: a contiguous row range read from the source.
///
/// Replaced wholesale on refresh, never patched in place, so a
/// partially-updated window is not a reachable state.
struct Window {
    start: usize,
    rows: RowBlock,
}

impl Window {
    fn empty() -> Self {
        Self {
            start: 0,
            rows: Vec::new(),
        }
    }

    fn contains(&self, row: usize) -> bool {
        row >= self.start && row < self.start + self.rows.len()
    }
}

/// State for a bound dataset. The schema tag is resolved once at bind time
/// and never re-derived on the access path.
struct Bound<S> {
    source: S,
    schema: ColumnSchema,
    total_rows: usize,
    window: Window,
    /// Set by `sort`: the window spans the whole dataset until rebind
    materialized: bool,
    /// Set by a failed range read: the window is gone and queries fail
    /// until a new dataset is bound
    poisoned: bool,
}

/// Access statistics
#[derive(Debug, Default, Clone)]
pub struct WindowStats {
    /// Point queries served from the current window
    pub hits: u64,
    /// Point queries that forced a window refresh
    pub misses: u64,
    /// Range reads issued to the source (bind + refresh + sort)
    pub fetches: u64,
    /// Total rows fetched from the source
    pub rows_fetched: u64,
}

impl WindowStats {
    /// Fraction of point queries served without touching the source
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Windowed random-access cache over a row/column-indexed dataset.
///
/// Single-threaded and synchronous: every operation takes `&mut self` and a
/// `value_at` may block on a range read when it refreshes the window.
/// Callers on a latency-sensitive path own any asynchronous wrapping.
pub struct WindowedTableCache<S: RowSource> {
    config: CacheConfig,
    bound: Option<Bound<S>>,
    stats: WindowStats,
}

impl<S: RowSource> Default for WindowedTableCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RowSource> WindowedTableCache<S> {
    /// Create an unbound cache with the default window size
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create an unbound cache with an explicit configuration
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config: CacheConfig {
                window_size: config.window_size.max(1),
            },
            bound: None,
            stats: WindowStats::default(),
        }
    }

    /// Bind a dataset, dropping all prior window content and sort state,
    /// and fetch the initial window `[0, min(window_size, total))`.
    ///
    /// An empty dataset binds successfully with an empty window.
    pub fn set_dataset(&mut self, mut source: S) -> Result<()> {
        self.bound = None;
        self.stats = WindowStats::default();

        let schema = source.schema().clone();
        let total_rows = source.row_count();

        let window = if total_rows == 0 {
            Window::empty()
        } else {
            let end = self.config.window_size.min(total_rows);
            let rows = source.read_rows(0, end)?;
            self.stats.fetches += 1;
            self.stats.rows_fetched += rows.len() as u64;
            Window { start: 0, rows }
        };

        debug!(
            total_rows,
            columns = schema.width(),
            window_len = window.rows.len(),
            "dataset bound"
        );
        self.bound = Some(Bound {
            source,
            schema,
            total_rows,
            window,
            materialized: false,
            poisoned: false,
        });
        Ok(())
    }

    /// Total rows in the bound dataset, 0 when unbound
    pub fn row_count(&self) -> usize {
        self.bound.as_ref().map_or(0, |b| b.total_rows)
    }

    /// Columns projected by the bound dataset's schema, 0 when unbound
    pub fn column_count(&self) -> usize {
        self.bound.as_ref().map_or(0, |b| b.schema.width())
    }

    /// Display label for a column: the field name for record datasets, the
    /// bare index otherwise. Advisory; never fails.
    pub fn column_label(&self, col: usize) -> String {
        match &self.bound {
            Some(b) => b.schema.label(col),
            None => col.to_string(),
        }
    }

    /// The row range currently materialized, if a dataset is bound
    pub fn window_span(&self) -> Option<Range<usize>> {
        self.bound
            .as_ref()
            .map(|b| b.window.start..b.window.start + b.window.rows.len())
    }

    /// Borrow the bound source (read-count instrumentation, mostly)
    pub fn source(&self) -> Option<&S> {
        self.bound.as_ref().map(|b| &b.source)
    }

    /// Access statistics since the last bind
    pub fn stats(&self) -> WindowStats {
        self.stats.clone()
    }

    /// Value at `(row, col)`, refreshing the window if `row` falls outside
    /// it. The refresh centers `row` in the new window where the dataset
    /// bounds allow.
    pub fn value_at(&mut self, row: usize, col: usize) -> Result<Value> {
        let window_size = self.config.window_size;
        let stats = &mut self.stats;
        let bound = self.bound.as_mut().ok_or(CacheError::Unbound)?;

        if bound.poisoned {
            return Err(stale_window());
        }
        if row >= bound.total_rows || col >= bound.schema.width() {
            return Err(CacheError::OutOfRange {
                row,
                col,
                rows: bound.total_rows,
                cols: bound.schema.width(),
            });
        }

        // A window already spanning the whole dataset never refreshes again.
        if bound.window.contains(row) || bound.window.rows.len() >= bound.total_rows {
            stats.hits += 1;
        } else {
            stats.misses += 1;
            let size = if bound.materialized {
                bound.total_rows
            } else {
                window_size
            };
            let max_start = bound.total_rows.saturating_sub(size);
            let start = row.saturating_sub(size / 2).min(max_start);

            let rows = match bound.source.read_rows(start, start + size) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(row, start, error = %e, "range read failed, window poisoned");
                    bound.window = Window::empty();
                    bound.poisoned = true;
                    return Err(e);
                }
            };
            stats.fetches += 1;
            stats.rows_fetched += rows.len() as u64;
            debug!(row, start, len = rows.len(), "window refreshed");

            // Build first, then swap: the old window stays valid up to here.
            bound.window = Window { start, rows };
        }

        // A short read leaves the row beyond the actual window; bounds are
        // governed by what the source delivered, not by the configured size.
        let fetched = row
            .checked_sub(bound.window.start)
            .and_then(|local| bound.window.rows.get(local))
            .ok_or(CacheError::OutOfRange {
                row,
                col,
                rows: bound.window.start + bound.window.rows.len(),
                cols: bound.schema.width(),
            })?;
        fetched.get(col).cloned().ok_or_else(|| {
            CacheError::InvalidData(format!(
                "row {} has {} values, schema width is {}",
                row,
                fetched.len(),
                bound.schema.width()
            ))
        })
    }

    /// `value_at` rendered as display text
    pub fn text_at(&mut self, row: usize, col: usize) -> Result<String> {
        Ok(self.value_at(row, col)?.to_string())
    }

    /// Sort the dataset by column `col`, escalating the cache to full
    /// materialization: the window grows to span every row and stays that
    /// way until a new dataset is bound. Sorting a windowed subset would be
    /// semantically wrong, since sort order must be global.
    ///
    /// The sort is stable ascending; descending output is the ascending
    /// order reversed. Cells compare by [`Value::total_cmp`], so NaN and
    /// Null cells take a fixed place instead of destabilizing the order.
    /// A no-op on an unbound or empty dataset.
    pub fn sort(&mut self, col: usize, ascending: bool) -> Result<()> {
        let stats = &mut self.stats;
        let bound = match self.bound.as_mut() {
            Some(b) => b,
            None => return Ok(()),
        };
        if bound.poisoned {
            return Err(stale_window());
        }
        if bound.total_rows == 0 {
            return Ok(());
        }
        if col >= bound.schema.width() {
            return Err(CacheError::OutOfRange {
                row: 0,
                col,
                rows: bound.total_rows,
                cols: bound.schema.width(),
            });
        }

        if bound.window.start != 0 || bound.window.rows.len() < bound.total_rows {
            let rows = match bound.source.read_rows(0, bound.total_rows) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(error = %e, "full materialization failed, window poisoned");
                    bound.window = Window::empty();
                    bound.poisoned = true;
                    return Err(e);
                }
            };
            stats.fetches += 1;
            stats.rows_fetched += rows.len() as u64;
            bound.window = Window { start: 0, rows };
        }
        bound.materialized = true;

        bound.window.rows.sort_by(|a, b| {
            a.get(col)
                .zip(b.get(col))
                .map(|(x, y)| x.total_cmp(y))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if !ascending {
            bound.window.rows.reverse();
        }
        debug!(
            col,
            ascending,
            rows = bound.window.rows.len(),
            "dataset materialized and sorted"
        );
        Ok(())
    }
}

fn stale_window() -> CacheError {
    CacheError::SourceUnavailable(
        "window invalidated by a failed read; bind a new dataset to recover".into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::storage::{FragmentReader, FragmentWriter};
    use crate::types::Row;
    use rand::Rng;

    fn scalar_rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| vec![Value::Integer(i as i64)]).collect()
    }

    fn scalar_source(n: usize) -> MemorySource {
        MemorySource::new(ColumnSchema::Scalar, scalar_rows(n)).unwrap()
    }

    fn cache_with_window(window_size: usize) -> WindowedTableCache<MemorySource> {
        WindowedTableCache::with_config(CacheConfig::with_window_size(window_size))
    }

    #[test]
    fn test_unbound_queries() {
        let mut cache: WindowedTableCache<MemorySource> = WindowedTableCache::new();
        assert_eq!(cache.row_count(), 0);
        assert_eq!(cache.column_count(), 0);
        assert_eq!(cache.column_label(3), "3");
        assert!(matches!(cache.value_at(0, 0), Err(CacheError::Unbound)));
        assert!(cache.sort(0, true).is_ok());
    }

    #[test]
    fn test_bind_fetches_initial_window() {
        // Testing preset: an 8-row window
        let mut cache = WindowedTableCache::with_config(CacheConfig::for_testing());
        cache.set_dataset(scalar_source(100)).unwrap();

        assert_eq!(cache.row_count(), 100);
        assert_eq!(cache.column_count(), 1);
        assert_eq!(cache.window_span(), Some(0..8));
        assert_eq!(cache.source().unwrap().reads(), 1);
    }

    #[test]
    fn test_empty_dataset() {
        let mut cache = cache_with_window(10);
        cache.set_dataset(scalar_source(0)).unwrap();

        assert_eq!(cache.row_count(), 0);
        assert_eq!(cache.window_span(), Some(0..0));
        // Binding an empty dataset issues no read at all
        assert_eq!(cache.source().unwrap().reads(), 0);
        assert!(matches!(
            cache.value_at(0, 0),
            Err(CacheError::OutOfRange { .. })
        ));
        assert!(cache.sort(0, true).is_ok());
    }

    #[test]
    fn test_in_window_access_never_reads() {
        let mut cache = cache_with_window(10);
        cache.set_dataset(scalar_source(100)).unwrap();

        for row in 0..10 {
            assert_eq!(cache.value_at(row, 0).unwrap(), Value::Integer(row as i64));
        }
        // Still only the bind-time read
        assert_eq!(cache.source().unwrap().reads(), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 10);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate(), 1.0);
    }

    #[test]
    fn test_refresh_centers_requested_row() {
        let mut cache = cache_with_window(100);
        cache.set_dataset(scalar_source(1000)).unwrap();

        assert_eq!(cache.value_at(500, 0).unwrap(), Value::Integer(500));
        // start = 500 - 100/2
        assert_eq!(cache.window_span(), Some(450..550));
        assert_eq!(cache.source().unwrap().reads(), 2);
    }

    #[test]
    fn test_refresh_clamped_at_start_and_end() {
        let mut cache = cache_with_window(100);
        cache.set_dataset(scalar_source(1000)).unwrap();

        // Near the end the window cannot extend past the dataset
        assert_eq!(cache.value_at(990, 0).unwrap(), Value::Integer(990));
        assert_eq!(cache.window_span(), Some(900..1000));

        // Near the start it cannot begin before row 0
        assert_eq!(cache.value_at(10, 0).unwrap(), Value::Integer(10));
        assert_eq!(cache.window_span(), Some(0..100));
    }

    #[test]
    fn test_small_dataset_fully_cached_never_refreshes() {
        let mut cache = cache_with_window(50);
        cache.set_dataset(scalar_source(20)).unwrap();
        assert_eq!(cache.window_span(), Some(0..20));

        for row in [19, 0, 13, 7] {
            assert_eq!(cache.value_at(row, 0).unwrap(), Value::Integer(row as i64));
        }
        assert_eq!(cache.source().unwrap().reads(), 1);
    }

    #[test]
    fn test_cache_transparency_random_access() {
        let total = 500;
        let mut cache = cache_with_window(32);
        cache.set_dataset(scalar_source(total)).unwrap();

        let mut rng = rand::thread_rng();
        for _ in 0..2000 {
            let row = rng.gen_range(0..total);
            assert_eq!(cache.value_at(row, 0).unwrap(), Value::Integer(row as i64));

            // Window invariants hold after every access
            let span = cache.window_span().unwrap();
            assert!(span.len() <= 32);
            assert!(span.end <= total);
        }
    }

    #[test]
    fn test_out_of_range_reports_not_panics() {
        let mut cache = cache_with_window(10);
        cache.set_dataset(scalar_source(5)).unwrap();

        assert!(matches!(
            cache.value_at(5, 0),
            Err(CacheError::OutOfRange { row: 5, .. })
        ));
        assert!(matches!(
            cache.value_at(0, 1),
            Err(CacheError::OutOfRange { col: 1, .. })
        ));
        // A failed query does not disturb the window
        assert_eq!(cache.window_span(), Some(0..5));
        assert_eq!(cache.value_at(4, 0).unwrap(), Value::Integer(4));
    }

    fn record_source() -> MemorySource {
        let schema = ColumnSchema::Named(vec!["id".into(), "name".into()]);
        MemorySource::new(
            schema,
            vec![
                vec![Value::Integer(3), Value::Text("c".into())],
                vec![Value::Integer(1), Value::Text("a".into())],
                vec![Value::Integer(2), Value::Text("b".into())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_named_projection_and_labels() {
        let mut cache = cache_with_window(10);
        cache.set_dataset(record_source()).unwrap();

        assert_eq!(cache.column_count(), 2);
        assert_eq!(cache.column_label(0), "id");
        assert_eq!(cache.column_label(1), "name");
        assert_eq!(cache.column_label(9), "9");
        assert_eq!(cache.value_at(1, 1).unwrap(), Value::Text("a".into()));
        assert_eq!(cache.text_at(0, 0).unwrap(), "3");
    }

    #[test]
    fn test_sort_ascending_then_descending() {
        let mut cache = cache_with_window(10);
        cache.set_dataset(record_source()).unwrap();

        cache.sort(0, true).unwrap();
        for (i, expect) in [1, 2, 3].iter().enumerate() {
            assert_eq!(cache.value_at(i, 0).unwrap(), Value::Integer(*expect));
        }
        // Projection follows the row: names travel with their ids
        assert_eq!(cache.value_at(0, 1).unwrap(), Value::Text("a".into()));

        cache.sort(0, false).unwrap();
        for (i, expect) in [3, 2, 1].iter().enumerate() {
            assert_eq!(cache.value_at(i, 0).unwrap(), Value::Integer(*expect));
        }
    }

    #[test]
    fn test_sort_materializes_whole_dataset() {
        let mut cache = cache_with_window(16);
        cache.set_dataset(scalar_source(200)).unwrap();

        cache.sort(0, false).unwrap();
        assert_eq!(cache.window_span(), Some(0..200));
        assert_eq!(cache.value_at(0, 0).unwrap(), Value::Integer(199));
        assert_eq!(cache.value_at(199, 0).unwrap(), Value::Integer(0));

        // Fully materialized: random access never reads again
        let reads = cache.source().unwrap().reads();
        for row in [150, 3, 77] {
            cache.value_at(row, 0).unwrap();
        }
        assert_eq!(cache.source().unwrap().reads(), reads);
    }

    #[test]
    fn test_sort_with_nan_and_null_cells() {
        // Interleave finite, NaN and Null cells; the sort must stay a
        // total order and place them deterministically.
        let rows = (0..500)
            .map(|i| {
                let score = match i % 4 {
                    0 => Value::Float(f64::NAN),
                    1 => Value::Null,
                    _ => Value::Float((250 - i) as f64),
                };
                vec![Value::Integer(i as i64), score]
            })
            .collect();
        let schema = ColumnSchema::Named(vec!["id".into(), "score".into()]);
        let mut cache = cache_with_window(32);
        cache
            .set_dataset(MemorySource::new(schema, rows).unwrap())
            .unwrap();

        cache.sort(1, true).unwrap();

        // Finite scores ascend, then the NaN block, then the Null block
        let mut seen_nan = false;
        let mut seen_null = false;
        let mut last = f64::NEG_INFINITY;
        for row in 0..500 {
            match cache.value_at(row, 1).unwrap() {
                Value::Float(v) if v.is_nan() => {
                    assert!(!seen_null);
                    seen_nan = true;
                }
                Value::Float(v) => {
                    assert!(!seen_nan && !seen_null);
                    assert!(v >= last);
                    last = v;
                }
                Value::Null => seen_null = true,
                other => panic!("unexpected cell {:?}", other),
            }
        }
        assert!(seen_nan && seen_null);
    }

    #[test]
    fn test_sort_bad_column() {
        let mut cache = cache_with_window(10);
        cache.set_dataset(scalar_source(5)).unwrap();
        assert!(matches!(
            cache.sort(2, true),
            Err(CacheError::OutOfRange { col: 2, .. })
        ));
    }

    #[test]
    fn test_rebind_resets_materialization() {
        let mut cache = cache_with_window(10);
        cache.set_dataset(scalar_source(200)).unwrap();
        cache.sort(0, false).unwrap();
        assert_eq!(cache.window_span(), Some(0..200));

        let schema = ColumnSchema::Positional(2);
        let rows = (0..30)
            .map(|i| vec![Value::Integer(i), Value::Float(i as f64 / 2.0)])
            .collect();
        cache
            .set_dataset(MemorySource::new(schema, rows).unwrap())
            .unwrap();

        assert_eq!(cache.row_count(), 30);
        assert_eq!(cache.column_count(), 2);
        assert_eq!(cache.window_span(), Some(0..10));
        assert_eq!(cache.value_at(0, 0).unwrap(), Value::Integer(0));
        assert_eq!(cache.stats().fetches, 1);
    }

    /// Source that reports more rows than it can deliver
    struct ShortfallSource {
        inner: MemorySource,
        claimed: usize,
    }

    impl RowSource for ShortfallSource {
        fn row_count(&self) -> usize {
            self.claimed
        }
        fn schema(&self) -> &ColumnSchema {
            self.inner.schema()
        }
        fn read_rows(&mut self, start: usize, end: usize) -> Result<RowBlock> {
            self.inner.read_rows(start, end)
        }
    }

    #[test]
    fn test_short_read_bounds_by_window() {
        let source = ShortfallSource {
            inner: scalar_source(50),
            claimed: 100,
        };
        let mut cache = WindowedTableCache::with_config(CacheConfig::with_window_size(20));
        cache.set_dataset(source).unwrap();

        // Deliverable rows still work
        assert_eq!(cache.value_at(40, 0).unwrap(), Value::Integer(40));
        // Claimed but undeliverable rows fail against the actual window
        assert!(matches!(
            cache.value_at(90, 0),
            Err(CacheError::OutOfRange { .. })
        ));
        // The failed refresh landed an empty window past the real data
        assert!(cache.window_span().unwrap().is_empty());
    }

    /// Source whose reads start failing after a set number of calls
    struct FlakySource {
        inner: MemorySource,
        fail_after: u64,
    }

    impl RowSource for FlakySource {
        fn row_count(&self) -> usize {
            self.inner.row_count()
        }
        fn schema(&self) -> &ColumnSchema {
            self.inner.schema()
        }
        fn read_rows(&mut self, start: usize, end: usize) -> Result<RowBlock> {
            if self.inner.reads() >= self.fail_after {
                return Err(CacheError::SourceUnavailable("backing file gone".into()));
            }
            self.inner.read_rows(start, end)
        }
    }

    #[test]
    fn test_failed_read_poisons_window() {
        let source = FlakySource {
            inner: scalar_source(100),
            fail_after: 1,
        };
        let mut cache = WindowedTableCache::with_config(CacheConfig::with_window_size(10));
        cache.set_dataset(source).unwrap();
        assert_eq!(cache.value_at(5, 0).unwrap(), Value::Integer(5));

        // The refresh fails and the error propagates
        assert!(matches!(
            cache.value_at(50, 0),
            Err(CacheError::SourceUnavailable(_))
        ));

        // Previously-cached rows are never served stale
        assert!(matches!(
            cache.value_at(5, 0),
            Err(CacheError::SourceUnavailable(_))
        ));
        assert!(matches!(
            cache.sort(0, true),
            Err(CacheError::SourceUnavailable(_))
        ));

        // A fresh bind recovers
        let healthy = FlakySource {
            inner: scalar_source(100),
            fail_after: u64::MAX,
        };
        cache.set_dataset(healthy).unwrap();
        assert_eq!(cache.value_at(5, 0).unwrap(), Value::Integer(5));
    }

    #[test]
    fn test_fragment_backed_browse() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("browse.grid");
        let schema = ColumnSchema::Named(vec!["t".into(), "v".into()]);
        let mut writer = FragmentWriter::create(&path, schema, 64).unwrap();
        for i in 0..1000i64 {
            writer
                .append_row(vec![Value::Integer(i), Value::Float(-(i as f64))])
                .unwrap();
        }
        writer.finish().unwrap();

        let reader = FragmentReader::open(&path).unwrap();
        let mut cache = WindowedTableCache::with_config(CacheConfig::with_window_size(100));
        cache.set_dataset(reader).unwrap();

        assert_eq!(cache.row_count(), 1000);
        assert_eq!(cache.column_label(1), "v");

        // Scroll forward across several window boundaries
        for row in (0..1000).step_by(7) {
            assert_eq!(cache.value_at(row, 0).unwrap(), Value::Integer(row as i64));
        }

        // Global sort by the descending column flips the order
        cache.sort(1, true).unwrap();
        assert_eq!(cache.value_at(0, 0).unwrap(), Value::Integer(999));
        assert_eq!(cache.value_at(999, 0).unwrap(), Value::Integer(0));
    }
}
