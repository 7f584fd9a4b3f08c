//! Cache configuration
//!
//! The window size is the amortization unit: one range read amortized over
//! up to `window_size` point queries.

use serde::{Deserialize, Serialize};

/// Default number of rows fetched per refresh.
///
/// Large enough that scroll-dominated browsing rarely crosses a window
/// boundary, small enough that peak memory stays bounded for wide rows.
pub const DEFAULT_WINDOW_SIZE: usize = 4000;

/// Windowed cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Rows fetched per refresh, fixed at construction
    pub window_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with an explicit window size.
    ///
    /// A zero size is bumped to one row so a bound cache can always hold the
    /// requested row.
    pub fn with_window_size(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
        }
    }

    /// Small window for tests, so boundary behavior is cheap to exercise
    pub fn for_testing() -> Self {
        Self { window_size: 8 }
    }
}
