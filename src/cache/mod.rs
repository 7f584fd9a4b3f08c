//! Windowed cache over a row-addressable dataset

pub mod window;

pub use window::{WindowStats, WindowedTableCache};
