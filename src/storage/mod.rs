//! On-disk backing stores

pub mod fragment;

pub use fragment::{FragmentReader, FragmentWriter};
