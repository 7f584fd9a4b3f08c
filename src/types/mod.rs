//! Scalar values, rows and column schemas

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Unified scalar type for dataset cells
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// Integer value
    Integer(i64),

    /// Floating point value
    Float(f64),

    /// Boolean value
    Bool(bool),

    /// Text string
    Text(String),

    /// Null value
    Null,
}

impl Value {
    /// Deterministic total order used for sorting.
    ///
    /// Numerics compare by value; floats use [`f64::total_cmp`], which gives
    /// NaN a fixed place instead of breaking the order. Null ranks after
    /// every other kind, and remaining mixed kinds rank numeric < Bool <
    /// Text so the comparison stays antisymmetric where `partial_cmp` gives
    /// up.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Integer(_) | Value::Float(_) => 0,
            Value::Bool(_) => 1,
            Value::Text(_) => 2,
            Value::Null => 3,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Null => write!(f, "null"),
        }
    }
}

/// A row contains one value per column
pub type Row = Vec<Value>;

/// A contiguous block of rows, the unit returned by one range read
pub type RowBlock = Vec<Row>;

/// Column shape of a dataset, resolved once when a dataset is bound.
///
/// Record-typed datasets carry field names; vector datasets expose unnamed
/// positional columns; scalar datasets project as a single column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ColumnSchema {
    /// Named record fields, insertion order = column order
    Named(Vec<String>),
    /// Unnamed fixed-width vector rows
    Positional(usize),
    /// Scalar rows, a single column
    Scalar,
}

impl ColumnSchema {
    /// Number of columns this schema projects
    pub fn width(&self) -> usize {
        match self {
            ColumnSchema::Named(fields) => fields.len(),
            ColumnSchema::Positional(width) => *width,
            ColumnSchema::Scalar => 1,
        }
    }

    /// Display label for a column.
    ///
    /// Falls back to the bare column index when the dataset has no field
    /// names or the index is out of range; labeling is advisory and never
    /// fails.
    pub fn label(&self, col: usize) -> String {
        match self {
            ColumnSchema::Named(fields) if col < fields.len() => fields[col].clone(),
            _ => col.to_string(),
        }
    }
}
