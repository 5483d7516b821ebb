//! Row representation.
//!
//! A [`Row`] is a positional list of values. Rows stored in a table carry
//! a [`RowId`] assigned once at first insertion; rows computed by a query
//! (projections, joins, groups) have none.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Identity of a stored row, unique within its table's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A single row of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row {
    id: Option<RowId>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a computed row without identity.
    pub fn new(values: Vec<Value>) -> Self {
        Self { id: None, values }
    }

    /// Creates a stored row.
    pub fn stored(id: RowId, values: Vec<Value>) -> Self {
        Self {
            id: Some(id),
            values,
        }
    }

    /// Creates an empty row.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Creates a row with all NULL values.
    pub fn nulls(num_columns: usize) -> Self {
        Self::new(vec![Value::Null; num_columns])
    }

    /// Returns the row identity, if stored.
    pub fn id(&self) -> Option<RowId> {
        self.id
    }

    /// Returns the number of columns in this row.
    pub fn num_columns(&self) -> usize {
        self.values.len()
    }

    /// Returns the value at the given index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the values as a slice.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row and returns the values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Concatenates two rows into a computed row.
    pub fn concat(left: &[Value], right: &[Value]) -> Row {
        let mut values = Vec::with_capacity(left.len() + right.len());
        values.extend_from_slice(left);
        values.extend_from_slice(right);
        Row::new(values)
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

/// A materialized result row: output column name to value, in select-list
/// order. Always an owned copy of stored data.
pub type ResultRow = IndexMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_basics() {
        let row = Row::stored(RowId(7), vec![Value::Int(1), Value::Null]);
        assert_eq!(row.id(), Some(RowId(7)));
        assert_eq!(row.num_columns(), 2);
        assert_eq!(row.get(0), Some(&Value::Int(1)));
        assert_eq!(row.to_string(), "(1, NULL)");
        assert_eq!(RowId(7).to_string(), "r7");
    }

    #[test]
    fn test_concat_drops_identity() {
        let joined = Row::concat(&[Value::Int(1)], &[Value::from("a")]);
        assert_eq!(joined.id(), None);
        assert_eq!(joined.values(), &[Value::Int(1), Value::from("a")]);
        assert_eq!(Row::nulls(3).values().len(), 3);
    }
}
