//! Columns and row batches.

use std::fmt::Write as _;

use aggfuzz_error::{AggFuzzError, Result};
use serde::{Deserialize, Serialize};

use crate::{DataType, Value};

/// One column of a batch.
///
/// A `Constant` column broadcasts a single value over `len` rows without
/// materializing it; generators use it for per-trial tuning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Flat {
        data_type: DataType,
        values: Vec<Value>,
    },
    Constant {
        data_type: DataType,
        value: Value,
        len: usize,
    },
}

impl Column {
    pub fn flat(data_type: DataType, values: Vec<Value>) -> Self {
        Self::Flat { data_type, values }
    }

    pub fn constant(data_type: DataType, value: Value, len: usize) -> Self {
        Self::Constant {
            data_type,
            value,
            len,
        }
    }

    pub fn data_type(&self) -> &DataType {
        match self {
            Self::Flat { data_type, .. } | Self::Constant { data_type, .. } => data_type,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Flat { values, .. } => values.len(),
            Self::Constant { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn is_constant(&self) -> bool {
        matches!(self, Self::Constant { .. })
    }

    /// The broadcast value of a constant column.
    pub const fn constant_value(&self) -> Option<&Value> {
        match self {
            Self::Constant { value, .. } => Some(value),
            Self::Flat { .. } => None,
        }
    }

    /// Value at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn value_at(&self, row: usize) -> &Value {
        match self {
            Self::Flat { values, .. } => &values[row],
            Self::Constant { value, len, .. } => {
                assert!(row < *len, "row {row} out of bounds for constant column of {len} rows");
                value
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> + '_ {
        (0..self.len()).map(move |row| self.value_at(row))
    }
}

/// A fixed set of named columns of uniform length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
    names: Vec<String>,
    columns: Vec<Column>,
    num_rows: usize,
}

impl RowBatch {
    /// Build a batch, validating that every column has the same length and
    /// that names and columns line up.
    pub fn new(names: Vec<String>, columns: Vec<Column>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(AggFuzzError::shape(format!(
                "{} names for {} columns",
                names.len(),
                columns.len()
            )));
        }
        let num_rows = columns.first().map_or(0, Column::len);
        for (name, column) in names.iter().zip(&columns) {
            if column.len() != num_rows {
                return Err(AggFuzzError::shape(format!(
                    "column {name} has {} rows, expected {num_rows}",
                    column.len()
                )));
            }
        }
        Ok(Self {
            names,
            columns,
            num_rows,
        })
    }

    /// Build a batch with the conventional positional names `c0, c1, ...`.
    pub fn with_positional_names(columns: Vec<Column>) -> Result<Self> {
        let names = (0..columns.len()).map(|i| format!("c{i}")).collect();
        Self::new(names, columns)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn child_at(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.column_index(name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| AggFuzzError::NoSuchColumn {
                name: name.to_owned(),
            })
    }

    /// Materialize one row.
    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| c.value_at(index).clone())
            .collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.num_rows).map(|i| self.row(i))
    }

    /// Render the first `columns` cells of a row as `name=value, ...` for
    /// diagnostics.
    pub fn describe_row_prefix(&self, index: usize, columns: usize) -> String {
        let mut out = String::new();
        let cells = self.names.iter().zip(&self.columns).take(columns);
        for (i, (name, column)) in cells.enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{name}={}", column.value_at(index));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Column {
        Column::flat(
            DataType::Bigint,
            values.iter().copied().map(Value::Integer).collect(),
        )
    }

    #[test]
    fn constant_column_broadcasts() {
        let col = Column::constant(DataType::Double, Value::Double(0.5), 4);
        assert_eq!(col.len(), 4);
        assert!(col.is_constant());
        assert_eq!(col.value_at(3), &Value::Double(0.5));
        assert_eq!(col.iter().count(), 4);
        assert_eq!(col.constant_value(), Some(&Value::Double(0.5)));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn constant_column_bounds_checked() {
        let col = Column::constant(DataType::Bigint, Value::Integer(1), 2);
        let _ = col.value_at(2);
    }

    #[test]
    fn batch_rejects_ragged_columns() {
        let err = RowBatch::with_positional_names(vec![
            ints(&[1, 2, 3]),
            Column::constant(DataType::Bigint, Value::Integer(7), 2),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("column c1 has 2 rows, expected 3"));
    }

    #[test]
    fn batch_rejects_name_count_mismatch() {
        let err = RowBatch::new(vec!["a".to_owned()], vec![]).unwrap_err();
        assert!(matches!(err, AggFuzzError::ShapeMismatch { .. }));
    }

    #[test]
    fn batch_lookup_and_rows() {
        let batch = RowBatch::new(
            vec!["g0".to_owned(), "a0".to_owned()],
            vec![
                ints(&[1, 2]),
                Column::constant(DataType::Bigint, Value::Integer(9), 2),
            ],
        )
        .unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.column_index("a0"), Some(1));
        assert!(batch.column("missing").is_err());
        assert_eq!(batch.row(1), vec![Value::Integer(2), Value::Integer(9)]);
        assert_eq!(batch.describe_row_prefix(0, 2), "g0=1, a0=9");
        assert_eq!(batch.describe_row_prefix(1, 1), "g0=2");
        assert_eq!(batch.describe_row_prefix(1, 0), "");
    }
}
