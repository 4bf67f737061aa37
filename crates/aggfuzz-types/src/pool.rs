use std::cell::Cell;

use crate::{Column, DataType, Value};

/// Trial-scoped pool that every synthesized or generated column is created
/// through.
///
/// The pool only accounts for what it hands out; columns are ordinary owned
/// values once created. The orchestrator creates one pool per trial and reads
/// the counters when it logs the trial summary.
#[derive(Debug, Default)]
pub struct ColumnPool {
    name: String,
    columns: Cell<u64>,
    values: Cell<u64>,
}

impl ColumnPool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Cell::new(0),
            values: Cell::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a flat column from materialized values.
    pub fn flat(&self, data_type: DataType, values: Vec<Value>) -> Column {
        self.record(values.len() as u64);
        Column::flat(data_type, values)
    }

    /// Create a flat column of `len` rows from a per-row closure.
    pub fn flat_from_fn(
        &self,
        data_type: DataType,
        len: usize,
        mut make: impl FnMut(usize) -> Value,
    ) -> Column {
        let values = (0..len).map(&mut make).collect();
        self.flat(data_type, values)
    }

    /// Create a constant column broadcasting `value` over `len` rows. Only
    /// the single value is accounted.
    pub fn constant(&self, data_type: DataType, value: Value, len: usize) -> Column {
        self.record(1);
        Column::constant(data_type, value, len)
    }

    pub fn allocated_columns(&self) -> u64 {
        self.columns.get()
    }

    pub fn allocated_values(&self) -> u64 {
        self.values.get()
    }

    fn record(&self, values: u64) {
        self.columns.set(self.columns.get().saturating_add(1));
        self.values.set(self.values.get().saturating_add(values));
    }
}
