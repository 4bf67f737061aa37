//! Core data model for the aggregate fuzzing harness.
//!
//! - [`DataType`]: immutable descriptor of one argument or result column.
//! - [`Value`]: a single (possibly null) cell.
//! - [`Column`]: a flat sequence of values or a constant broadcast over a
//!   fixed number of rows.
//! - [`RowBatch`]: named columns of uniform length; one batch is one
//!   function call's row set.
//! - [`ColumnPool`]: trial-scoped pool every generated column is created
//!   through.

pub mod batch;
pub mod data_type;
pub mod pool;
pub mod value;

pub use batch::{Column, RowBatch};
pub use data_type::DataType;
pub use pool::ColumnPool;
pub use value::Value;
