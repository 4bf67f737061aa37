//! Reference query engine backed by C SQLite (via rusqlite).
//!
//! Every [`Plan::Values`] node is loaded into a fresh temp table, the plan is
//! compiled into one SELECT statement, and the temp tables are dropped after
//! the statement runs.
//!
//! # Value mapping
//!
//! - BOOLEAN, integral types and TIMESTAMP bind as INTEGER
//! - REAL / DOUBLE bind as REAL
//! - ARRAY / MAP bind as JSON text (see [`Value::to_json`])
//!
//! Results come back as BIGINT, DOUBLE or VARCHAR by storage class; an
//! all-null column is typed UNKNOWN.
//!
//! # Canonicalization functions
//!
//! - `canonicalize(arr)`: sorts the elements of a JSON array
//! - `map_keys(m)`: array of the keys of a JSON-encoded map
//! - `canonicalize_values(m)`: sorts each array value of a map, then the
//!   entries themselves

use std::cell::Cell;

use aggfuzz_error::{AggFuzzError, Result};
use aggfuzz_types::{Column, DataType, RowBatch, Value};
use rusqlite::Connection;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::engine::{Plan, QueryEngine};

const NO_SUCH_COLUMN_PREFIX: &str = "no such column: ";

/// SQLite stores a bound NaN as NULL. NaN cells travel as this text instead
/// so they group apart from NULL and read back as [`Value::Double`].
const NAN_TEXT: &str = "\u{1}NaN";

/// In-memory SQLite implementation of [`QueryEngine`].
pub struct SqliteEngine {
    conn: Connection,
    next_table: Cell<u64>,
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("next_table", &self.next_table.get())
            .finish_non_exhaustive()
    }
}

impl SqliteEngine {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(engine_error)?;
        register_canonicalization_functions(&conn)?;
        Ok(Self {
            conn,
            next_table: Cell::new(0),
        })
    }

    /// SQLite library version, for run metadata.
    pub fn version() -> &'static str {
        rusqlite::version()
    }

    fn compile(&self, plan: &Plan, tables: &mut Vec<String>) -> Result<String> {
        match plan {
            Plan::Values(batches) => {
                let name = self.allocate_table_name();
                tables.push(name.clone());
                self.load_values(&name, batches)?;
                Ok(format!("SELECT * FROM temp.{}", quote_ident(&name)))
            }
            Plan::Project { input, projections } => {
                if projections.is_empty() {
                    return Err(AggFuzzError::engine("projection list is empty"));
                }
                let inner = self.compile(input, tables)?;
                Ok(format!("SELECT {} FROM ({inner})", projections.join(", ")))
            }
            Plan::Aggregate {
                input,
                grouping_keys,
                aggregates,
            } => {
                let inner = self.compile(input, tables)?;
                let select_list: Vec<&str> = grouping_keys
                    .iter()
                    .chain(aggregates)
                    .map(String::as_str)
                    .collect();
                if select_list.is_empty() {
                    return Err(AggFuzzError::engine("aggregation without keys or aggregates"));
                }
                let mut sql = format!("SELECT {} FROM ({inner})", select_list.join(", "));
                if !grouping_keys.is_empty() {
                    sql.push_str(" GROUP BY ");
                    sql.push_str(&grouping_keys.join(", "));
                }
                Ok(sql)
            }
            Plan::UnionAll(inputs) => {
                if inputs.is_empty() {
                    return Err(AggFuzzError::engine("union without inputs"));
                }
                let parts = inputs
                    .iter()
                    .map(|input| {
                        self.compile(input, tables)
                            .map(|sql| format!("SELECT * FROM ({sql})"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join(" UNION ALL "))
            }
        }
    }

    fn allocate_table_name(&self) -> String {
        let id = self.next_table.get();
        self.next_table.set(id + 1);
        format!("values_{id}")
    }

    fn load_values(&self, table: &str, batches: &[RowBatch]) -> Result<()> {
        let first = batches.first().ok_or(AggFuzzError::EmptySchema)?;
        if first.num_columns() == 0 {
            return Err(AggFuzzError::EmptySchema);
        }
        let names = first.names();
        if let Some(other) = batches.iter().find(|b| b.names() != names) {
            return Err(AggFuzzError::shape(format!(
                "values batches disagree on schema: [{}] vs [{}]",
                names.join(", "),
                other.names().join(", ")
            )));
        }

        let columns: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
        let table = quote_ident(table);
        self.conn
            .execute_batch(&format!(
                "CREATE TEMP TABLE {table} ({})",
                columns.join(", ")
            ))
            .map_err(engine_error)?;

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let insert = format!(
            "INSERT INTO temp.{table} VALUES ({})",
            placeholders.join(", ")
        );
        let tx = self.conn.unchecked_transaction().map_err(engine_error)?;
        {
            let mut stmt = tx.prepare(&insert).map_err(engine_error)?;
            for batch in batches {
                for row in batch.rows() {
                    stmt.execute(rusqlite::params_from_iter(row.iter().map(to_sql_value)))
                        .map_err(engine_error)?;
                }
            }
        }
        tx.commit().map_err(engine_error)?;
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<RowBatch> {
        let mut stmt = self.conn.prepare(sql).map_err(engine_error)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
        let mut cells: Vec<Vec<Value>> = vec![Vec::new(); names.len()];

        let mut rows = stmt.query([]).map_err(engine_error)?;
        while let Some(row) = rows.next().map_err(engine_error)? {
            for (index, column) in cells.iter_mut().enumerate() {
                let cell = row.get_ref(index).map_err(engine_error)?;
                column.push(from_value_ref(cell));
            }
        }

        let columns = cells
            .into_iter()
            .map(|values| Column::flat(infer_type(&values), values))
            .collect();
        RowBatch::new(names, columns)
    }

    fn drop_tables(&self, tables: &[String]) {
        for table in tables {
            let sql = format!("DROP TABLE IF EXISTS temp.{}", quote_ident(table));
            if let Err(err) = self.conn.execute_batch(&sql) {
                warn!(table = %table, error = %err, "failed to drop temp table");
            }
        }
    }
}

impl QueryEngine for SqliteEngine {
    fn execute(&self, plan: &Plan) -> Result<RowBatch> {
        let mut tables = Vec::new();
        let outcome = self.compile(plan, &mut tables).and_then(|sql| {
            debug!(sql = %sql, "executing plan on reference engine");
            self.query(&sql)
        });
        self.drop_tables(&tables);
        outcome
    }
}

fn engine_error(err: rusqlite::Error) -> AggFuzzError {
    let message = err.to_string();
    if let Some(name) = message.strip_prefix(NO_SUCH_COLUMN_PREFIX) {
        return AggFuzzError::NoSuchColumn {
            name: name.to_owned(),
        };
    }
    AggFuzzError::engine(message)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(v) | Value::Timestamp(v) => SqlValue::Integer(*v),
        Value::Double(v) if v.is_nan() => SqlValue::Text(NAN_TEXT.to_owned()),
        Value::Double(v) => SqlValue::Real(*v),
        Value::Varchar(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Map(_) => SqlValue::Text(value.to_json().to_string()),
    }
}

fn from_value_ref(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Double(v),
        ValueRef::Text(bytes) if bytes == NAN_TEXT.as_bytes() => Value::Double(f64::NAN),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Varchar(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn infer_type(values: &[Value]) -> DataType {
    match values.iter().find(|v| !v.is_null()) {
        Some(Value::Integer(_)) => DataType::Bigint,
        Some(Value::Double(_)) => DataType::Double,
        Some(_) => DataType::Varchar,
        None => DataType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Canonicalization functions
// ---------------------------------------------------------------------------

fn register_canonicalization_functions(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    conn.create_scalar_function("canonicalize", 1, flags, |ctx| {
        json_transform(ctx, canonicalize_json)
    })
    .map_err(engine_error)?;
    conn.create_scalar_function("map_keys", 1, flags, |ctx| {
        json_transform(ctx, map_keys_json)
    })
    .map_err(engine_error)?;
    conn.create_scalar_function("canonicalize_values", 1, flags, |ctx| {
        json_transform(ctx, canonicalize_values_json)
    })
    .map_err(engine_error)?;
    Ok(())
}

fn json_transform(ctx: &Context<'_>, transform: fn(Json) -> Json) -> rusqlite::Result<Option<String>> {
    let text = match ctx.get_raw(0) {
        ValueRef::Null => return Ok(None),
        ValueRef::Text(text) => text,
        other => {
            return Err(rusqlite::Error::UserFunctionError(
                format!("expected JSON text, got {}", other.data_type()).into(),
            ));
        }
    };
    let parsed: Json = serde_json::from_slice(text)
        .map_err(|err| rusqlite::Error::UserFunctionError(Box::new(err)))?;
    Ok(Some(transform(parsed).to_string()))
}

/// Sorts array elements by their JSON text. Non-arrays pass through.
fn canonicalize_json(value: Json) -> Json {
    match value {
        Json::Array(mut items) => {
            items.sort_by_cached_key(ToString::to_string);
            Json::Array(items)
        }
        other => other,
    }
}

fn map_keys_json(value: Json) -> Json {
    match value {
        Json::Array(entries) => Json::Array(
            entries
                .into_iter()
                .map(|entry| match entry {
                    Json::Array(mut pair) if pair.len() == 2 => pair.swap_remove(0),
                    _ => Json::Null,
                })
                .collect(),
        ),
        other => other,
    }
}

fn canonicalize_values_json(value: Json) -> Json {
    match value {
        Json::Array(entries) => {
            let entries = entries
                .into_iter()
                .map(|entry| match entry {
                    Json::Array(mut pair) if pair.len() == 2 => {
                        let v = pair.pop().map_or(Json::Null, canonicalize_json);
                        pair.push(v);
                        Json::Array(pair)
                    }
                    other => other,
                })
                .collect();
            canonicalize_json(Json::Array(entries))
        }
        other => other,
    }
}
