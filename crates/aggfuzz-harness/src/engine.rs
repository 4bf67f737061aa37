//! Query engine interface used by verifiers.
//!
//! Verifiers never evaluate SQL themselves. They describe a small logical
//! plan (values, projection, single-step aggregation, union) and hand it to a
//! [`QueryEngine`]. [`SqliteEngine`](crate::oracle::SqliteEngine) is the
//! reference implementation.

use std::cmp::Ordering;

use aggfuzz_error::Result;
use aggfuzz_types::{RowBatch, Value};
use tracing::error;

/// Logical plan node.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// In-memory batches; all must share one schema.
    Values(Vec<RowBatch>),
    /// SQL projection expressions evaluated per row.
    Project {
        input: Box<Self>,
        projections: Vec<String>,
    },
    /// Single-step aggregation. Output columns are the grouping keys followed
    /// by the aggregates. Null keys form one group.
    Aggregate {
        input: Box<Self>,
        grouping_keys: Vec<String>,
        aggregates: Vec<String>,
    },
    /// Concatenation of inputs with identical output columns.
    UnionAll(Vec<Self>),
}

/// Fluent builder for [`Plan`].
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    plan: Plan,
}

impl PlanBuilder {
    pub fn values(batches: Vec<RowBatch>) -> Self {
        Self {
            plan: Plan::Values(batches),
        }
    }

    pub fn union_all(inputs: Vec<Plan>) -> Self {
        Self {
            plan: Plan::UnionAll(inputs),
        }
    }

    pub fn project<S: AsRef<str>>(self, projections: &[S]) -> Self {
        Self {
            plan: Plan::Project {
                input: Box::new(self.plan),
                projections: to_owned_strings(projections),
            },
        }
    }

    pub fn single_aggregation<K: AsRef<str>, A: AsRef<str>>(
        self,
        grouping_keys: &[K],
        aggregates: &[A],
    ) -> Self {
        Self {
            plan: Plan::Aggregate {
                input: Box::new(self.plan),
                grouping_keys: to_owned_strings(grouping_keys),
                aggregates: to_owned_strings(aggregates),
            },
        }
    }

    pub fn build(self) -> Plan {
        self.plan
    }
}

fn to_owned_strings<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items.iter().map(|s| s.as_ref().to_owned()).collect()
}

/// Executes logical plans.
pub trait QueryEngine {
    fn execute(&self, plan: &Plan) -> Result<RowBatch>;
}

impl<T: QueryEngine + ?Sized> QueryEngine for &T {
    fn execute(&self, plan: &Plan) -> Result<RowBatch> {
        (**self).execute(plan)
    }
}

/// Order-insensitive equivalence of two result batches.
///
/// Rows are compared as multisets after sorting both sides with
/// [`Value::total_cmp`]. Cells match under [`Value::equivalent`]. Column names
/// are not compared, only arity. The first differing row is logged.
pub fn results_equivalent(expected: &RowBatch, actual: &RowBatch) -> bool {
    if expected.num_columns() != actual.num_columns() {
        error!(
            expected = expected.num_columns(),
            actual = actual.num_columns(),
            "result column counts differ"
        );
        return false;
    }
    if expected.num_rows() != actual.num_rows() {
        error!(
            expected = expected.num_rows(),
            actual = actual.num_rows(),
            "result row counts differ"
        );
        return false;
    }

    let expected_rows = sorted_rows(expected);
    let actual_rows = sorted_rows(actual);
    for (index, (e, a)) in expected_rows.iter().zip(&actual_rows).enumerate() {
        let same = e.len() == a.len() && e.iter().zip(a).all(|(x, y)| x.equivalent(y));
        if !same {
            error!(
                sorted_row = index,
                expected = %render_row(e),
                actual = %render_row(a),
                "result rows differ"
            );
            return false;
        }
    }
    true
}

fn sorted_rows(batch: &RowBatch) -> Vec<Vec<Value>> {
    let mut rows: Vec<Vec<Value>> = batch.rows().collect();
    rows.sort_by(|a, b| cmp_rows(a, b));
    rows
}

fn cmp_rows(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.total_cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn render_row(row: &[Value]) -> String {
    row.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use aggfuzz_types::{Column, DataType};

    use super::*;

    fn batch(rows: &[(i64, &str)]) -> RowBatch {
        RowBatch::with_positional_names(vec![
            Column::flat(
                DataType::Bigint,
                rows.iter().map(|(k, _)| Value::Integer(*k)).collect(),
            ),
            Column::flat(
                DataType::Varchar,
                rows.iter().map(|(_, v)| Value::from(*v)).collect(),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn equivalence_ignores_row_order() {
        let a = batch(&[(1, "x"), (2, "y"), (2, "y")]);
        let b = batch(&[(2, "y"), (1, "x"), (2, "y")]);
        assert!(results_equivalent(&a, &b));
    }

    #[test]
    fn equivalence_respects_multiplicity() {
        let a = batch(&[(1, "x"), (2, "y"), (2, "y")]);
        let b = batch(&[(1, "x"), (1, "x"), (2, "y")]);
        assert!(!results_equivalent(&a, &b));
    }

    #[test]
    fn equivalence_ignores_order_of_mixed_numbers() {
        let two_53 = 1_i64 << 53;
        let column = |values: Vec<Value>| {
            RowBatch::with_positional_names(vec![Column::flat(DataType::Double, values)]).unwrap()
        };
        let a = column(vec![
            Value::Integer(two_53 + 1),
            Value::Double(two_53 as f64),
            Value::Integer(two_53),
        ]);
        let b = column(vec![
            Value::Integer(two_53),
            Value::Double(two_53 as f64),
            Value::Integer(two_53 + 1),
        ]);
        assert!(results_equivalent(&a, &b));
    }

    #[test]
    fn equivalence_checks_shape() {
        let a = batch(&[(1, "x")]);
        let b = batch(&[(1, "x"), (2, "y")]);
        assert!(!results_equivalent(&a, &b));
        let narrow = RowBatch::with_positional_names(vec![Column::flat(
            DataType::Bigint,
            vec![Value::Integer(1)],
        )])
        .unwrap();
        assert!(!results_equivalent(&a, &narrow));
    }

    #[test]
    fn builder_nests_plans() {
        let plan = PlanBuilder::values(vec![batch(&[(1, "x")])])
            .project(&["c0", "c1"])
            .single_aggregation(&["c0"], &["count(c1) AS n"])
            .build();
        let Plan::Aggregate {
            input,
            grouping_keys,
            aggregates,
        } = plan
        else {
            panic!("expected aggregate at the root");
        };
        assert_eq!(grouping_keys, vec!["c0".to_owned()]);
        assert_eq!(aggregates, vec!["count(c1) AS n".to_owned()]);
        assert!(matches!(*input, Plan::Project { .. }));
    }
}
