//! Custom result verifiers for aggregates that cannot be checked by plain
//! equality against the reference engine.
//!
//! A verifier supports one of two modes:
//!
//! - **compare**: two independently computed results of the same function
//!   are equivalent, possibly after a SQL transform (e.g. sorting an array).
//! - **verify**: a single result is validated against ground truth the
//!   verifier computes itself.
//!
//! `initialize` captures per-trial context and `reset` clears it. Calling the
//! unsupported mode, or using a verifier before `initialize`, is a harness
//! bug and panics. Engine failures are `Err`; verdicts are `Ok(bool)`.

use aggfuzz_error::Result;
use aggfuzz_types::RowBatch;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::aggregate::AggregateCall;
use crate::engine::{PlanBuilder, QueryEngine, results_equivalent};

/// Closed set of verifier strategies.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultVerifier {
    Transform(TransformResultVerifier),
    ApproxDistinct(ApproxDistinctResultVerifier),
}

impl ResultVerifier {
    /// Transform-and-compare verifier; see [`TransformResultVerifier::new`].
    pub fn transform(template: impl Into<String>) -> Self {
        Self::Transform(TransformResultVerifier::new(template))
    }

    pub fn approx_distinct() -> Self {
        Self::ApproxDistinct(ApproxDistinctResultVerifier::default())
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transform(_) => "transform",
            Self::ApproxDistinct(_) => "approx_distinct",
        }
    }

    pub const fn supports_compare(&self) -> bool {
        matches!(self, Self::Transform(_))
    }

    pub const fn supports_verify(&self) -> bool {
        matches!(self, Self::ApproxDistinct(_))
    }

    /// Capture trial context. `input` is the full input of the trial,
    /// `result_name` the column holding the aggregate result.
    pub fn initialize<E: QueryEngine + ?Sized>(
        &mut self,
        engine: &E,
        input: &[RowBatch],
        grouping_keys: &[String],
        call: &AggregateCall,
        result_name: &str,
    ) -> Result<()> {
        match self {
            Self::Transform(verifier) => {
                verifier.initialize(grouping_keys, result_name);
                Ok(())
            }
            Self::ApproxDistinct(verifier) => {
                verifier.initialize(engine, input, grouping_keys, call, result_name)
            }
        }
    }

    pub fn compare<E: QueryEngine + ?Sized>(
        &self,
        engine: &E,
        result: &RowBatch,
        alt_result: &RowBatch,
    ) -> Result<bool> {
        match self {
            Self::Transform(verifier) => verifier.compare(engine, result, alt_result),
            Self::ApproxDistinct(_) => {
                panic!("compare is not supported by the approx_distinct verifier")
            }
        }
    }

    pub fn verify<E: QueryEngine + ?Sized>(&self, engine: &E, result: &RowBatch) -> Result<bool> {
        match self {
            Self::Transform(_) => panic!("verify is not supported by the transform verifier"),
            Self::ApproxDistinct(verifier) => verifier.verify(engine, result),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Transform(verifier) => verifier.reset(),
            Self::ApproxDistinct(verifier) => verifier.reset(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transform and compare
// ---------------------------------------------------------------------------

/// Applies a SQL transform to the result column of both results before
/// comparing them, e.g. `canonicalize({})` to sort the output of `array_agg`.
/// Grouping key columns are carried through untransformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResultVerifier {
    template: String,
    projections: Vec<String>,
}

impl TransformResultVerifier {
    /// `template` is a SQL expression with exactly one `{}` placeholder for
    /// the result column name.
    ///
    /// # Panics
    ///
    /// Panics if the template does not contain exactly one placeholder.
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let placeholders = template.matches("{}").count();
        assert_eq!(
            placeholders, 1,
            "transform template must contain exactly one {{}} placeholder: {template}"
        );
        Self {
            template,
            projections: Vec::new(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn initialize(&mut self, grouping_keys: &[String], result_name: &str) {
        assert!(
            self.projections.is_empty(),
            "transform verifier initialized twice without reset"
        );
        self.projections = grouping_keys.to_vec();
        self.projections
            .push(self.template.replacen("{}", result_name, 1));
    }

    pub fn compare<E: QueryEngine + ?Sized>(
        &self,
        engine: &E,
        result: &RowBatch,
        alt_result: &RowBatch,
    ) -> Result<bool> {
        let transformed = self.transform(engine, result)?;
        let alt_transformed = self.transform(engine, alt_result)?;
        Ok(results_equivalent(&transformed, &alt_transformed))
    }

    pub fn reset(&mut self) {
        self.projections.clear();
    }

    fn transform<E: QueryEngine + ?Sized>(&self, engine: &E, data: &RowBatch) -> Result<RowBatch> {
        assert!(
            !self.projections.is_empty(),
            "transform verifier used before initialize"
        );
        let plan = PlanBuilder::values(vec![data.clone()])
            .project(&self.projections)
            .build();
        engine.execute(&plan)
    }
}

// ---------------------------------------------------------------------------
// approx_distinct vs count(distinct)
// ---------------------------------------------------------------------------

/// Error bound `approx_distinct(x)` uses when called without one.
pub const DEFAULT_ERROR_BOUND: f64 = 0.023;
/// A group gap larger than this multiple of the error bound is "large".
pub const LARGE_GAP_FACTOR: f64 = 2.0;
/// Group count at which a few large gaps are tolerated.
pub const MIN_GROUPS_FOR_OUTLIERS: usize = 50;
/// Large gaps tolerated once there are at least [`MIN_GROUPS_FOR_OUTLIERS`]
/// groups (about 5%).
pub const MAX_TOLERATED_LARGE_GAPS: usize = 3;

const ACTUAL_COLUMN: &str = "actual_count";
const EXPECTED_COLUMN: &str = "expected_count";

/// One group's approximate vs exact distinct count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupGap {
    /// Grouping key values, `key=value, ...`.
    pub group: String,
    pub actual: i64,
    pub expected: i64,
    /// `|actual - expected| / expected`; infinite when `expected` is zero.
    pub relative_gap: f64,
}

/// A group that appears in only one of the two results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingGroup {
    pub group: String,
    pub actual: Option<i64>,
    pub expected: Option<i64>,
}

/// Diagnostic outcome of one `approx_distinct` verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistinctGapReport {
    pub function: String,
    pub error_bound: f64,
    pub num_groups: usize,
    pub large_gaps: Vec<GroupGap>,
    pub missing_groups: Vec<MissingGroup>,
    /// Set when exact count is zero but the approximation is not.
    pub zero_expected_violation: Option<GroupGap>,
    pub passed: bool,
}

impl DistinctGapReport {
    /// Large gaps allowed for this many groups.
    pub const fn tolerated_large_gaps(num_groups: usize) -> usize {
        if num_groups >= MIN_GROUPS_FOR_OUTLIERS {
            MAX_TOLERATED_LARGE_GAPS
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DistinctTrialState {
    function: String,
    expected: RowBatch,
    grouping_keys: Vec<String>,
    result_name: String,
    error_bound: f64,
}

/// Checks `approx_distinct(x[, e])` against `count(distinct x)` per group.
///
/// A group whose relative gap exceeds `2 * e` is a large gap. With at least
/// 50 groups up to 3 large gaps pass; with fewer groups none do. A non-zero
/// approximation of an empty group always fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApproxDistinctResultVerifier {
    state: Option<DistinctTrialState>,
}

impl ApproxDistinctResultVerifier {
    /// Error bound captured for the current trial.
    pub fn error_bound(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.error_bound)
    }

    /// Exact per-group distinct counts computed for the current trial.
    pub fn expected(&self) -> Option<&RowBatch> {
        self.state.as_ref().map(|s| &s.expected)
    }

    /// Compute `count(distinct x)` over the trial input with the same
    /// grouping and mask as the call under test.
    pub fn initialize<E: QueryEngine + ?Sized>(
        &mut self,
        engine: &E,
        input: &[RowBatch],
        grouping_keys: &[String],
        call: &AggregateCall,
        result_name: &str,
    ) -> Result<()> {
        assert!(
            self.state.is_none(),
            "approx_distinct verifier initialized twice without reset"
        );
        assert!(!input.is_empty(), "approx_distinct verifier needs input batches");

        let error_bound = extract_error_bound(call, &input[0])?;
        let count_distinct = format!("{} AS {result_name}", count_distinct_call(call));
        let plan = PlanBuilder::values(input.to_vec())
            .single_aggregation(grouping_keys, &[count_distinct])
            .build();
        let expected = engine.execute(&plan)?;
        debug!(
            function = %call.name,
            groups = expected.num_rows(),
            error_bound,
            "computed exact distinct counts"
        );

        self.state = Some(DistinctTrialState {
            function: call.name.clone(),
            expected,
            grouping_keys: grouping_keys.to_vec(),
            result_name: result_name.to_owned(),
            error_bound,
        });
        Ok(())
    }

    pub fn verify<E: QueryEngine + ?Sized>(&self, engine: &E, result: &RowBatch) -> Result<bool> {
        self.verify_report(engine, result).map(|report| report.passed)
    }

    /// Pair actual and expected counts per group and score the gaps.
    pub fn verify_report<E: QueryEngine + ?Sized>(
        &self,
        engine: &E,
        result: &RowBatch,
    ) -> Result<DistinctGapReport> {
        let Some(state) = &self.state else {
            panic!("approx_distinct verifier used before initialize");
        };
        let combined = combine_by_group(engine, state, result)?;
        let actual = combined.column(ACTUAL_COLUMN)?;
        let expected = combined.column(EXPECTED_COLUMN)?;
        let key_count = state.grouping_keys.len();

        let num_groups = result.num_rows();
        let mut report = DistinctGapReport {
            function: state.function.clone(),
            error_bound: state.error_bound,
            num_groups,
            large_gaps: Vec::new(),
            missing_groups: Vec::new(),
            zero_expected_violation: None,
            passed: false,
        };
        if combined.num_rows() != num_groups {
            error!(
                result_groups = num_groups,
                combined_groups = combined.num_rows(),
                "approx_distinct result and count(distinct) disagree on groups"
            );
        }

        for row in 0..combined.num_rows() {
            let group = combined.describe_row_prefix(row, key_count);
            let (actual_count, expected_count) = match (
                actual.value_at(row).as_i64(),
                expected.value_at(row).as_i64(),
            ) {
                (Some(a), Some(e)) => (a, e),
                (a, e) => {
                    error!(group = %group, actual = ?a, expected = ?e, "group missing from one result");
                    report.missing_groups.push(MissingGroup {
                        group,
                        actual: a,
                        expected: e,
                    });
                    continue;
                }
            };
            if actual_count == expected_count {
                continue;
            }

            if expected_count > 0 {
                let gap = actual_count.abs_diff(expected_count) as f64 / expected_count as f64;
                if gap > LARGE_GAP_FACTOR * state.error_bound {
                    warn!(
                        error_bound = state.error_bound,
                        gap,
                        approx_distinct = actual_count,
                        count_distinct = expected_count,
                        group = %group,
                        "approx_distinct is more than 2 stddev away from count(distinct); \
                         unusual, but not necessarily a bug"
                    );
                    report.large_gaps.push(GroupGap {
                        group,
                        actual: actual_count,
                        expected: expected_count,
                        relative_gap: gap,
                    });
                }
            } else {
                error!(
                    error_bound = state.error_bound,
                    approx_distinct = actual_count,
                    group = %group,
                    "count(distinct) returned 0 but approx_distinct did not"
                );
                report.zero_expected_violation = Some(GroupGap {
                    group,
                    actual: actual_count,
                    expected: expected_count,
                    relative_gap: f64::INFINITY,
                });
                return Ok(report);
            }
        }

        report.passed = report.missing_groups.is_empty()
            && report.large_gaps.len() <= DistinctGapReport::tolerated_large_gaps(num_groups);
        Ok(report)
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Union the expected and actual results, then aggregate per group to get
/// both counts side by side. A join cannot be used because grouping keys may
/// be null.
fn combine_by_group<E: QueryEngine + ?Sized>(
    engine: &E,
    state: &DistinctTrialState,
    result: &RowBatch,
) -> Result<RowBatch> {
    let name = &state.result_name;
    let labeled = |label: &str| {
        let mut projections = state.grouping_keys.clone();
        projections.push(name.clone());
        projections.push(format!("'{label}' AS label"));
        projections
    };

    let expected_source = PlanBuilder::values(vec![state.expected.clone()])
        .project(&labeled("expected"))
        .build();
    let actual_source = PlanBuilder::values(vec![result.clone()])
        .project(&labeled("actual"))
        .build();

    let plan = PlanBuilder::union_all(vec![expected_source, actual_source])
        .single_aggregation(
            &state.grouping_keys,
            &[
                format!("max(CASE WHEN label = 'actual' THEN {name} END) AS {ACTUAL_COLUMN}"),
                format!("max(CASE WHEN label = 'expected' THEN {name} END) AS {EXPECTED_COLUMN}"),
            ],
        )
        .build();
    engine.execute(&plan)
}

fn count_distinct_call(call: &AggregateCall) -> String {
    let input = call
        .inputs
        .first()
        .unwrap_or_else(|| panic!("{} call has no arguments", call.name));
    let mut sql = format!("count(DISTINCT {input})");
    if let Some(mask) = &call.mask {
        sql.push_str(" FILTER (WHERE ");
        sql.push_str(mask);
        sql.push(')');
    }
    sql
}

/// The error bound is the default for `approx_distinct(x)` and the value of
/// the second argument's column otherwise.
fn extract_error_bound(call: &AggregateCall, input: &RowBatch) -> Result<f64> {
    let Some(field) = call.inputs.get(1) else {
        return Ok(DEFAULT_ERROR_BOUND);
    };
    let column = input.column(field)?;
    assert!(!column.is_empty(), "error bound column {field} is empty");
    let error_bound = column.value_at(0).as_f64().unwrap_or_else(|| {
        panic!(
            "error bound column {field} must hold a non-null DOUBLE, got {}",
            column.value_at(0)
        )
    });
    Ok(error_bound)
}
