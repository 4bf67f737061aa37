//! Custom input generators for aggregates whose arguments need valid,
//! per-trial constant tuning parameters.
//!
//! A trial may feed several batches through the function under test to
//! exercise partial aggregation and merging. Every tuning parameter (the `n`
//! of `min(x, n)`, the error bound of `approx_distinct`, the percentiles of
//! `approx_percentile`) is therefore drawn once per trial, memoized, and
//! broadcast as a constant column in every batch until [`InputGenerator::reset`].
//!
//! `generate` returns one column per declared argument type, or an empty
//! vector to ask the caller to fall back to unconstrained generation. An
//! argument type the generator cannot handle at a fixed position is a harness
//! bug and panics.

use aggfuzz_types::{Column, ColumnPool, DataType, Value};
use rand::Rng;
use tracing::debug;

use crate::synth::ValueSynthesizer;

/// Closed set of generator strategies.
#[derive(Debug, Clone, PartialEq)]
pub enum InputGenerator {
    Extremum(ExtremumInputGenerator),
    ApproxDistinct(ApproxDistinctInputGenerator),
    ApproxPercentile(ApproxPercentileInputGenerator),
}

impl InputGenerator {
    /// Generator for `min`, `max`, `min_by` or `max_by`.
    pub fn extremum(name: &str) -> Self {
        Self::Extremum(ExtremumInputGenerator::new(name))
    }

    pub fn approx_distinct() -> Self {
        Self::ApproxDistinct(ApproxDistinctInputGenerator::default())
    }

    pub fn approx_percentile() -> Self {
        Self::ApproxPercentile(ApproxPercentileInputGenerator::default())
    }

    /// Short label for reports.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Extremum(_) => "extremum",
            Self::ApproxDistinct(_) => "approx_distinct",
            Self::ApproxPercentile(_) => "approx_percentile",
        }
    }

    pub fn generate<S, R>(
        &mut self,
        types: &[DataType],
        synth: &mut S,
        rng: &mut R,
        pool: &ColumnPool,
    ) -> Vec<Column>
    where
        S: ValueSynthesizer + ?Sized,
        R: Rng + ?Sized,
    {
        match self {
            Self::Extremum(generator) => generator.generate(types, synth, rng, pool),
            Self::ApproxDistinct(generator) => generator.generate(types, synth, rng, pool),
            Self::ApproxPercentile(generator) => generator.generate(types, synth, rng, pool),
        }
    }

    /// Forget every memoized parameter. Called by the orchestrator between
    /// trials.
    pub fn reset(&mut self) {
        match self {
            Self::Extremum(generator) => generator.reset(),
            Self::ApproxDistinct(generator) => generator.reset(),
            Self::ApproxPercentile(generator) => generator.reset(),
        }
    }
}

// ---------------------------------------------------------------------------
// min / max / min_by / max_by with a count argument
// ---------------------------------------------------------------------------

/// Largest `n` drawn for the count argument.
pub const MAX_EXTREMUM_COUNT: i64 = 9_999;

/// Inputs for the `n`-returning forms `min(x, n)`, `max(x, n)`,
/// `min_by(x, y, n)` and `max_by(x, y, n)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtremumInputGenerator {
    index_of_n: usize,
    n: Option<i64>,
}

impl ExtremumInputGenerator {
    /// # Panics
    ///
    /// Panics if `name` is not one of `min`, `max`, `min_by`, `max_by`.
    pub fn new(name: &str) -> Self {
        Self {
            index_of_n: index_of_n(name),
            n: None,
        }
    }

    /// Zero-based position of the count argument.
    pub const fn index_of_n(&self) -> usize {
        self.index_of_n
    }

    /// The count memoized for the current trial.
    pub const fn n(&self) -> Option<i64> {
        self.n
    }

    pub fn generate<S, R>(
        &mut self,
        types: &[DataType],
        synth: &mut S,
        rng: &mut R,
        pool: &ColumnPool,
    ) -> Vec<Column>
    where
        S: ValueSynthesizer + ?Sized,
        R: Rng + ?Sized,
    {
        // Plain form without a count: nothing to constrain.
        if types.len() <= self.index_of_n {
            return Vec::new();
        }
        let Some((count_type, leading)) = types.split_last() else {
            return Vec::new();
        };
        assert!(
            count_type.is_bigint(),
            "unexpected type for count argument: {count_type}"
        );

        let n = *self.n.get_or_insert_with(|| {
            let n = rng.gen_range(0..=MAX_EXTREMUM_COUNT);
            debug!(n, "drew extremum count for trial");
            n
        });

        let size = synth.options().vector_size;
        let mut inputs: Vec<Column> = leading.iter().map(|ty| synth.fuzz(ty, pool)).collect();
        inputs.push(pool.constant(DataType::Bigint, Value::Integer(n), size));
        inputs
    }

    pub fn reset(&mut self) {
        self.n = None;
    }
}

fn index_of_n(name: &str) -> usize {
    match name {
        "min" | "max" => 1,
        "min_by" | "max_by" => 2,
        _ => panic!("unexpected function name for extremum generator: {name}"),
    }
}

// ---------------------------------------------------------------------------
// approx_distinct(x, e) / approx_set(x, e)
// ---------------------------------------------------------------------------

/// Smallest standard error supported by the HyperLogLog implementation.
pub const MIN_ERROR_BOUND: f64 = 0.0040625;
/// Largest standard error supported by the HyperLogLog implementation.
pub const MAX_ERROR_BOUND: f64 = 0.26;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApproxDistinctInputGenerator {
    error_bound: Option<f64>,
}

impl ApproxDistinctInputGenerator {
    pub const fn error_bound(&self) -> Option<f64> {
        self.error_bound
    }

    pub fn generate<S, R>(
        &mut self,
        types: &[DataType],
        synth: &mut S,
        rng: &mut R,
        pool: &ColumnPool,
    ) -> Vec<Column>
    where
        S: ValueSynthesizer + ?Sized,
        R: Rng + ?Sized,
    {
        // Single-argument form runs with the built-in default error.
        if types.len() != 2 {
            return Vec::new();
        }
        assert!(
            types[1].is_double(),
            "unexpected type for error bound argument: {}",
            types[1]
        );

        let e = *self.error_bound.get_or_insert_with(|| {
            let e = (MAX_ERROR_BOUND - MIN_ERROR_BOUND).mul_add(rng.gen_range(0.0..1.0), MIN_ERROR_BOUND);
            debug!(error_bound = e, "drew approx_distinct error bound for trial");
            e
        });

        let size = synth.options().vector_size;
        vec![
            synth.fuzz(&types[0], pool),
            pool.constant(DataType::Double, Value::Double(e), size),
        ]
    }

    pub fn reset(&mut self) {
        self.error_bound = None;
    }
}

// ---------------------------------------------------------------------------
// approx_percentile(x, [w], percentile(s), [accuracy])
// ---------------------------------------------------------------------------

/// Percentiles picked 90% of the time.
pub const COMMON_PERCENTILES: [f64; 9] = [0.1, 0.25, 0.5, 0.75, 0.90, 0.95, 0.99, 0.999, 0.9999];

/// Probability of drawing a percentile uniformly from [0, 1) instead of from
/// [`COMMON_PERCENTILES`].
pub const RANDOM_PERCENTILE_PROBABILITY: f64 = 0.1;

/// Number of percentiles in the array form.
pub const PERCENTILE_ARRAY_LEN: usize = 3;

/// Largest per-row weight.
pub const MAX_WEIGHT: i64 = 1_000;

/// Arguments are `x, [w], percentile(s), [accuracy]`. Argument 0 is always
/// `x`. Argument 1 is the weight when declared BIGINT, otherwise it is the
/// percentile. Shape decisions come only from the declared types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApproxPercentileInputGenerator {
    percentile: Option<f64>,
    percentiles: Vec<f64>,
    accuracy: Option<f64>,
}

impl ApproxPercentileInputGenerator {
    pub const fn percentile(&self) -> Option<f64> {
        self.percentile
    }

    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    pub const fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    pub fn generate<S, R>(
        &mut self,
        types: &[DataType],
        synth: &mut S,
        rng: &mut R,
        pool: &ColumnPool,
    ) -> Vec<Column>
    where
        S: ValueSynthesizer + ?Sized,
        R: Rng + ?Sized,
    {
        if types.len() < 2 {
            return Vec::new();
        }

        let size = synth.options().vector_size;
        let mut inputs = Vec::with_capacity(types.len());
        inputs.push(synth.fuzz(&types[0], pool));

        let has_weight = types[1].is_bigint();
        if has_weight {
            inputs.push(pool.flat_from_fn(DataType::Bigint, size, |_| {
                Value::Integer(rng.gen_range(1..=MAX_WEIGHT))
            }));
        }

        let percentile_index = if has_weight { 2 } else { 1 };
        let percentile_type = types.get(percentile_index).unwrap_or_else(|| {
            panic!("approx_percentile signature has a weight but no percentile argument")
        });

        if percentile_type.is_double() {
            let p = *self.percentile.get_or_insert_with(|| {
                let p = pick_percentile(synth, rng);
                debug!(percentile = p, "drew approx_percentile percentile for trial");
                p
            });
            inputs.push(pool.constant(DataType::Double, Value::Double(p), size));
        } else {
            assert!(
                percentile_type.element_type().is_some_and(DataType::is_double),
                "unexpected type for percentile argument: {percentile_type}"
            );
            if self.percentiles.is_empty() {
                self.percentiles = (0..PERCENTILE_ARRAY_LEN)
                    .map(|_| pick_percentile(synth, rng))
                    .collect();
                debug!(percentiles = ?self.percentiles, "drew approx_percentile percentiles for trial");
            }
            let array = Value::Array(self.percentiles.iter().copied().map(Value::Double).collect());
            inputs.push(pool.constant(DataType::array(DataType::Double), array, size));
        }

        if types.len() > percentile_index + 1 {
            assert_eq!(
                types.len(),
                percentile_index + 2,
                "approx_percentile takes at most one argument after the percentile"
            );
            let accuracy_type = &types[percentile_index + 1];
            assert!(
                accuracy_type.is_double(),
                "unexpected type for accuracy argument: {accuracy_type}"
            );
            let accuracy = *self.accuracy.get_or_insert_with(|| rng.gen_range(0.0..1.0));
            inputs.push(pool.constant(DataType::Double, Value::Double(accuracy), size));
        }

        inputs
    }

    pub fn reset(&mut self) {
        self.percentile = None;
        self.percentiles.clear();
        self.accuracy = None;
    }
}

fn pick_percentile<S, R>(synth: &mut S, rng: &mut R) -> f64
where
    S: ValueSynthesizer + ?Sized,
    R: Rng + ?Sized,
{
    if synth.coin_toss(RANDOM_PERCENTILE_PROBABILITY) {
        return rng.gen_range(0.0..1.0);
    }
    COMMON_PERCENTILES[rng.gen_range(0..COMMON_PERCENTILES.len())]
}
