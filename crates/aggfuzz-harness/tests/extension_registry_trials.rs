//! End-to-end trials through the default registry against the SQLite
//! reference engine: generate inputs for several batches, run the aggregate,
//! then verify or compare the results the way the orchestrator does.

use aggfuzz_harness::engine::{PlanBuilder, QueryEngine};
use aggfuzz_harness::registry::{VerifierLookup, default_registry};
use aggfuzz_harness::{
    AggregateCall, ExtensionRegistry, FuzzerOptions, RandomSynthesizer, ResultVerifier,
    SqliteEngine, SynthesizerOptions, TrialSeeds, ValueSynthesizer,
};
use aggfuzz_types::{Column, ColumnPool, DataType, RowBatch, Value};
use rand::SeedableRng;
use rand::rngs::StdRng;

const ROOT_SEED: u64 = 0x5EED_1234;
const BATCHES_PER_TRIAL: usize = 3;
const GROUPS: i64 = 4;

struct Trial {
    synth: RandomSynthesizer,
    rng: StdRng,
    pool: ColumnPool,
}

impl Trial {
    fn new(iteration: u64) -> Self {
        let seeds = TrialSeeds::derive(ROOT_SEED, iteration);
        Self {
            synth: RandomSynthesizer::new(seeds.synthesizer, SynthesizerOptions::default()),
            rng: StdRng::seed_from_u64(seeds.generator),
            pool: ColumnPool::new(format!("trial-{iteration}")),
        }
    }

    /// Generate `BATCHES_PER_TRIAL` batches named `g0, c0, c1, ...` with a
    /// leading grouping key.
    fn batches(
        &mut self,
        registry: &mut ExtensionRegistry,
        function: &str,
        types: &[DataType],
    ) -> Vec<RowBatch> {
        (0..BATCHES_PER_TRIAL)
            .map(|_| {
                let generator = registry
                    .generator_mut(function)
                    .unwrap_or_else(|| panic!("{function} has no generator"));
                let columns = generator.generate(types, &mut self.synth, &mut self.rng, &self.pool);
                assert_eq!(columns.len(), types.len());
                with_group_key(columns)
            })
            .collect()
    }
}

fn with_group_key(mut columns: Vec<Column>) -> RowBatch {
    let rows = columns[0].len();
    columns.insert(
        0,
        Column::flat(
            DataType::Bigint,
            (0..rows).map(|i| Value::Integer(i as i64 % GROUPS)).collect(),
        ),
    );
    let mut names = vec!["g0".to_owned()];
    names.extend((0..columns.len() - 1).map(|i| format!("c{i}")));
    RowBatch::new(names, columns).unwrap()
}

fn group_keys() -> Vec<String> {
    vec!["g0".to_owned()]
}

fn constant_of(batch: &RowBatch, name: &str) -> Value {
    let column = batch.column(name).unwrap();
    assert!(column.is_constant(), "{name} should be a constant column");
    column.value_at(0).clone()
}

/// Run `aggregate AS a0` grouped by `g0` over every batch of the trial.
fn run_aggregate(engine: &SqliteEngine, batches: &[RowBatch], aggregate: &str) -> RowBatch {
    let plan = PlanBuilder::values(batches.to_vec())
        .single_aggregation(&group_keys(), &[format!("{aggregate} AS a0")])
        .build();
    engine.execute(&plan).unwrap()
}

/// Replace the result column with `f(actual)`.
fn perturb(result: &RowBatch, f: impl Fn(i64) -> i64) -> RowBatch {
    let counts = result
        .column("a0")
        .unwrap()
        .iter()
        .map(|v| Value::Integer(f(v.as_i64().unwrap())))
        .collect();
    RowBatch::new(
        group_keys().into_iter().chain(["a0".to_owned()]).collect(),
        vec![
            result.column("g0").unwrap().clone(),
            Column::flat(DataType::Bigint, counts),
        ],
    )
    .unwrap()
}

#[test]
fn approx_distinct_trial_end_to_end() {
    let engine = SqliteEngine::open_in_memory().unwrap();
    let mut registry = default_registry();
    let mut trial = Trial::new(0);

    let batches = trial.batches(
        &mut registry,
        "approx_distinct",
        &[DataType::Bigint, DataType::Double],
    );
    let error_bound = constant_of(&batches[0], "c1");
    for batch in &batches[1..] {
        assert_eq!(constant_of(batch, "c1"), error_bound, "error bound must be stable");
    }

    let call = AggregateCall::new("approx_distinct", &["c0", "c1"]);
    let exact = run_aggregate(&engine, &batches, "count(DISTINCT c0)");
    assert_eq!(exact.num_rows(), GROUPS as usize);

    let VerifierLookup::Custom(verifier) = registry.verifier_mut("approx_distinct") else {
        panic!("approx_distinct should have a custom verifier");
    };
    assert!(verifier.supports_verify());
    verifier
        .initialize(&engine, &batches, &group_keys(), &call, "a0")
        .unwrap();

    assert!(verifier.verify(&engine, &exact).unwrap());
    // Every group off by 500%: far outside any supported error bound.
    let wrong = perturb(&exact, |n| n * 6);
    assert!(!verifier.verify(&engine, &wrong).unwrap());

    registry.reset_trial_state();
    assert_eq!(registry, default_registry());
}

#[test]
fn extremum_count_is_stable_within_trial_and_redrawn_after_reset() {
    let mut registry = default_registry();
    let types = [DataType::Double, DataType::Varchar, DataType::Bigint];

    let mut drawn = Vec::new();
    for iteration in 0..8 {
        let mut trial = Trial::new(iteration);
        let batches = trial.batches(&mut registry, "max_by", &types);
        let n = constant_of(&batches[0], "c2");
        for batch in &batches {
            assert_eq!(constant_of(batch, "c2"), n);
        }
        let n = n.as_i64().unwrap();
        assert!((0..=9_999).contains(&n));
        drawn.push(n);
        registry.reset_trial_state();
    }
    drawn.sort_unstable();
    drawn.dedup();
    assert!(drawn.len() > 1, "counts should differ across trials: {drawn:?}");
}

#[test]
fn array_agg_results_compare_equal_across_input_orders() {
    let engine = SqliteEngine::open_in_memory().unwrap();
    let mut registry = default_registry();
    let mut trial = Trial::new(3);
    let column = trial.synth.fuzz(&DataType::Bigint, &trial.pool);
    let forward = with_group_key(vec![column.clone()]);
    let mut reversed_rows: Vec<Vec<Value>> = forward.rows().collect();
    reversed_rows.reverse();
    let reversed = RowBatch::new(
        forward.names().to_vec(),
        (0..forward.num_columns())
            .map(|c| {
                Column::flat(
                    forward.child_at(c).data_type().clone(),
                    reversed_rows.iter().map(|row| row[c].clone()).collect(),
                )
            })
            .collect(),
    )
    .unwrap();

    let call = AggregateCall::new("array_agg", &["c0"]);
    let a = run_aggregate(&engine, &[forward.clone()], "json_group_array(c0)");
    let b = run_aggregate(&engine, &[reversed], "json_group_array(c0)");

    let VerifierLookup::Custom(verifier) = registry.verifier_mut("array_agg") else {
        panic!("array_agg should have a custom verifier");
    };
    assert!(verifier.supports_compare());
    verifier
        .initialize(&engine, &[forward.clone()], &group_keys(), &call, "a0")
        .unwrap();
    assert!(verifier.compare(&engine, &a, &b).unwrap());

    // Drop one row from one side: one group's array loses an element.
    let truncated = RowBatch::new(
        forward.names().to_vec(),
        (0..forward.num_columns())
            .map(|c| {
                Column::flat(
                    forward.child_at(c).data_type().clone(),
                    forward.child_at(c).iter().skip(1).cloned().collect(),
                )
            })
            .collect(),
    )
    .unwrap();
    let c = run_aggregate(&engine, &[truncated], "json_group_array(c0)");
    assert!(!verifier.compare(&engine, &a, &c).unwrap());
}

#[test]
fn approx_percentile_shapes_follow_declared_types() {
    let mut registry = default_registry();
    let mut trial = Trial::new(5);

    let weighted = trial.batches(
        &mut registry,
        "approx_percentile",
        &[
            DataType::Double,
            DataType::Bigint,
            DataType::array(DataType::Double),
            DataType::Double,
        ],
    );
    let percentiles = constant_of(&weighted[0], "c2");
    assert_eq!(percentiles.as_array().map(<[Value]>::len), Some(3));
    let weights = weighted[0].column("c1").unwrap();
    assert!(!weights.is_constant());
    assert!(weights
        .iter()
        .all(|w| w.as_i64().is_some_and(|w| (1..=1_000).contains(&w))));
    for batch in &weighted {
        assert_eq!(constant_of(batch, "c2"), percentiles);
    }
}

#[test]
fn identical_seeds_reproduce_inputs_and_verdicts() {
    fn run_once() -> (Vec<RowBatch>, bool) {
        let engine = SqliteEngine::open_in_memory().unwrap();
        let mut registry = default_registry();
        let mut trial = Trial::new(11);
        let batches = trial.batches(
            &mut registry,
            "approx_distinct",
            &[DataType::Varchar, DataType::Double],
        );
        let exact = run_aggregate(&engine, &batches, "count(DISTINCT c0)");
        let approx = perturb(&exact, |n| n + 1);
        let VerifierLookup::Custom(ResultVerifier::ApproxDistinct(verifier)) =
            registry.verifier_mut("approx_distinct")
        else {
            panic!("approx_distinct should have the distinct verifier");
        };
        verifier
            .initialize(
                &engine,
                &batches,
                &group_keys(),
                &AggregateCall::new("approx_distinct", &["c0", "c1"]),
                "a0",
            )
            .unwrap();
        let verdict = verifier.verify(&engine, &approx).unwrap();
        (batches, verdict)
    }

    let (batches_a, verdict_a) = run_once();
    let (batches_b, verdict_b) = run_once();
    assert_eq!(batches_a, batches_b);
    assert_eq!(verdict_a, verdict_b);
}

#[test]
fn options_gate_function_selection() {
    let options = FuzzerOptions::default().with_only("approx_distinct, stddev_pop, min");
    let selectable: Vec<&str> = options
        .extensions
        .generator_names()
        .filter(|name| options.is_function_selectable(name))
        .collect();
    assert_eq!(selectable, vec!["approx_distinct", "min"]);
    assert!(!options.is_function_selectable("stddev_pop"));
}
