//! Randomized value synthesis for unconstrained argument types.
//!
//! Generators only see the [`ValueSynthesizer`] trait: "fuzz one column of
//! type T" plus a biased coin. [`RandomSynthesizer`] is the stock
//! implementation driven by its own seeded `StdRng`.

use std::collections::BTreeSet;

use aggfuzz_types::{Column, ColumnPool, DataType, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Precision of synthesized `TIMESTAMP` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPrecision {
    Nanoseconds,
    Microseconds,
    #[default]
    Milliseconds,
    Seconds,
}

impl TimestampPrecision {
    /// Nanoseconds per unit of this precision.
    pub const fn unit_nanos(self) -> i64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
        }
    }

    /// Truncate a nanosecond timestamp to this precision.
    pub const fn truncate(self, nanos: i64) -> i64 {
        let unit = self.unit_nanos();
        nanos - nanos.rem_euclid(unit)
    }
}

/// Shape knobs for synthesized columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizerOptions {
    /// Rows per synthesized column (the batch size).
    pub vector_size: usize,
    /// Probability that any single cell is null.
    pub null_ratio: f64,
    /// Maximum length of synthesized strings.
    pub string_length: usize,
    /// Maximum number of elements in synthesized arrays and maps.
    pub container_length: usize,
    pub timestamp_precision: TimestampPrecision,
}

impl Default for SynthesizerOptions {
    fn default() -> Self {
        Self {
            vector_size: 100,
            null_ratio: 0.1,
            string_length: 16,
            container_length: 8,
            timestamp_precision: TimestampPrecision::Milliseconds,
        }
    }
}

/// Source of unconstrained random columns.
pub trait ValueSynthesizer {
    fn options(&self) -> &SynthesizerOptions;

    /// A column of `options().vector_size` random values of `data_type`.
    fn fuzz(&mut self, data_type: &DataType, pool: &ColumnPool) -> Column;

    /// `true` with probability `probability`.
    fn coin_toss(&mut self, probability: f64) -> bool;
}

/// Seeded [`ValueSynthesizer`].
#[derive(Debug, Clone)]
pub struct RandomSynthesizer {
    options: SynthesizerOptions,
    rng: StdRng,
}

/// Timestamps are drawn from [1970-01-01, 2100-01-01).
const MAX_TIMESTAMP_SECONDS: i64 = 4_102_444_800;

const STRING_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 _-";

impl RandomSynthesizer {
    pub fn new(seed: u64, options: SynthesizerOptions) -> Self {
        Self {
            options,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn random_value(&mut self, data_type: &DataType, nullable: bool) -> Value {
        if matches!(data_type, DataType::Unknown) {
            return Value::Null;
        }
        if nullable && self.coin_toss(self.options.null_ratio) {
            return Value::Null;
        }
        match data_type {
            DataType::Boolean => Value::Boolean(self.rng.gen_bool(0.5)),
            DataType::Tinyint | DataType::Smallint | DataType::Integer | DataType::Bigint => {
                let (lo, hi) = data_type
                    .integral_range()
                    .unwrap_or((i64::MIN, i64::MAX));
                Value::Integer(self.rng.gen_range(lo..=hi))
            }
            DataType::Real => Value::Double(f64::from(self.rng.gen_range(-1.0e6_f32..1.0e6_f32))),
            DataType::Double => Value::Double(self.rng.gen_range(-1.0e12..1.0e12)),
            DataType::Varchar => {
                let len = self.rng.gen_range(0..=self.options.string_length);
                let s = (0..len)
                    .map(|_| {
                        let idx = self.rng.gen_range(0..STRING_ALPHABET.len());
                        char::from(STRING_ALPHABET[idx])
                    })
                    .collect::<String>();
                Value::Varchar(s)
            }
            DataType::Timestamp => {
                let seconds = self.rng.gen_range(0..MAX_TIMESTAMP_SECONDS);
                let nanos = self.rng.gen_range(0..1_000_000_000_i64);
                let raw = seconds * 1_000_000_000 + nanos;
                Value::Timestamp(self.options.timestamp_precision.truncate(raw))
            }
            DataType::Array(element) => {
                let len = self.rng.gen_range(0..=self.options.container_length);
                Value::Array((0..len).map(|_| self.random_value(element, true)).collect())
            }
            DataType::Map(key, value) => {
                let len = self.rng.gen_range(0..=self.options.container_length);
                let mut seen = BTreeSet::new();
                let mut entries = Vec::with_capacity(len);
                for _ in 0..len {
                    let k = self.random_value(key, false);
                    // Map keys are unique; duplicates are dropped.
                    if seen.insert(k.to_json().to_string()) {
                        let v = self.random_value(value, true);
                        entries.push((k, v));
                    }
                }
                Value::Map(entries)
            }
            DataType::Unknown => Value::Null,
        }
    }
}

impl ValueSynthesizer for RandomSynthesizer {
    fn options(&self) -> &SynthesizerOptions {
        &self.options
    }

    fn fuzz(&mut self, data_type: &DataType, pool: &ColumnPool) -> Column {
        let size = self.options.vector_size;
        let values = (0..size)
            .map(|_| self.random_value(data_type, true))
            .collect();
        pool.flat(data_type.clone(), values)
    }

    fn coin_toss(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth(seed: u64) -> RandomSynthesizer {
        RandomSynthesizer::new(seed, SynthesizerOptions::default())
    }

    #[test]
    fn fuzz_produces_vector_size_rows() {
        let pool = ColumnPool::new("t");
        let mut s = synth(1);
        let col = s.fuzz(&DataType::Bigint, &pool);
        assert_eq!(col.len(), 100);
        assert_eq!(col.data_type(), &DataType::Bigint);
        assert_eq!(pool.allocated_columns(), 1);
    }

    #[test]
    fn fuzz_respects_integral_width() {
        let pool = ColumnPool::new("t");
        let mut s = synth(2);
        let col = s.fuzz(&DataType::Tinyint, &pool);
        for v in col.iter() {
            if let Some(i) = v.as_i64() {
                assert!((-128..=127).contains(&i), "tinyint out of range: {i}");
            }
        }
    }

    #[test]
    fn timestamps_truncated_to_precision() {
        let pool = ColumnPool::new("t");
        let mut s = RandomSynthesizer::new(
            3,
            SynthesizerOptions {
                timestamp_precision: TimestampPrecision::Milliseconds,
                ..SynthesizerOptions::default()
            },
        );
        let col = s.fuzz(&DataType::Timestamp, &pool);
        for v in col.iter() {
            if let Value::Timestamp(ns) = v {
                assert_eq!(ns % 1_000_000, 0);
            }
        }
    }

    #[test]
    fn map_keys_are_unique_and_non_null() {
        let pool = ColumnPool::new("t");
        let mut s = synth(4);
        let col = s.fuzz(&DataType::map(DataType::Tinyint, DataType::Varchar), &pool);
        for v in col.iter() {
            if let Value::Map(entries) = v {
                let mut keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
                assert!(keys.iter().all(|k| !k.is_null()));
                let before = keys.len();
                keys.sort_by(Value::total_cmp);
                keys.dedup();
                assert_eq!(keys.len(), before);
            }
        }
    }

    #[test]
    fn same_seed_same_column() {
        let pool = ColumnPool::new("t");
        let ty = DataType::array(DataType::Varchar);
        let a = synth(42).fuzz(&ty, &pool);
        let b = synth(42).fuzz(&ty, &pool);
        assert_eq!(a, b);
    }

    #[test]
    fn precision_truncation_handles_negative() {
        assert_eq!(TimestampPrecision::Seconds.truncate(-1), -1_000_000_000);
        assert_eq!(TimestampPrecision::Nanoseconds.truncate(-1), -1);
    }
}
