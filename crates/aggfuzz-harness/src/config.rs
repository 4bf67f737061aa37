//! Fuzzer configuration surface.
//!
//! [`FuzzerOptions`] is what the orchestrator consumes. [`FuzzerSettings`] is
//! its TOML file form, holding only the scalar knobs; the extension registry
//! always comes from code.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use aggfuzz_error::{AggFuzzError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::registry::{ExtensionRegistry, default_registry};
use crate::synth::{SynthesizerOptions, TimestampPrecision};

/// Functions with known crashes or unsupported features.
pub const DEFAULT_SKIP_FUNCTIONS: [&str; 2] = ["stddev_pop", "reduce_agg"];

/// Aggregates whose reference-engine results are unreliable.
pub const DEFAULT_REFERENCE_DISABLED: [&str; 3] = ["skewness", "kurtosis", "entropy"];

#[derive(Debug, Clone, PartialEq)]
pub struct FuzzerOptions {
    /// Root seed as configured; zero means time-based, see [`resolve_seed`].
    pub seed: u64,
    /// When non-empty, only these functions are fuzzed.
    pub only_functions: BTreeSet<String>,
    /// Never selected, even when listed in `only_functions`.
    pub skip_functions: BTreeSet<String>,
    /// Fuzzed, but never compared against the reference engine.
    pub reference_disabled: BTreeSet<String>,
    pub timestamp_precision: TimestampPrecision,
    pub vector_size: usize,
    pub null_ratio: f64,
    pub extensions: ExtensionRegistry,
}

impl Default for FuzzerOptions {
    fn default() -> Self {
        let synth = SynthesizerOptions::default();
        Self {
            seed: 0,
            only_functions: BTreeSet::new(),
            skip_functions: names(DEFAULT_SKIP_FUNCTIONS),
            reference_disabled: names(DEFAULT_REFERENCE_DISABLED),
            timestamp_precision: TimestampPrecision::Milliseconds,
            vector_size: synth.vector_size,
            null_ratio: synth.null_ratio,
            extensions: default_registry(),
        }
    }
}

impl FuzzerOptions {
    /// Restrict fuzzing to a comma separated list, as given to `--only`.
    pub fn with_only(mut self, list: &str) -> Self {
        self.only_functions = parse_function_list(list);
        self
    }

    /// Deny-list first, then the only-list.
    pub fn is_function_selectable(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        if self.skip_functions.contains(&name) {
            return false;
        }
        self.only_functions.is_empty() || self.only_functions.contains(&name)
    }

    pub fn is_reference_enabled(&self, name: &str) -> bool {
        !self.reference_disabled.contains(&name.to_ascii_lowercase())
    }

    pub fn synthesizer_options(&self) -> SynthesizerOptions {
        SynthesizerOptions {
            vector_size: self.vector_size,
            null_ratio: self.null_ratio,
            timestamp_precision: self.timestamp_precision,
            ..SynthesizerOptions::default()
        }
    }
}

/// Parse `"min, sum,AVG"` into `{avg, min, sum}`. Empty entries are dropped.
pub fn parse_function_list(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Zero selects the current UNIX time in seconds; anything else is returned
/// unchanged.
pub fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(1, |elapsed| elapsed.as_secs().max(1));
    info!(seed = now, "no seed given, using current time");
    now
}

/// File form of [`FuzzerOptions`].
///
/// ```toml
/// seed = 42
/// only = ["approx_distinct", "min"]
/// timestamp_precision = "microseconds"
/// null_ratio = 0.2
/// ```
///
/// `skip` and `reference_disabled` replace the defaults when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FuzzerSettings {
    pub seed: u64,
    pub only: Vec<String>,
    pub skip: Option<Vec<String>>,
    pub reference_disabled: Option<Vec<String>>,
    pub timestamp_precision: TimestampPrecision,
    pub vector_size: Option<usize>,
    pub null_ratio: Option<f64>,
}

impl FuzzerSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn into_options(self) -> Result<FuzzerOptions> {
        let defaults = FuzzerOptions::default();
        let vector_size = self.vector_size.unwrap_or(defaults.vector_size);
        if vector_size == 0 {
            return Err(AggFuzzError::config("vector_size must be positive"));
        }
        let null_ratio = self.null_ratio.unwrap_or(defaults.null_ratio);
        if !(0.0..=1.0).contains(&null_ratio) {
            return Err(AggFuzzError::config(format!(
                "null_ratio must be within [0, 1], got {null_ratio}"
            )));
        }

        Ok(FuzzerOptions {
            seed: self.seed,
            only_functions: lowercase(self.only),
            skip_functions: self.skip.map_or(defaults.skip_functions, lowercase),
            reference_disabled: self
                .reference_disabled
                .map_or(defaults.reference_disabled, lowercase),
            timestamp_precision: self.timestamp_precision,
            vector_size,
            null_ratio,
            extensions: defaults.extensions,
        })
    }
}

fn names<const N: usize>(list: [&str; N]) -> BTreeSet<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

fn lowercase(list: Vec<String>) -> BTreeSet<String> {
    list.into_iter().map(|s| s.to_ascii_lowercase()).collect()
}
