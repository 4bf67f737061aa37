//! Function-name bindings for custom generators and verifiers.
//!
//! The registry holds two mappings keyed by lowercase function name:
//!
//! - generators: absent name means default unconstrained generation
//! - verifiers: a custom verifier, an explicit skip, or absent (default
//!   full-equality comparison against the reference engine)
//!
//! It is built once at startup; the key set is fixed after construction.
//! Instances are reused across trials and reset between them through
//! [`ExtensionRegistry::reset_trial_state`].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::input_generator::InputGenerator;
use crate::result_verifier::ResultVerifier;

/// Transform used for collected lists and sets.
pub const SORT_TRANSFORM: &str = "canonicalize({})";
/// Transform used for maps whose values are not comparable across runs.
pub const MAP_KEYS_TRANSFORM: &str = "canonicalize(map_keys({}))";
/// Transform used for maps of collected lists.
pub const MAP_VALUES_TRANSFORM: &str = "canonicalize_values({})";

/// Functions whose results are order dependent or non-deterministic with no
/// known normalization.
pub const SKIPPED_VERIFICATION: [&str; 10] = [
    "approx_set",
    "approx_percentile",
    "arbitrary",
    "max_by",
    "min_by",
    "skewness",
    "kurtosis",
    "entropy",
    "max_data_size_for_stats",
    "sum_data_size_for_stats",
];

#[derive(Debug, Clone, PartialEq)]
enum VerifierEntry {
    Skip,
    Custom(ResultVerifier),
}

/// Outcome of a verifier lookup.
#[derive(Debug, PartialEq)]
pub enum VerifierLookup<T> {
    /// No entry: compare against the reference engine for equality.
    Default,
    /// Explicit entry: do not verify results of this function.
    Skip,
    Custom(T),
}

impl<T> VerifierLookup<T> {
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }

    pub const fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

/// Per-function generator and verifier bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionRegistry {
    generators: BTreeMap<String, InputGenerator>,
    verifiers: BTreeMap<String, VerifierEntry>,
}

impl ExtensionRegistry {
    /// An empty registry: every function uses default generation and
    /// verification.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generator(mut self, name: &str, generator: InputGenerator) -> Self {
        self.generators.insert(normalize(name), generator);
        self
    }

    pub fn with_verifier(mut self, name: &str, verifier: ResultVerifier) -> Self {
        self.verifiers
            .insert(normalize(name), VerifierEntry::Custom(verifier));
        self
    }

    /// Mark `name` as not verifiable.
    pub fn with_skip(mut self, name: &str) -> Self {
        self.verifiers.insert(normalize(name), VerifierEntry::Skip);
        self
    }

    pub fn has_generator(&self, name: &str) -> bool {
        self.generators.contains_key(&normalize(name))
    }

    pub fn generator(&self, name: &str) -> Option<&InputGenerator> {
        self.generators.get(&normalize(name))
    }

    pub fn generator_mut(&mut self, name: &str) -> Option<&mut InputGenerator> {
        self.generators.get_mut(&normalize(name))
    }

    pub fn verifier(&self, name: &str) -> VerifierLookup<&ResultVerifier> {
        match self.verifiers.get(&normalize(name)) {
            None => VerifierLookup::Default,
            Some(VerifierEntry::Skip) => VerifierLookup::Skip,
            Some(VerifierEntry::Custom(verifier)) => VerifierLookup::Custom(verifier),
        }
    }

    pub fn verifier_mut(&mut self, name: &str) -> VerifierLookup<&mut ResultVerifier> {
        match self.verifiers.get_mut(&normalize(name)) {
            None => VerifierLookup::Default,
            Some(VerifierEntry::Skip) => VerifierLookup::Skip,
            Some(VerifierEntry::Custom(verifier)) => VerifierLookup::Custom(verifier),
        }
    }

    pub fn generator_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.generators.keys().map(String::as_str)
    }

    pub fn verifier_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.verifiers.keys().map(String::as_str)
    }

    /// Reset every generator and verifier. This is the trial boundary.
    pub fn reset_trial_state(&mut self) {
        for generator in self.generators.values_mut() {
            generator.reset();
        }
        for entry in self.verifiers.values_mut() {
            if let VerifierEntry::Custom(verifier) = entry {
                verifier.reset();
            }
        }
    }

    /// Serializable view of the bindings, sorted by name.
    pub fn summary(&self) -> Vec<RegistryEntrySummary> {
        let mut names: Vec<&str> = self.generator_names().chain(self.verifier_names()).collect();
        names.sort_unstable();
        names.dedup();
        names
            .into_iter()
            .map(|name| {
                let (verifier, template) = match self.verifier(name) {
                    VerifierLookup::Default => ("default".to_owned(), None),
                    VerifierLookup::Skip => ("skip".to_owned(), None),
                    VerifierLookup::Custom(v) => {
                        let template = match v {
                            ResultVerifier::Transform(t) => Some(t.template().to_owned()),
                            ResultVerifier::ApproxDistinct(_) => None,
                        };
                        (v.kind().to_owned(), template)
                    }
                };
                RegistryEntrySummary {
                    function: name.to_owned(),
                    generator: self.generator(name).map(|g| g.kind().to_owned()),
                    verifier,
                    transform: template,
                }
            })
            .collect()
    }
}

/// One row of [`ExtensionRegistry::summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntrySummary {
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// `default`, `skip`, `transform` or `approx_distinct`.
    pub verifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

/// The stock bindings for Presto-style aggregates.
pub fn default_registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    for name in ["min", "max", "min_by", "max_by"] {
        registry = registry.with_generator(name, InputGenerator::extremum(name));
    }
    registry = registry
        .with_generator("approx_distinct", InputGenerator::approx_distinct())
        .with_generator("approx_set", InputGenerator::approx_distinct())
        .with_generator("approx_percentile", InputGenerator::approx_percentile())
        .with_verifier("approx_distinct", ResultVerifier::approx_distinct());

    for name in ["array_agg", "set_agg", "set_union"] {
        registry = registry.with_verifier(name, ResultVerifier::transform(SORT_TRANSFORM));
    }
    for name in ["map_agg", "map_union", "map_union_sum"] {
        registry = registry.with_verifier(name, ResultVerifier::transform(MAP_KEYS_TRANSFORM));
    }
    registry = registry.with_verifier(
        "multimap_agg",
        ResultVerifier::transform(MAP_VALUES_TRANSFORM),
    );
    for name in SKIPPED_VERIFICATION {
        registry = registry.with_skip(name);
    }
    registry
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}
