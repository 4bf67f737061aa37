//! Extension layer of the aggregate function fuzzer.
//!
//! Many aggregates cannot be checked by plain equality against a reference
//! engine: approximate algorithms, order-dependent collectors, functions with
//! tuning arguments that must stay valid and stable across a trial. This
//! crate encodes that per-function knowledge:
//!
//! - [`input_generator`]: constrained argument columns with per-trial
//!   memoized tuning parameters
//! - [`result_verifier`]: transform-and-compare and ground-truth verifiers
//! - [`registry`]: binds generators and verifiers to function names
//!
//! The orchestrator that drives trials is not part of this crate. It reaches
//! the reference engine through [`engine::QueryEngine`] (with
//! [`oracle::SqliteEngine`] as the stock implementation) and unconstrained
//! random columns through [`synth::ValueSynthesizer`].

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod input_generator;
pub mod logging;
pub mod oracle;
pub mod registry;
pub mod result_verifier;
pub mod seed;
pub mod synth;

pub use aggregate::AggregateCall;
pub use config::{FuzzerOptions, FuzzerSettings, parse_function_list, resolve_seed};
pub use engine::{Plan, PlanBuilder, QueryEngine, results_equivalent};
pub use input_generator::InputGenerator;
pub use oracle::SqliteEngine;
pub use registry::{ExtensionRegistry, VerifierLookup, default_registry};
pub use result_verifier::{DistinctGapReport, ResultVerifier};
pub use seed::TrialSeeds;
pub use synth::{RandomSynthesizer, SynthesizerOptions, TimestampPrecision, ValueSynthesizer};
