//! Per-trial seed derivation.
//!
//! Every trial draws its randomness from seeds derived from one root seed as
//! `H(root || purpose_tag || iteration)` with `H` = xxh3_64, so any failing
//! trial can be replayed from the root seed and its iteration number alone.
//!
//! - **generator**: the `rng` passed into input generators
//! - **synthesizer**: reseeds the value synthesizer
//! - **selection**: picks the function and signature under test

use xxhash_rust::xxh3::xxh3_64;

const TAG_GENERATOR: &[u8] = b"generator";
const TAG_SYNTHESIZER: &[u8] = b"synthesizer";
const TAG_SELECTION: &[u8] = b"selection";

/// Seeds for one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialSeeds {
    pub root: u64,
    pub iteration: u64,
    pub generator: u64,
    pub synthesizer: u64,
    pub selection: u64,
}

impl TrialSeeds {
    pub fn derive(root: u64, iteration: u64) -> Self {
        Self {
            root,
            iteration,
            generator: derive_seed(root, TAG_GENERATOR, iteration),
            synthesizer: derive_seed(root, TAG_SYNTHESIZER, iteration),
            selection: derive_seed(root, TAG_SELECTION, iteration),
        }
    }
}

fn derive_seed(root: u64, purpose_tag: &[u8], iteration: u64) -> u64 {
    let mut buf = Vec::with_capacity(16 + purpose_tag.len());
    buf.extend_from_slice(&root.to_le_bytes());
    buf.extend_from_slice(purpose_tag);
    buf.extend_from_slice(&iteration.to_le_bytes());
    xxh3_64(&buf)
}
