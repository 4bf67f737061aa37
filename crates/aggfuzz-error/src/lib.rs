use thiserror::Error;

/// Primary error type for the aggregate fuzzing extension layer.
///
/// Only recoverable failures live here: reference engine errors, malformed
/// batches and configuration problems. Contract violations inside the harness
/// (unsupported verifier mode, unexpected argument type at a fixed position)
/// are not represented; they panic.
#[derive(Error, Debug)]
pub enum AggFuzzError {
    // === Engine Errors ===
    /// The reference query engine rejected or failed to run a plan.
    #[error("engine error: {detail}")]
    Engine { detail: String },

    /// A plan or lookup referenced a column that does not exist.
    #[error("no such column: {name}")]
    NoSuchColumn { name: String },

    // === Batch Errors ===
    /// Columns of a batch disagree on length, or names and columns disagree
    /// on count.
    #[error("batch shape mismatch: {detail}")]
    ShapeMismatch { detail: String },

    /// A batch without columns cannot be loaded into the engine.
    #[error("batch has no columns")]
    EmptySchema,

    // === Configuration Errors ===
    /// Config or report file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid fuzzer configuration value.
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration could not be parsed.
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AggFuzzError {
    /// Create an engine error.
    pub fn engine(detail: impl Into<String>) -> Self {
        Self::Engine {
            detail: detail.into(),
        }
    }

    /// Create a batch shape error.
    pub fn shape(detail: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            detail: detail.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }

    /// Whether this error came from the reference engine rather than from the
    /// harness inputs.
    pub const fn is_engine_failure(&self) -> bool {
        matches!(self, Self::Engine { .. } | Self::NoSuchColumn { .. })
    }
}

/// Result type alias using `AggFuzzError`.
pub type Result<T> = std::result::Result<T, AggFuzzError>;
