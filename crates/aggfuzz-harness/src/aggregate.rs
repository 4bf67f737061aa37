use serde::{Deserialize, Serialize};

/// The aggregate call under test in the current trial.
///
/// Arguments and the optional mask are column references into the trial's
/// input batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCall {
    pub name: String,
    pub inputs: Vec<String>,
    /// Boolean column restricting which rows contribute.
    #[serde(default)]
    pub mask: Option<String>,
}

impl AggregateCall {
    pub fn new<S: AsRef<str>>(name: impl Into<String>, inputs: &[S]) -> Self {
        Self {
            name: name.into(),
            inputs: inputs.iter().map(|s| s.as_ref().to_owned()).collect(),
            mask: None,
        }
    }

    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    /// SQL text of the call, e.g. `approx_distinct(c0, c1) FILTER (WHERE m0)`.
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{}({})", self.name, self.inputs.join(", "));
        if let Some(mask) = &self.mask {
            sql.push_str(&format!(" FILTER (WHERE {mask})"));
        }
        sql
    }
}
