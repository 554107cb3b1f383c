use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Structured generation parameters.
///
/// Produced and interpreted by the backend; the client only records it.
/// Every list defaults to empty so partial schemas still parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSchema {
    pub subject: Vec<String>,
    pub appearance: Vec<String>,
    pub style: Vec<String>,
    pub composition: Vec<String>,
    pub lighting: Vec<String>,
    pub background: Vec<String>,
    pub quality: Vec<String>,
    pub negative: Vec<String>,
    /// Emphasis per aspect, e.g. `{"lighting": 1.1}`.
    pub weights: BTreeMap<String, f64>,
}

/// The change a revision applied on top of its parent's schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptDiff {
    #[serde(default)]
    pub operations: Vec<DiffOperation>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// A single schema edit: `add`, `remove`, `replace`, or `adjust`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffOperation {
    pub action: String,
    /// Schema field path, e.g. `lighting` or `weights.lighting`.
    pub field: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    /// Weight delta for `adjust` operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}
