//! Results returned by provisioning operations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of a refresh, preview, update or destroy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub stack_name: String,
    /// Human readable summary, e.g. "1 to create, 0 to update, 0 to delete, 2 unchanged"
    pub summary: String,
    /// Resource change counts keyed by operation type
    pub operations: BTreeMap<String, usize>,
    /// Resources still recorded in state after a destroy
    #[serde(default)]
    pub remaining: usize,
}

impl OperationResult {
    pub fn count(&self, operation: &str) -> usize {
        self.operations.get(operation).copied().unwrap_or(0)
    }
}

pub type PreviewResult = OperationResult;
pub type UpdateResult = OperationResult;
pub type DestroyResult = OperationResult;
pub type RefreshResult = OperationResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputsResult {
    pub stack_name: String,
    pub outputs: BTreeMap<String, serde_json::Value>,
}
