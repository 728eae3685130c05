//! Variable namespace types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named bag of string outputs exported by one action
///
/// A namespace becomes visible to other actions only once the run order that
/// produced it has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableNamespace {
    pub name: String,
    pub stage: String,
    pub produced_by: String,
    pub run_order: u32,
    pub values: BTreeMap<String, String>,
}

impl VariableNamespace {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}
