//! Provenance descriptors attached to run reports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provenance information recorded alongside every survey run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Canonical hash of the run parameters.
    pub params_hash: String,
    /// Label of the oracle that produced the invariants.
    pub oracle: String,
    /// RFC 3339 timestamp recording when the run started.
    pub created_at: String,
    /// Version map for all tools involved in the run.
    pub tool_versions: BTreeMap<String, String>,
}

impl RunProvenance {
    /// Creates a provenance record stamped with this crate's version.
    pub fn new(
        params_hash: impl Into<String>,
        oracle: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        let mut tool_versions = BTreeMap::new();
        tool_versions.insert(
            "qf-core".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        Self {
            params_hash: params_hash.into(),
            oracle: oracle.into(),
            created_at: created_at.into(),
            tool_versions,
        }
    }

    /// Records the version of an additional tool.
    pub fn with_tool(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.tool_versions.insert(name.into(), version.into());
        self
    }
}
