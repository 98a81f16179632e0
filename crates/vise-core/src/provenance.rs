//! Append-only provenance log.
//!
//! Every mutating workbench operation appends exactly one entry and bumps
//! the strictly monotonic version counter. Entries are immutable once
//! appended and are never removed, so `diff(v).len() == current - v` always
//! holds. Reads are not logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub op: String,
    pub args: serde_json::Value,
    pub at: DateTime<Utc>,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvenanceLog {
    entries: Vec<ProvenanceEntry>,
}

impl ProvenanceLog {
    pub fn entries(&self) -> &[ProvenanceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn append(
        &mut self,
        op: &str,
        args: serde_json::Value,
        version: u64,
        result: Option<serde_json::Value>,
    ) {
        self.entries.push(ProvenanceEntry {
            op: op.to_string(),
            args,
            at: Utc::now(),
            version,
            result,
        });
    }

    /// Entries appended after `since_version`, in append order.
    pub fn since(&self, since_version: u64) -> Vec<ProvenanceEntry> {
        self.entries
            .iter()
            .filter(|e| e.version > since_version)
            .cloned()
            .collect()
    }
}
