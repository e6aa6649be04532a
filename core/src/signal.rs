//! Signal reports: the fixed schema every specialist worker returns.
//!
//! A report is produced once per worker invocation and never mutated
//! afterwards. Buckets are keyed by the worker's own category labels
//! (`economic`, `operational_issues`, ...); the coordinator maps those
//! labels onto risk categories.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReport {
    pub source_id: String,
    pub category_buckets: BTreeMap<String, Vec<String>>,
    pub timestamp: Timestamp,
}

impl SignalReport {
    pub fn new(source_id: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            source_id: source_id.into(),
            category_buckets: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn with_bucket<S: Into<String>>(
        mut self,
        bucket: impl Into<String>,
        signals: impl IntoIterator<Item = S>,
    ) -> Self {
        self.category_buckets
            .insert(bucket.into(), signals.into_iter().map(Into::into).collect());
        self
    }

    /// Total number of signal strings across all buckets.
    pub fn signal_count(&self) -> usize {
        self.category_buckets.values().map(Vec::len).sum()
    }

    /// Every non-blank signal entry as `(bucket, signal)`, buckets in key
    /// order and entries in their original sequence.
    pub fn actionable_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.category_buckets.iter().flat_map(|(bucket, signals)| {
            signals
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(move |s| (bucket.as_str(), s))
        })
    }
}
