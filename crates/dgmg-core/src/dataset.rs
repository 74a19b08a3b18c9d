//! Ground-truth derivation traces for teacher-forced training.

use crate::action::Action::{Activity, AddNode, Correlation, Joint};
use crate::action::{Action, ActionTrace};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Derivation of one event-log graph: eight nodes (five events, an
/// application, a resource and an offer) with correlation and
/// directly-follows links, in the joint encoding of the `cycles` vocabulary.
#[rustfmt::skip]
const REFERENCE_TRACE: &[Action] = &[
    AddNode(0), Activity(0), Joint(4),
    AddNode(1), Joint(2), Joint(8),
    AddNode(2), Joint(1), Joint(12),
    AddNode(0), Activity(1), Joint(4), Joint(8), Joint(3), Correlation(0), Joint(3), Correlation(1), Joint(16),
    AddNode(0), Activity(2), Joint(20),
    AddNode(3), Joint(18), Joint(24),
    AddNode(0), Activity(3), Joint(20), Joint(19), Correlation(2), Joint(28),
    AddNode(0), Activity(4), Joint(20), Joint(8), Joint(27), Correlation(2), Joint(15), Correlation(1), Joint(32),
    AddNode(4),
];

/// An ordered collection of traces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceDataset {
    traces: Vec<ActionTrace>,
}

impl TraceDataset {
    /// Create a dataset from traces.
    pub fn new(traces: Vec<ActionTrace>) -> Self {
        Self { traces }
    }

    /// The built-in single-trace event-log dataset.
    pub fn reference() -> Self {
        Self::new(vec![ActionTrace::new(REFERENCE_TRACE.to_vec())])
    }

    /// Load from a JSON array of traces (each an array of `[kind, value]`).
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let dataset: Self = serde_json::from_str(&text)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            traces = dataset.len(),
            "loaded trace dataset"
        );
        Ok(dataset)
    }

    /// Write as a JSON array of traces.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Number of traces.
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Trace at `index`.
    pub fn get(&self, index: usize) -> Option<&ActionTrace> {
        self.traces.get(index)
    }

    /// Iterate over traces.
    pub fn iter(&self) -> impl Iterator<Item = &ActionTrace> {
        self.traces.iter()
    }

    /// Unwrap a batch of exactly one trace.
    ///
    /// Generation is sequential per sample, so batches larger than one are
    /// rejected rather than silently truncated.
    pub fn collate_single<'a>(&self, batch: &[&'a ActionTrace]) -> Result<&'a ActionTrace> {
        match batch {
            [single] => Ok(*single),
            _ => Err(Error::BatchSize(batch.len())),
        }
    }

    /// Pass a batch through unchanged.
    pub fn collate_batch<'a>(&self, batch: Vec<&'a ActionTrace>) -> Vec<&'a ActionTrace> {
        batch
    }
}
