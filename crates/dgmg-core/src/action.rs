//! Raw actions of a graph derivation trace.
//!
//! A trace is a list of `(kind, value)` integer pairs, one per structural
//! decision, serialized as `[[0, 0], [1, 0], [6, 4], ...]`:
//!
//! | kind | decision | value |
//! |------|----------|-------|
//! | 0 | add node | node type position, or `#node_types` to stop |
//! | 1 | activity | activity label of the node just added |
//! | 2 | add edge | relation position, or `#edge_types` to stop |
//! | 3 | destination | destination node id of the pending edge |
//! | 4 | direction | `0` outgoing from the new node, `1` incoming |
//! | 5 | correlation | correlation entity type of the last edge |
//! | 6 | joint | edge type, destination and direction folded into one index |
//!
//! Kinds 2, 3 and 4 are usually folded into kind 6; see
//! [`TraceDecoder`](crate::decode::TraceDecoder) for the unfolding.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of a derivation trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(u8, usize)", into = "(u8, usize)")]
pub enum Action {
    AddNode(usize),
    Activity(usize),
    AddEdge(usize),
    Destination(usize),
    Direction(usize),
    Correlation(usize),
    Joint(usize),
}

impl Action {
    /// Leading integer tag of the pair encoding.
    pub fn kind(&self) -> u8 {
        match self {
            Action::AddNode(_) => 0,
            Action::Activity(_) => 1,
            Action::AddEdge(_) => 2,
            Action::Destination(_) => 3,
            Action::Direction(_) => 4,
            Action::Correlation(_) => 5,
            Action::Joint(_) => 6,
        }
    }

    /// Parameter of the decision.
    pub fn value(&self) -> usize {
        match *self {
            Action::AddNode(v)
            | Action::Activity(v)
            | Action::AddEdge(v)
            | Action::Destination(v)
            | Action::Direction(v)
            | Action::Correlation(v)
            | Action::Joint(v) => v,
        }
    }
}

impl TryFrom<(u8, usize)> for Action {
    type Error = Error;

    fn try_from((kind, value): (u8, usize)) -> Result<Self, Self::Error> {
        Ok(match kind {
            0 => Action::AddNode(value),
            1 => Action::Activity(value),
            2 => Action::AddEdge(value),
            3 => Action::Destination(value),
            4 => Action::Direction(value),
            5 => Action::Correlation(value),
            6 => Action::Joint(value),
            other => return Err(Error::UnknownActionKind(other)),
        })
    }
}

impl From<Action> for (u8, usize) {
    fn from(a: Action) -> Self {
        (a.kind(), a.value())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.kind(), self.value())
    }
}

/// Orientation of a link, seen from the node that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    /// New node is the source.
    Outgoing,
    /// New node is the target.
    Incoming,
}

impl EdgeDirection {
    /// Decode the trace encoding (`0` outgoing, `1` incoming).
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(EdgeDirection::Outgoing),
            1 => Some(EdgeDirection::Incoming),
            _ => None,
        }
    }
}

/// A complete ground-truth derivation of one graph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionTrace {
    pub actions: Vec<Action>,
}

impl ActionTrace {
    /// Create a trace from actions.
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    /// Build a trace from integer pairs.
    pub fn from_pairs(pairs: &[(u8, usize)]) -> crate::Result<Self> {
        let actions = pairs
            .iter()
            .map(|&pair| Action::try_from(pair))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Self { actions })
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the trace has no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
