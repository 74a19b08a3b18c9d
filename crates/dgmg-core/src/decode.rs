//! Unfolding raw traces into the decision steps the generator replays.
//!
//! The generator only has three learned decisions: add a node (or stop), add
//! an edge (or stop), and pick a destination. Everything else in a trace is a
//! structural label without a learned distribution. [`TraceDecoder::decode`]
//! turns a raw [`ActionTrace`] into a flat list of [`Step`]s:
//!
//! ```text
//! (0,0) (1,0)  (6,4)         (0,1)
//!   |     |      |             |
//! Node  Activity Edge(Stop)   Node
//! ```
//!
//! A joint action `j` with `stride = #edge_types * #directions` stops when
//! `j == stride * num_nodes`; otherwise it unfolds to an `Edge(Add)`, a
//! `Destination(j / stride)`, a relation label `j % #edge_types` and a
//! direction label `(j % stride) / #edge_types`.

use crate::action::{Action, ActionTrace, EdgeDirection};
use crate::error::{Error, Result};
use crate::graph::NodeId;
use crate::metagraph::Metagraph;
use serde::{Deserialize, Serialize};

/// Names behind the integer values of a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceVocabulary {
    /// Node types, by trace position.
    pub node_types: Vec<String>,
    /// Relation names, by trace position.
    pub edge_types: Vec<String>,
    /// Direction names; only the count matters for joint decoding.
    pub edge_directions: Vec<String>,
    /// Activity labels of event nodes.
    pub activity_labels: Vec<String>,
    /// Entity types a link can be correlated through.
    pub correlation_attributes: Vec<String>,
}

/// Add-node decision, in the index space of the node decision layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeDecision {
    Stop,
    /// 1-based metagraph node type index.
    Add(usize),
}

impl NodeDecision {
    /// Index into the `#node_types + 1` logits; `0` is stop.
    pub fn action(&self) -> usize {
        match *self {
            NodeDecision::Stop => 0,
            NodeDecision::Add(index) => index,
        }
    }
}

/// Add-edge decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeDecision {
    Add,
    Stop,
}

impl EdgeDecision {
    /// Bernoulli action value: `0` adds an edge, `1` stops.
    pub fn action(&self) -> u8 {
        match self {
            EdgeDecision::Add => 0,
            EdgeDecision::Stop => 1,
        }
    }
}

/// A learned decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Node(NodeDecision),
    Edge(EdgeDecision),
    Destination(NodeId),
}

/// A label applied to the graph without a learned distribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Annotation {
    /// Activity of the most recently added node.
    Activity(String),
    /// Relation of the most recent link.
    Relation(String),
    /// Direction of the most recent link.
    Direction(EdgeDirection),
    /// Correlation entity type of the most recent link.
    Correlation(String),
}

/// One replayable step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    Decide(Decision),
    Annotate(Annotation),
}

/// Decodes raw traces against a vocabulary and a metagraph.
#[derive(Debug, Clone)]
pub struct TraceDecoder {
    vocab: TraceVocabulary,
    /// Metagraph index for each trace node type position.
    node_index: Vec<usize>,
}

impl TraceDecoder {
    /// Create a decoder; every vocabulary node type must exist in the metagraph.
    pub fn new(vocab: TraceVocabulary, metagraph: &Metagraph) -> Result<Self> {
        let node_index = vocab
            .node_types
            .iter()
            .map(|name| {
                metagraph
                    .ntype_index(name)
                    .ok_or_else(|| Error::NodeTypeNotFound(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { vocab, node_index })
    }

    /// The vocabulary this decoder resolves names from.
    pub fn vocabulary(&self) -> &TraceVocabulary {
        &self.vocab
    }

    /// Width of one destination block of a joint action.
    pub fn joint_stride(&self) -> usize {
        self.vocab.edge_types.len() * self.vocab.edge_directions.len()
    }

    /// Unfold a trace into steps.
    pub fn decode(&self, trace: &ActionTrace) -> Result<Vec<Step>> {
        let mut steps = Vec::with_capacity(trace.len() * 2);
        let mut num_nodes = 0usize;
        let mut pending_relation: Option<String> = None;

        for (position, &action) in trace.actions.iter().enumerate() {
            let invalid = |reason: &str| Error::InvalidAction {
                kind: action.kind(),
                value: action.value(),
                position,
                reason: reason.to_string(),
            };

            match action {
                Action::AddNode(j) => {
                    let n = self.node_index.len();
                    let decision = if j == n {
                        NodeDecision::Stop
                    } else if j < n {
                        num_nodes += 1;
                        NodeDecision::Add(self.node_index[j])
                    } else {
                        return Err(invalid("node type out of range"));
                    };
                    steps.push(Step::Decide(Decision::Node(decision)));
                }
                Action::Activity(j) => {
                    if num_nodes == 0 {
                        return Err(invalid("activity before any node"));
                    }
                    let label = self
                        .vocab
                        .activity_labels
                        .get(j)
                        .ok_or_else(|| invalid("activity label out of range"))?;
                    steps.push(Step::Annotate(Annotation::Activity(label.clone())));
                }
                Action::AddEdge(j) => {
                    let e = self.vocab.edge_types.len();
                    if j == e {
                        steps.push(Step::Decide(Decision::Edge(EdgeDecision::Stop)));
                    } else if j < e {
                        pending_relation = Some(self.vocab.edge_types[j].clone());
                        steps.push(Step::Decide(Decision::Edge(EdgeDecision::Add)));
                    } else {
                        return Err(invalid("edge type out of range"));
                    }
                }
                Action::Destination(dest) => {
                    if dest + 1 >= num_nodes {
                        return Err(invalid("destination must precede the newest node"));
                    }
                    steps.push(Step::Decide(Decision::Destination(dest)));
                    if let Some(relation) = pending_relation.take() {
                        steps.push(Step::Annotate(Annotation::Relation(relation)));
                    }
                }
                Action::Direction(j) => {
                    let direction =
                        EdgeDirection::from_index(j).ok_or_else(|| invalid("unknown direction"))?;
                    steps.push(Step::Annotate(Annotation::Direction(direction)));
                }
                Action::Correlation(j) => {
                    let entity = self
                        .vocab
                        .correlation_attributes
                        .get(j)
                        .ok_or_else(|| invalid("correlation attribute out of range"))?;
                    steps.push(Step::Annotate(Annotation::Correlation(entity.clone())));
                }
                Action::Joint(j) => {
                    let stride = self.joint_stride();
                    if stride == 0 {
                        return Err(invalid("vocabulary has no edge types or directions"));
                    }
                    if num_nodes == 0 {
                        return Err(invalid("edge decision before any node"));
                    }
                    if j == stride * num_nodes {
                        steps.push(Step::Decide(Decision::Edge(EdgeDecision::Stop)));
                        continue;
                    }
                    let dest = j / stride;
                    if dest + 1 >= num_nodes {
                        return Err(invalid("destination must precede the newest node"));
                    }
                    let e = self.vocab.edge_types.len();
                    let relation = self.vocab.edge_types[j % e].clone();
                    let direction = EdgeDirection::from_index((j % stride) / e)
                        .ok_or_else(|| invalid("unknown direction"))?;

                    steps.push(Step::Decide(Decision::Edge(EdgeDecision::Add)));
                    steps.push(Step::Decide(Decision::Destination(dest)));
                    steps.push(Step::Annotate(Annotation::Relation(relation)));
                    steps.push(Step::Annotate(Annotation::Direction(direction)));
                }
            }
        }

        Ok(steps)
    }
}
