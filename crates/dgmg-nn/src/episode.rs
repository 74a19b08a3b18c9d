//! Per-episode generation state.
//!
//! An [`Episode`] is created at the start of one forward call and dropped at
//! its end. It owns the working graph, the position in the decoded trace, the
//! recorded log-probabilities, and (in sampled mode) the random source.

use crate::error::{Error, Result};
use candle_core::{DType, Device, Tensor};
use dgmg_core::decode::Step;
use dgmg_core::{NodeId, TypedGraph};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Tensor state of a node.
#[derive(Debug, Clone)]
pub struct NodeState {
    /// Hidden representation (1 x H).
    pub hv: Tensor,
    /// Last propagation activation (1 x 2H).
    pub a: Tensor,
}

/// Tensor state of an edge.
#[derive(Debug, Clone)]
pub struct EdgeState {
    /// Edge representation (1 x 1).
    pub he: Tensor,
}

/// The graph a generation episode grows.
pub type WorkingGraph = TypedGraph<NodeState, EdgeState>;

/// Log-probabilities recorded per decision module.
#[derive(Debug, Clone, Default)]
pub struct LogProbs {
    pub add_node: Vec<Tensor>,
    pub add_edge: Vec<Tensor>,
    pub choose_dest: Vec<Tensor>,
}

impl LogProbs {
    /// Number of recorded terms.
    pub fn len(&self) -> usize {
        self.add_node.len() + self.add_edge.len() + self.choose_dest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of every recorded term as a scalar; a `dtype` zero when nothing
    /// was recorded.
    pub fn total(&self, dtype: DType, device: &Device) -> Result<Tensor> {
        let terms: Vec<&Tensor> = self
            .add_node
            .iter()
            .chain(&self.add_edge)
            .chain(&self.choose_dest)
            .collect();
        if terms.is_empty() {
            return Ok(Tensor::zeros((), dtype, device)?);
        }
        Ok(Tensor::cat(&terms, 0)?.sum_all()?)
    }
}

/// Whether decisions are replayed or sampled.
enum Mode<'a> {
    /// Replay a decoded trace.
    Forced(&'a [Step]),
    /// Sample from the model.
    Sampled(ChaCha8Rng),
}

/// State threaded through every decision of one generation run.
pub struct Episode<'a> {
    pub graph: WorkingGraph,
    /// Index of the next trace step to consume.
    pub step_count: usize,
    /// Decisions scored so far, in either mode.
    pub decisions: usize,
    pub log_probs: LogProbs,
    /// Node cap applied by the add-node decision.
    pub node_limit: Option<usize>,
    /// `(src, dest)` of the most recent destination choice.
    pub last_link: Option<(NodeId, NodeId)>,
    mode: Mode<'a>,
}

impl<'a> Episode<'a> {
    /// Episode replaying `steps` from the start.
    pub fn forced(graph: WorkingGraph, steps: &'a [Step]) -> Self {
        Self {
            graph,
            step_count: 0,
            decisions: 0,
            log_probs: LogProbs::default(),
            node_limit: None,
            last_link: None,
            mode: Mode::Forced(steps),
        }
    }

    /// Episode sampling every decision from a generator seeded with `seed`.
    pub fn sampled(graph: WorkingGraph, seed: u64) -> Self {
        Self {
            graph,
            step_count: 0,
            decisions: 0,
            log_probs: LogProbs::default(),
            node_limit: None,
            last_link: None,
            mode: Mode::Sampled(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Cap the number of nodes.
    pub fn with_node_limit(mut self, limit: usize) -> Self {
        self.node_limit = Some(limit);
        self
    }

    pub fn is_training(&self) -> bool {
        matches!(self.mode, Mode::Forced(_))
    }

    /// Next trace step without consuming it.
    pub fn peek_step(&self) -> Option<&'a Step> {
        match self.mode {
            Mode::Forced(steps) => steps.get(self.step_count),
            Mode::Sampled(_) => None,
        }
    }

    /// Consume the next trace step.
    pub fn next_step(&mut self, expected: &'static str) -> Result<&'a Step> {
        let step = self.peek_step().ok_or(Error::TraceExhausted {
            step: self.step_count,
            expected,
        })?;
        self.step_count += 1;
        Ok(step)
    }

    /// Steps of the trace that were never consumed.
    pub fn remaining_steps(&self) -> usize {
        match self.mode {
            Mode::Forced(steps) => steps.len().saturating_sub(self.step_count),
            Mode::Sampled(_) => 0,
        }
    }

    /// The random source of a sampled episode.
    pub fn rng(&mut self) -> Result<&mut ChaCha8Rng> {
        match &mut self.mode {
            Mode::Sampled(rng) => Ok(rng),
            Mode::Forced(_) => Err(Error::NoSampler),
        }
    }

    /// Whether the graph reached the node cap.
    pub fn at_node_limit(&self) -> bool {
        self.node_limit
            .is_some_and(|limit| self.graph.num_nodes() >= limit)
    }
}
