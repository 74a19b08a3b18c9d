//! The DGMG generator: decision modules driven by a phase state machine.
//!
//! ```text
//!          stop
//!   Node ───────▶ Done
//!    ▲  │ add
//!    │  ▼
//!    Edge ◀──────┐
//!    │ add       │
//!    ▼           │
//!   Destination ─┘
//! ```
//!
//! In training the decisions come from a decoded trace and their
//! log-probabilities are accumulated; in inference they are sampled.

use crate::decision::{AddEdge, AddNode, ChooseDestAndUpdate};
use crate::embed::GraphEmbed;
use crate::episode::{Episode, LogProbs, WorkingGraph};
use crate::error::{Error, Result};
use crate::prop::GraphProp;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use dgmg_core::config::DgmgConfig;
use dgmg_core::decode::{Annotation, Decision, Step, TraceDecoder};
use dgmg_core::{ActionTrace, Metagraph};

/// Position in the generation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ChoosingNode,
    ChoosingEdge,
    ChoosingDestination,
    Done,
}

/// Outcome of replaying one trace.
#[derive(Debug)]
pub struct Rollout {
    /// The graph the trace built.
    pub graph: WorkingGraph,
    /// `log p(trace)` as a scalar.
    pub log_prob: Tensor,
    /// The individual terms behind `log_prob`, per decision module.
    pub terms: LogProbs,
}

/// Outcome of one sampling run.
#[derive(Debug)]
pub struct Sample {
    /// The generated graph.
    pub graph: WorkingGraph,
    /// Decisions scored and sampled, including the final stop.
    pub decisions: usize,
}

/// Deep generative model of graphs.
pub struct Dgmg {
    metagraph: Metagraph,
    decoder: TraceDecoder,
    graph_embed: GraphEmbed,
    graph_prop: GraphProp,
    add_node_agent: AddNode,
    add_edge_agent: AddEdge,
    choose_dest_agent: ChooseDestAndUpdate,
    dtype: DType,
    device: Device,
}

impl Dgmg {
    /// Build the model for a configuration.
    pub fn new(config: &DgmgConfig, vb: VarBuilder) -> Result<Self> {
        let metagraph = config.metagraph()?;
        let decoder = TraceDecoder::new(config.trace_vocabulary(), &metagraph)?;
        Self::with_decoder(metagraph, decoder, config, vb)
    }

    /// Build the model over an explicit metagraph and trace decoder.
    pub fn with_decoder(
        metagraph: Metagraph,
        decoder: TraceDecoder,
        config: &DgmgConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        let h = config.node_hidden_size;
        let graph_embed = GraphEmbed::new(metagraph.nodes(), h, vb.pp("graph_embed"))?;
        let graph_prop = GraphProp::new(config.num_propagation_rounds, h, vb.pp("graph_prop"))?;
        let add_node_agent =
            AddNode::new(metagraph.num_node_types(), h, vb.pp("add_node_agent"))?;
        let add_edge_agent = AddEdge::new(h, vb.pp("add_edge_agent"))?;
        let choose_dest_agent = ChooseDestAndUpdate::new(h, vb.pp("choose_dest_agent"))?;
        Ok(Self {
            metagraph,
            decoder,
            graph_embed,
            graph_prop,
            add_node_agent,
            add_edge_agent,
            choose_dest_agent,
            dtype: vb.dtype(),
            device: vb.device().clone(),
        })
    }

    pub fn metagraph(&self) -> &Metagraph {
        &self.metagraph
    }

    pub fn decoder(&self) -> &TraceDecoder {
        &self.decoder
    }

    /// Decode and replay a raw trace.
    pub fn forward_train(&self, trace: &ActionTrace) -> Result<Rollout> {
        let steps = self.decoder.decode(trace)?;
        self.replay(&steps)
    }

    /// Replay decoded steps under teacher forcing.
    pub fn replay(&self, steps: &[Step]) -> Result<Rollout> {
        let mut episode = Episode::forced(self.metagraph.empty_graph(), steps);
        let mut phase = Phase::ChoosingNode;

        while phase != Phase::Done {
            phase = match phase {
                Phase::ChoosingNode => {
                    let action = match self.next_decision(&mut episode, "node decision")? {
                        Decision::Node(d) => d.action(),
                        other => return Err(unexpected(&episode, "node decision", other)),
                    };
                    let stop = self
                        .add_node_agent
                        .forward(&mut episode, &self.graph_embed, Some(action))?;
                    if stop {
                        Phase::Done
                    } else {
                        Phase::ChoosingEdge
                    }
                }
                Phase::ChoosingEdge => {
                    let action = match self.next_decision(&mut episode, "edge decision")? {
                        Decision::Edge(d) => d.action(),
                        other => return Err(unexpected(&episode, "edge decision", other)),
                    };
                    let to_add = self
                        .add_edge_agent
                        .forward(&mut episode, &self.graph_embed, Some(action))?;
                    if to_add {
                        Phase::ChoosingDestination
                    } else {
                        Phase::ChoosingNode
                    }
                }
                Phase::ChoosingDestination => {
                    let dest = match self.next_decision(&mut episode, "destination")? {
                        Decision::Destination(dest) => dest,
                        other => return Err(unexpected(&episode, "destination", other)),
                    };
                    self.choose_destination(&mut episode, Some(dest))?;
                    Phase::ChoosingEdge
                }
                Phase::Done => Phase::Done,
            };
        }

        let unused = episode.remaining_steps();
        if unused > 0 {
            tracing::warn!(unused, consumed = episode.step_count, "trace has unused trailing steps");
        }

        let log_prob = episode.log_probs.total(self.dtype, &self.device)?;
        Ok(Rollout {
            graph: episode.graph,
            log_prob,
            terms: episode.log_probs,
        })
    }

    /// Sample a new graph of at most `v_max` nodes.
    ///
    /// Each new node gets at most `num_nodes - 1` edge trials.
    pub fn forward_inference(&self, v_max: usize, seed: u64) -> Result<WorkingGraph> {
        Ok(self.sample(v_max, seed)?.graph)
    }

    /// Like [`forward_inference`](Self::forward_inference), also reporting
    /// how many decisions the run took.
    pub fn sample(&self, v_max: usize, seed: u64) -> Result<Sample> {
        let mut episode =
            Episode::sampled(self.metagraph.empty_graph(), seed).with_node_limit(v_max);
        let mut phase = Phase::ChoosingNode;
        let mut num_trials = 0usize;

        while phase != Phase::Done {
            phase = match phase {
                Phase::ChoosingNode => {
                    num_trials = 0;
                    let stop = self
                        .add_node_agent
                        .forward(&mut episode, &self.graph_embed, None)?;
                    if stop {
                        Phase::Done
                    } else {
                        Phase::ChoosingEdge
                    }
                }
                Phase::ChoosingEdge => {
                    let to_add = self
                        .add_edge_agent
                        .forward(&mut episode, &self.graph_embed, None)?;
                    let max_trials = episode.graph.num_nodes().saturating_sub(1);
                    if to_add && num_trials < max_trials {
                        Phase::ChoosingDestination
                    } else {
                        Phase::ChoosingNode
                    }
                }
                Phase::ChoosingDestination => {
                    self.choose_destination(&mut episode, None)?;
                    num_trials += 1;
                    Phase::ChoosingEdge
                }
                Phase::Done => Phase::Done,
            };
        }

        tracing::debug!(
            nodes = episode.graph.num_nodes(),
            links = episode.graph.num_links(),
            decisions = episode.decisions,
            seed,
            "sampled graph"
        );
        Ok(Sample {
            graph: episode.graph,
            decisions: episode.decisions,
        })
    }

    fn choose_destination(&self, episode: &mut Episode<'_>, dest: Option<usize>) -> Result<()> {
        let src = episode
            .graph
            .last_node()
            .ok_or(Error::EmptyGraph("choose destination"))?;
        let dest = self
            .choose_dest_agent
            .forward(episode, &self.graph_prop, dest)?;
        episode.last_link = Some((src, dest));
        Ok(())
    }

    /// Consume steps up to the next decision, applying annotations on the way.
    fn next_decision(&self, episode: &mut Episode<'_>, expected: &'static str) -> Result<Decision> {
        loop {
            match episode.next_step(expected)? {
                Step::Decide(decision) => return Ok(*decision),
                Step::Annotate(annotation) => self.annotate(episode, annotation),
            }
        }
    }

    fn annotate(&self, episode: &mut Episode<'_>, annotation: &Annotation) {
        if let Annotation::Activity(label) = annotation {
            match episode.graph.last_node().and_then(|id| episode.graph.node_mut(id)) {
                Some(node) => node.activity = Some(label.clone()),
                None => tracing::warn!(%label, "activity before any node"),
            }
            return;
        }

        let Some((src, dest)) = episode.last_link else {
            tracing::warn!(?annotation, "edge label before any edge");
            return;
        };

        if let Annotation::Relation(relation) = annotation {
            self.check_relation(&episode.graph, src, dest, relation);
        }

        let Some(link) = episode.graph.link_mut(src, dest) else {
            tracing::warn!(src, dest, ?annotation, "no link to label");
            return;
        };
        match annotation {
            Annotation::Relation(relation) => link.relation = Some(relation.clone()),
            Annotation::Direction(direction) => link.direction = Some(*direction),
            Annotation::Correlation(entity) => link.correlations.push(entity.clone()),
            Annotation::Activity(_) => {}
        }
    }

    /// Warn when a labelled link matches no declared canonical edge type.
    fn check_relation(&self, graph: &WorkingGraph, src: usize, dest: usize, relation: &str) {
        let (Some(a), Some(b)) = (graph.node_type(src), graph.node_type(dest)) else {
            return;
        };
        if !self.metagraph.has_canonical_etype(a, relation, b)
            && !self.metagraph.has_canonical_etype(b, relation, a)
        {
            tracing::warn!(
                src = %a,
                relation,
                dst = %b,
                "link does not match a declared canonical edge type"
            );
        }
    }
}

fn unexpected(episode: &Episode<'_>, expected: &'static str, found: Decision) -> Error {
    Error::UnexpectedStep {
        step: episode.step_count.saturating_sub(1),
        expected,
        found: format!("{found:?}"),
    }
}
