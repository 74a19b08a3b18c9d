//! The three learned decisions of the generator.
//!
//! Each module scores one decision from the current graph. With an action
//! supplied (teacher forcing) it records the action's log-probability on the
//! episode; without one it samples from the episode's random source.

use crate::embed::GraphEmbed;
use crate::episode::{EdgeState, Episode, NodeState};
use crate::error::{Error, Result};
use crate::init::{self, linear};
use crate::prob::{bernoulli_action_log_prob, categorical_probs, multinomial_action_log_prob};
use crate::prop::GraphProp;
use candle_core::{DType, Device, Tensor};
use candle_nn::{embedding, ops, Embedding, Linear, Module, VarBuilder};
use dgmg_core::NodeId;
use rand::distributions::{Bernoulli, Distribution, WeightedIndex};

fn sample_categorical(episode: &mut Episode<'_>, logits: &Tensor) -> Result<usize> {
    let probs = categorical_probs(logits)?;
    let dist = WeightedIndex::new(&probs).map_err(|e| Error::Sampling(e.to_string()))?;
    Ok(dist.sample(episode.rng()?))
}

/// Decide whether to add a node and of which type.
///
/// Logits are `(1, #node_types + 1)`; index `0` stops, index `k` adds a node
/// of the `k`-th (1-based) metagraph node type.
pub struct AddNode {
    add_node: Linear,
    node_type_embed: Embedding,
    initialize_hv: Linear,
    num_node_types: usize,
    node_hidden_size: usize,
    dtype: DType,
    device: Device,
}

impl AddNode {
    pub fn new(num_node_types: usize, node_hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let graph_hidden_size = 2 * node_hidden_size;
        let add_node = linear(graph_hidden_size, num_node_types + 1, vb.pp("add_node"))?;
        let node_type_embed = embedding(num_node_types, node_hidden_size, vb.pp(init::NODE_TYPE_EMBED))?;
        let initialize_hv = linear(
            node_hidden_size + graph_hidden_size,
            node_hidden_size,
            vb.pp("initialize_hv"),
        )?;
        Ok(Self {
            add_node,
            node_type_embed,
            initialize_hv,
            num_node_types,
            node_hidden_size,
            dtype: vb.dtype(),
            device: vb.device().clone(),
        })
    }

    /// Returns `true` when the decision is to stop.
    ///
    /// A decision to add is treated as stop once the episode's node limit is
    /// reached.
    pub fn forward(
        &self,
        episode: &mut Episode<'_>,
        graph_embed: &GraphEmbed,
        action: Option<usize>,
    ) -> Result<bool> {
        let embed = graph_embed.forward(&episode.graph)?;
        let logits = self.add_node.forward(&embed)?;
        episode.decisions += 1;

        let action = match action {
            Some(action) => {
                if action > self.num_node_types {
                    return Err(Error::InvalidNodeAction {
                        action,
                        num_actions: self.num_node_types + 1,
                    });
                }
                let log_prob = multinomial_action_log_prob(&logits, action)?;
                episode.log_probs.add_node.push(log_prob);
                action
            }
            None => sample_categorical(episode, &logits)?,
        };

        if action == 0 {
            return Ok(true);
        }
        if episode.at_node_limit() {
            tracing::debug!(nodes = episode.graph.num_nodes(), "node limit reached");
            return Ok(true);
        }

        let type_pos = action - 1;
        let type_index = Tensor::new(&[type_pos as u32], &self.device)?;
        let type_embed = self.node_type_embed.forward(&type_index)?;
        let hv = self
            .initialize_hv
            .forward(&Tensor::cat(&[&type_embed, &embed], 1)?)?;
        let a = Tensor::zeros((1, 2 * self.node_hidden_size), self.dtype, &self.device)?;
        let id = episode.graph.add_node(type_pos, NodeState { hv, a })?;
        tracing::debug!(node = id, type_pos, "added node");
        Ok(false)
    }
}

/// Decide whether the newest node gets another edge.
///
/// Action `0` adds an edge and `1` stops.
pub struct AddEdge {
    add_edge: Linear,
}

impl AddEdge {
    pub fn new(node_hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let graph_hidden_size = 2 * node_hidden_size;
        let add_edge = linear(graph_hidden_size + node_hidden_size, 1, vb.pp("add_edge"))?;
        Ok(Self { add_edge })
    }

    /// Returns `true` when the decision is to add an edge.
    pub fn forward(
        &self,
        episode: &mut Episode<'_>,
        graph_embed: &GraphEmbed,
        action: Option<u8>,
    ) -> Result<bool> {
        let src = episode.graph.last_node().ok_or(Error::EmptyGraph("add edge"))?;
        let embed = graph_embed.forward(&episode.graph)?;
        let hv = episode
            .graph
            .node(src)
            .map(|n| n.data.hv.clone())
            .ok_or(Error::EmptyGraph("add edge"))?;
        let logit = self.add_edge.forward(&Tensor::cat(&[&embed, &hv], 1)?)?;
        episode.decisions += 1;

        let action = match action {
            Some(action) => {
                let log_prob = bernoulli_action_log_prob(&logit, action)?;
                episode.log_probs.add_edge.push(log_prob);
                action
            }
            None => {
                let p = ops::sigmoid(&logit)?
                    .to_dtype(DType::F32)?
                    .flatten_all()?
                    .to_vec1::<f32>()?[0];
                let dist = Bernoulli::new(f64::from(p)).map_err(|e| Error::Sampling(e.to_string()))?;
                u8::from(dist.sample(episode.rng()?))
            }
        };
        Ok(action == 0)
    }
}

/// Choose the destination of a new edge from the newest node, insert the
/// edge pair if it is new, and propagate.
pub struct ChooseDestAndUpdate {
    choose_dest: Linear,
    dtype: DType,
    device: Device,
}

impl ChooseDestAndUpdate {
    pub fn new(node_hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let choose_dest = linear(2 * node_hidden_size, 1, vb.pp("choose_dest"))?;
        Ok(Self {
            choose_dest,
            dtype: vb.dtype(),
            device: vb.device().clone(),
        })
    }

    /// Returns the chosen destination. Candidates are every node older than
    /// the newest one.
    pub fn forward(
        &self,
        episode: &mut Episode<'_>,
        graph_prop: &GraphProp,
        dest: Option<NodeId>,
    ) -> Result<NodeId> {
        let src = episode.graph.last_node().ok_or(Error::EmptyGraph("choose destination"))?;
        let num_candidates = src;
        if num_candidates == 0 {
            return Err(Error::NoCandidates { src });
        }

        let hvs: Vec<&Tensor> = episode
            .graph
            .nodes()
            .take(src + 1)
            .map(|(_, n)| &n.data.hv)
            .collect();
        let possible = Tensor::cat(&hvs[..src], 0)?;
        let src_hv = hvs[src].repeat((num_candidates, 1))?;
        let scores = self
            .choose_dest
            .forward(&Tensor::cat(&[&possible, &src_hv], 1)?)?
            .reshape((1, num_candidates))?;
        episode.decisions += 1;

        let dest = match dest {
            Some(dest) => {
                if dest >= num_candidates {
                    return Err(Error::InvalidDestination {
                        dest,
                        num_candidates,
                    });
                }
                // A single candidate is certain; nothing to learn from it.
                if num_candidates > 1 {
                    let log_prob = multinomial_action_log_prob(&scores, dest)?;
                    episode.log_probs.choose_dest.push(log_prob);
                }
                dest
            }
            None => sample_categorical(episode, &scores)?,
        };

        if !episode.graph.has_edge_between(src, dest) {
            let he = Tensor::ones((1, 1), self.dtype, &self.device)?;
            episode.graph.add_edge_pair(
                src,
                dest,
                EdgeState { he: he.clone() },
                EdgeState { he },
            )?;
            graph_prop.forward(&mut episode.graph)?;
            tracing::debug!(src, dest, "added edge pair");
        }
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;
    use dgmg_core::{EdgeType, Metagraph};
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const H: usize = 4;

    struct Fixture {
        _varmap: VarMap,
        metagraph: Metagraph,
        embed: GraphEmbed,
        prop: GraphProp,
        add_node: AddNode,
        add_edge: AddEdge,
        choose_dest: ChooseDestAndUpdate,
    }

    fn fixture() -> Fixture {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let metagraph = Metagraph::new(vec![
            EdgeType::new("event", ":DF", "event"),
            EdgeType::new("event", ":CORR", "offer"),
        ])
        .unwrap();
        Fixture {
            embed: GraphEmbed::new(metagraph.nodes(), H, vb.pp("embed")).unwrap(),
            prop: GraphProp::new(2, H, vb.pp("prop")).unwrap(),
            add_node: AddNode::new(2, H, vb.pp("node")).unwrap(),
            add_edge: AddEdge::new(H, vb.pp("edge")).unwrap(),
            choose_dest: ChooseDestAndUpdate::new(H, vb.pp("dest")).unwrap(),
            metagraph,
            _varmap: varmap,
        }
    }

    #[test]
    fn test_forced_add_node_records_and_inserts() {
        let f = fixture();
        let mut ep = Episode::forced(f.metagraph.empty_graph(), &[]);

        assert!(!f.add_node.forward(&mut ep, &f.embed, Some(2)).unwrap());
        assert_eq!(ep.graph.num_nodes(), 1);
        assert_eq!(ep.graph.node(0).unwrap().type_pos, 1);
        assert_eq!(ep.graph.node(0).unwrap().data.hv.dims(), &[1, H]);
        assert_eq!(ep.graph.node(0).unwrap().data.a.dims(), &[1, 2 * H]);

        assert!(f.add_node.forward(&mut ep, &f.embed, Some(0)).unwrap());
        assert_eq!(ep.graph.num_nodes(), 1);
        assert_eq!(ep.log_probs.add_node.len(), 2);

        assert!(matches!(
            f.add_node.forward(&mut ep, &f.embed, Some(3)),
            Err(Error::InvalidNodeAction { action: 3, num_actions: 3 })
        ));
    }

    #[test]
    fn test_node_limit_still_samples_first_decision() {
        let f = fixture();
        let seed = 5;
        let mut ep = Episode::sampled(f.metagraph.empty_graph(), seed).with_node_limit(0);

        assert!(f.add_node.forward(&mut ep, &f.embed, None).unwrap());
        assert_eq!(ep.graph.num_nodes(), 0);
        assert_eq!(ep.decisions, 1);

        // The decision drew from the random source before the cap applied
        let mut fresh = ChaCha8Rng::seed_from_u64(seed);
        assert_ne!(ep.rng().unwrap().next_u64(), fresh.next_u64());
    }

    #[test]
    fn test_add_edge_inverted_convention() {
        let f = fixture();
        let mut ep = Episode::forced(f.metagraph.empty_graph(), &[]);
        assert!(matches!(
            f.add_edge.forward(&mut ep, &f.embed, Some(0)),
            Err(Error::EmptyGraph(_))
        ));

        f.add_node.forward(&mut ep, &f.embed, Some(1)).unwrap();
        assert!(f.add_edge.forward(&mut ep, &f.embed, Some(0)).unwrap());
        assert!(!f.add_edge.forward(&mut ep, &f.embed, Some(1)).unwrap());
        assert_eq!(ep.log_probs.add_edge.len(), 2);
    }

    #[test]
    fn test_choose_dest_single_candidate_not_recorded() {
        let f = fixture();
        let mut ep = Episode::forced(f.metagraph.empty_graph(), &[]);
        f.add_node.forward(&mut ep, &f.embed, Some(1)).unwrap();
        assert!(matches!(
            f.choose_dest.forward(&mut ep, &f.prop, Some(0)),
            Err(Error::NoCandidates { src: 0 })
        ));

        f.add_node.forward(&mut ep, &f.embed, Some(2)).unwrap();
        let before = ep.graph.node(0).unwrap().data.hv.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(f.choose_dest.forward(&mut ep, &f.prop, Some(0)).unwrap(), 0);
        assert!(ep.log_probs.choose_dest.is_empty());
        assert!(ep.graph.has_edge_between(1, 0));
        assert!(ep.graph.has_edge_between(0, 1));

        // Propagation ran and changed the representation
        let after = ep.graph.node(0).unwrap().data.hv.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_ne!(before, after);

        // A repeated destination neither inserts nor propagates
        f.choose_dest.forward(&mut ep, &f.prop, Some(0)).unwrap();
        assert_eq!(ep.graph.num_edges(), 2);
    }

    #[test]
    fn test_choose_dest_records_with_several_candidates() {
        let f = fixture();
        let mut ep = Episode::forced(f.metagraph.empty_graph(), &[]);
        for t in [1, 1, 2] {
            f.add_node.forward(&mut ep, &f.embed, Some(t)).unwrap();
        }
        assert!(matches!(
            f.choose_dest.forward(&mut ep, &f.prop, Some(2)),
            Err(Error::InvalidDestination { dest: 2, num_candidates: 2 })
        ));
        f.choose_dest.forward(&mut ep, &f.prop, Some(1)).unwrap();
        assert_eq!(ep.log_probs.choose_dest.len(), 1);
        let lp = ep.log_probs.total(DType::F32, &Device::Cpu).unwrap().to_scalar::<f32>().unwrap();
        assert!(lp.is_finite() && lp < 0.0);
    }

    #[test]
    fn test_sampled_decisions_are_seeded() {
        let f = fixture();
        let run = |seed: u64| {
            let mut ep = Episode::sampled(f.metagraph.empty_graph(), seed);
            let mut stops = Vec::new();
            for _ in 0..5 {
                stops.push(f.add_node.forward(&mut ep, &f.embed, None).unwrap());
            }
            (stops, ep.graph.num_nodes(), ep.log_probs.len())
        };
        let (a, n, recorded) = run(7);
        assert_eq!(run(7).0, a);
        assert_eq!(recorded, 0);
        assert_eq!(n, a.iter().filter(|stop| !**stop).count());
    }
}
