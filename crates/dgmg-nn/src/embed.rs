//! Gated per-type readout of the working graph.
//!
//! ```text
//! h_G = sum_{type t} sum_{v of type t} sigmoid(g_t(hv)) * f_t(hv)
//! ```
//!
//! `g_t: H -> 1` is the gate and `f_t: H -> 2H` the projector of node type
//! `t`. Both sums are commutative, so the readout does not depend on node
//! insertion order.

use crate::episode::WorkingGraph;
use crate::init::linear;
use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{ops, Linear, Module, VarBuilder};
use dgmg_core::NodeType;

/// Readout from the working graph to a `(1, 2H)` embedding.
pub struct GraphEmbed {
    node_hidden_size: usize,
    /// Gate per node type position.
    gates: Vec<Linear>,
    /// Projector per node type position.
    projectors: Vec<Linear>,
    dtype: DType,
    device: Device,
}

impl GraphEmbed {
    /// Build one gate/projector pair per declared node type.
    pub fn new(node_types: &[NodeType], node_hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let graph_hidden_size = 2 * node_hidden_size;
        let mut gates = Vec::with_capacity(node_types.len());
        let mut projectors = Vec::with_capacity(node_types.len());
        for ntype in node_types {
            gates.push(linear(
                node_hidden_size,
                1,
                vb.pp("node_gating").pp(ntype.as_str()),
            )?);
            projectors.push(linear(
                node_hidden_size,
                graph_hidden_size,
                vb.pp("node_to_graph").pp(ntype.as_str()),
            )?);
        }
        Ok(Self {
            node_hidden_size,
            gates,
            projectors,
            dtype: vb.dtype(),
            device: vb.device().clone(),
        })
    }

    /// Embedding width (`2H`).
    pub fn graph_hidden_size(&self) -> usize {
        2 * self.node_hidden_size
    }

    /// Graph embedding (1 x 2H); zeros for a graph without nodes.
    pub fn forward(&self, graph: &WorkingGraph) -> Result<Tensor> {
        let mut embed = Tensor::zeros((1, self.graph_hidden_size()), self.dtype, &self.device)?;
        if graph.num_nodes() == 0 {
            return Ok(embed);
        }

        for (pos, (gate, projector)) in self.gates.iter().zip(&self.projectors).enumerate() {
            if graph.num_nodes_of(pos) == 0 {
                continue;
            }
            let hvs: Vec<&Tensor> = graph.nodes_of_type(pos).map(|(_, n)| &n.data.hv).collect();
            let hv = Tensor::cat(&hvs, 0)?;

            let weight = ops::sigmoid(&gate.forward(&hv)?)?;
            let projected = projector.forward(&hv)?;
            let pooled = weight.broadcast_mul(&projected)?.sum_keepdim(0)?;
            embed = (embed + pooled)?;
        }
        Ok(embed)
    }
}
