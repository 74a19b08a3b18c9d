//! Synchronous message passing over the working graph.
//!
//! Each round `t` computes, for every directed edge `u -> v`,
//!
//! ```text
//! m_uv = W_t [hv_v || hv_u || he_uv]        (2H + 1 -> 2H)
//! a_v  = sum_{u -> v} m_uv
//! hv_v = GRU_t(a_v, hv_v)
//! ```
//!
//! Aggregation is a dense `(N x E)` incidence matmul, the same way the
//! convolution layers aggregate with an adjacency matrix.

use crate::episode::WorkingGraph;
use crate::gru::GruCell;
use crate::init::{self, message_linear};
use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

/// Layers of one propagation round.
pub struct PropRound {
    message: Linear,
    gru: GruCell,
}

impl PropRound {
    fn new(node_hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let node_activation_hidden_size = 2 * node_hidden_size;
        let message = message_linear(
            2 * node_hidden_size + 1,
            node_activation_hidden_size,
            vb.pp(init::MESSAGE),
        )?;
        let gru = GruCell::new(node_activation_hidden_size, node_hidden_size, vb.pp("gru"))?;
        Ok(Self { message, gru })
    }

    /// Message layer.
    pub fn message(&self) -> &Linear {
        &self.message
    }

    /// Node update.
    pub fn gru(&self) -> &GruCell {
        &self.gru
    }
}

/// Fixed number of message passing rounds.
pub struct GraphProp {
    rounds: Vec<PropRound>,
    dtype: DType,
    device: Device,
}

impl GraphProp {
    pub fn new(num_prop_rounds: usize, node_hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let rounds = (0..num_prop_rounds)
            .map(|t| PropRound::new(node_hidden_size, vb.pp(format!("round_{t}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rounds,
            dtype: vb.dtype(),
            device: vb.device().clone(),
        })
    }

    /// Per-round layers, in application order.
    pub fn rounds(&self) -> &[PropRound] {
        &self.rounds
    }

    /// Run every round and store the new `hv` and `a` on each node.
    ///
    /// Does nothing when the graph has no edges.
    pub fn forward(&self, graph: &mut WorkingGraph) -> Result<()> {
        let num_edges = graph.num_edges();
        if num_edges == 0 || self.rounds.is_empty() {
            return Ok(());
        }
        let num_nodes = graph.num_nodes();

        let mut src = Vec::with_capacity(num_edges);
        let mut dst = Vec::with_capacity(num_edges);
        let mut he = Vec::with_capacity(num_edges);
        let mut incidence = vec![0f32; num_nodes * num_edges];
        for (e, (u, v, edge)) in graph.edges().enumerate() {
            src.push(u as u32);
            dst.push(v as u32);
            he.push(&edge.data.he);
            incidence[v * num_edges + e] = 1.0;
        }
        let src = Tensor::from_vec(src, num_edges, &self.device)?;
        let dst = Tensor::from_vec(dst, num_edges, &self.device)?;
        let he = Tensor::cat(&he, 0)?;
        let incidence = Tensor::from_vec(incidence, (num_nodes, num_edges), &self.device)?
            .to_dtype(self.dtype)?;

        let hvs: Vec<&Tensor> = graph.nodes().map(|(_, n)| &n.data.hv).collect();
        let mut hv = Tensor::cat(&hvs, 0)?;
        let mut activation =
            Tensor::zeros((num_nodes, 2 * hv.dim(1)?), self.dtype, &self.device)?;

        for round in &self.rounds {
            let hv_dst = hv.index_select(&dst, 0)?;
            let hv_src = hv.index_select(&src, 0)?;
            let messages = round
                .message
                .forward(&Tensor::cat(&[&hv_dst, &hv_src, &he], 1)?)?;
            activation = incidence.matmul(&messages)?;
            hv = round.gru.forward(&activation, &hv)?;
        }

        for (i, state) in graph.node_data_mut().enumerate() {
            state.hv = hv.narrow(0, i, 1)?;
            state.a = activation.narrow(0, i, 1)?;
        }
        tracing::debug!(
            nodes = num_nodes,
            edges = num_edges,
            rounds = self.rounds.len(),
            "propagated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{EdgeState, NodeState};
    use candle_nn::VarMap;
    use dgmg_core::{EdgeType, Metagraph};

    const H: usize = 3;

    fn values(t: &Tensor) -> Vec<f32> {
        t.flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    fn setup(rounds: usize) -> (VarMap, GraphProp, WorkingGraph) {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let prop = GraphProp::new(rounds, H, vb).unwrap();

        let mg = Metagraph::new(vec![EdgeType::new("event", ":DF", "event")]).unwrap();
        let mut g: WorkingGraph = mg.empty_graph();
        for s in [0.3f32, -1.2, 0.8] {
            let hv: Vec<f32> = (0..H).map(|i| s * (i as f32 + 1.0)).collect();
            g.add_node(
                0,
                NodeState {
                    hv: Tensor::from_vec(hv, (1, H), &device).unwrap(),
                    a: Tensor::zeros((1, 2 * H), DType::F32, &device).unwrap(),
                },
            )
            .unwrap();
        }
        (varmap, prop, g)
    }

    fn ones(device: &Device) -> EdgeState {
        EdgeState {
            he: Tensor::ones((1, 1), DType::F32, device).unwrap(),
        }
    }

    #[test]
    fn test_no_edges_is_noop() {
        let (_varmap, prop, mut g) = setup(2);
        let before: Vec<Vec<f32>> = g.nodes().map(|(_, n)| values(&n.data.hv)).collect();
        prop.forward(&mut g).unwrap();
        let after: Vec<Vec<f32>> = g.nodes().map(|(_, n)| values(&n.data.hv)).collect();
        assert_eq!(before, after);
        assert_eq!(prop.rounds().len(), 2);
    }

    #[test]
    fn test_rounds_apply_in_order() {
        let device = Device::Cpu;
        let (_varmap, prop, mut g) = setup(2);
        g.add_edge_pair(2, 0, ones(&device), ones(&device)).unwrap();

        // Manual computation over the same edge order
        let edges: Vec<(usize, usize)> = g.edges().map(|(u, v, _)| (u, v)).collect();
        let mut hv: Vec<Tensor> = g.nodes().map(|(_, n)| n.data.hv.clone()).collect();
        let mut act = vec![Tensor::zeros((1, 2 * H), DType::F32, &device).unwrap(); 3];
        for round in prop.rounds() {
            let mut next_act = vec![Tensor::zeros((1, 2 * H), DType::F32, &device).unwrap(); 3];
            for &(u, v) in &edges {
                let input = Tensor::cat(
                    &[&hv[v], &hv[u], &Tensor::ones((1, 1), DType::F32, &device).unwrap()],
                    1,
                )
                .unwrap();
                let m = round.message().forward(&input).unwrap();
                next_act[v] = (&next_act[v] + m).unwrap();
            }
            hv = (0..3)
                .map(|i| round.gru().forward(&next_act[i], &hv[i]).unwrap())
                .collect();
            act = next_act;
        }

        prop.forward(&mut g).unwrap();
        for (i, (_, node)) in g.nodes().enumerate() {
            for (x, y) in values(&node.data.hv).iter().zip(values(&hv[i])) {
                assert!((x - y).abs() < 1e-5);
            }
            for (x, y) in values(&node.data.a).iter().zip(values(&act[i])) {
                assert!((x - y).abs() < 1e-5);
            }
        }
        // Node 1 has no incoming edges: zero activation
        assert!(values(&g.node(1).unwrap().data.a).iter().all(|&v| v == 0.0));
    }
}
