//! Gated recurrent update used by propagation rounds.

use crate::init::linear;
use candle_core::{Result, Tensor};
use candle_nn::{ops, Linear, Module, VarBuilder};

/// A GRU cell over a batch of rows.
///
/// ```text
/// r  = sigmoid(W_ir x + W_hr h)
/// z  = sigmoid(W_iz x + W_hz h)
/// n  = tanh(W_in x + r * (W_hn h))
/// h' = (1 - z) * n + z * h
/// ```
///
/// Gate weights are stored stacked (`r`, `z`, `n`) in two linear layers,
/// one over the input and one over the hidden state.
pub struct GruCell {
    ih: Linear,
    hh: Linear,
    hidden_size: usize,
}

impl GruCell {
    /// Create a cell mapping `input_size` inputs onto a `hidden_size` state.
    pub fn new(input_size: usize, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let ih = linear(input_size, 3 * hidden_size, vb.pp("ih"))?;
        let hh = linear(hidden_size, 3 * hidden_size, vb.pp("hh"))?;
        Ok(Self {
            ih,
            hh,
            hidden_size,
        })
    }

    /// Hidden state width.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// One update step.
    ///
    /// # Arguments
    /// - `input`: (N x input_size)
    /// - `hidden`: (N x hidden_size)
    ///
    /// # Returns
    /// - New hidden state (N x hidden_size)
    pub fn forward(&self, input: &Tensor, hidden: &Tensor) -> Result<Tensor> {
        let h = self.hidden_size;
        let gi = self.ih.forward(input)?;
        let gh = self.hh.forward(hidden)?;

        let r = ops::sigmoid(&(gi.narrow(1, 0, h)? + gh.narrow(1, 0, h)?)?)?;
        let z = ops::sigmoid(&(gi.narrow(1, h, h)? + gh.narrow(1, h, h)?)?)?;
        let n = (gi.narrow(1, 2 * h, h)? + (r * gh.narrow(1, 2 * h, h)?)?)?.tanh()?;

        // (1 - z) * n + z * h
        let keep = z.affine(-1.0, 1.0)?;
        (keep * n)? + (z * hidden)?
    }
}
