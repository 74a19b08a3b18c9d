//! Log-space probabilities of decisions.
//!
//! Everything here works on logits and never materialises a probability
//! before taking its log, so saturated predictions stay finite.

use candle_core::{DType, IndexOp, Result, Tensor, D};
use candle_nn::ops;

/// Stable `log(sigmoid(x))`.
///
/// ```text
/// log_sigmoid(x) = min(x, 0) - ln(1 + e^{-|x|})
/// ```
pub fn log_sigmoid(x: &Tensor) -> Result<Tensor> {
    let zeros = x.zeros_like()?;
    let softplus = x.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    x.minimum(&zeros)? - softplus
}

/// Log-probability of a Bernoulli edge decision.
///
/// Action `0` means "add an edge" and scores `log_sigmoid(-logit)`; any other
/// action scores `log_sigmoid(logit)`.
pub fn bernoulli_action_log_prob(logit: &Tensor, action: u8) -> Result<Tensor> {
    if action == 0 {
        log_sigmoid(&logit.neg()?)
    } else {
        log_sigmoid(logit)
    }
}

/// Log-probability of `action` under the categorical defined by a
/// `(1, K)` row of logits. Returns a `(1, 1)` tensor.
pub fn multinomial_action_log_prob(logits: &Tensor, action: usize) -> Result<Tensor> {
    let log_probs = ops::log_softmax(logits, D::Minus1)?;
    log_probs.i((.., action..action + 1))
}

/// Plain probabilities of a `(1, K)` logit row, for sampling.
pub fn categorical_probs(logits: &Tensor) -> Result<Vec<f32>> {
    ops::softmax(logits, D::Minus1)?
        .to_dtype(DType::F32)?
        .flatten_all()?
        .to_vec1::<f32>()
}
