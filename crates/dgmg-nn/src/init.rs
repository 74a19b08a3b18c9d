//! Parameter initialisation.
//!
//! Linear layers start from xavier-normal weights and zero biases. The message
//! layers of propagation rounds start small (normal, std 0.1, bias included),
//! and node type embeddings keep a unit normal.
//!
//! Layers pick their scheme at construction through [`linear`] and
//! [`message_linear`]. [`reset_parameters`] redraws every variable of a
//! [`VarMap`] with the same schemes from a seeded generator, so two models
//! reset with the same seed are identical.

use candle_core::{Error, Result, Tensor, Var};
use candle_nn::{Init, Linear, VarBuilder, VarMap};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Path segment of propagation message layers.
pub const MESSAGE: &str = "message";

/// Path segment of the node type embedding.
pub const NODE_TYPE_EMBED: &str = "node_type_embed";

/// Standard deviation of message weights and biases.
pub const MESSAGE_STD: f64 = 0.1;

/// Xavier-normal standard deviation of a `fan_in -> fan_out` map.
pub fn xavier_std(fan_in: usize, fan_out: usize) -> f64 {
    (2.0 / (fan_in + fan_out) as f64).sqrt()
}

/// Linear layer with xavier-normal weights and a zero bias.
pub fn linear(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Linear> {
    let weight = vb.get_with_hints(
        (out_dim, in_dim),
        "weight",
        Init::Randn {
            mean: 0.0,
            stdev: xavier_std(in_dim, out_dim),
        },
    )?;
    let bias = vb.get_with_hints(out_dim, "bias", Init::Const(0.0))?;
    Ok(Linear::new(weight, Some(bias)))
}

/// Linear layer of a message function, weights and bias drawn with
/// [`MESSAGE_STD`]. Build it under a [`MESSAGE`] path segment.
pub fn message_linear(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Linear> {
    let init = Init::Randn {
        mean: 0.0,
        stdev: MESSAGE_STD,
    };
    let weight = vb.get_with_hints((out_dim, in_dim), "weight", init)?;
    let bias = vb.get_with_hints(out_dim, "bias", init)?;
    Ok(Linear::new(weight, Some(bias)))
}

/// Standard deviation of a variable, from its path and shape.
fn param_std(name: &str, dims: &[usize]) -> f64 {
    let mut segments = name.split('.');
    if segments.clone().any(|s| s == MESSAGE) {
        return MESSAGE_STD;
    }
    if segments.any(|s| s == NODE_TYPE_EMBED) {
        return 1.0;
    }
    match dims {
        [fan_out, fan_in] => xavier_std(*fan_in, *fan_out),
        _ => 0.0,
    }
}

/// Redraw every variable of `varmap` from a generator seeded with `seed`.
///
/// Variables are visited in name order.
pub fn reset_parameters(varmap: &VarMap, seed: u64) -> Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| Error::Msg(e.to_string()))?;
    let mut vars: Vec<(&String, &Var)> = data.iter().collect();
    vars.sort_by(|a, b| a.0.cmp(b.0));

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for (name, var) in &vars {
        let std = param_std(name, var.dims());
        let count = var.elem_count();
        let values: Vec<f32> = if std > 0.0 {
            let normal = Normal::new(0.0f32, std as f32).map_err(|e| Error::Msg(e.to_string()))?;
            (0..count).map(|_| normal.sample(&mut rng)).collect()
        } else {
            vec![0.0; count]
        };
        let value = Tensor::from_vec(values, var.dims(), var.device())?.to_dtype(var.dtype())?;
        var.set(&value)?;
    }
    tracing::debug!(seed, vars = vars.len(), "reset parameters");
    Ok(())
}
