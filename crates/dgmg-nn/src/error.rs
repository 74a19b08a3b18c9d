//! Error types for dgmg-nn.

use thiserror::Error;

/// dgmg-nn error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Structure layer error (graph, trace, config).
    #[error(transparent)]
    Core(#[from] dgmg_core::Error),

    /// Teacher forcing ran past the end of the decoded trace.
    #[error("trace exhausted at step {step}: expected {expected}")]
    TraceExhausted { step: usize, expected: &'static str },

    /// The next decoded step is not the decision the generator is making.
    #[error("unexpected step {step}: expected {expected}, found {found}")]
    UnexpectedStep {
        step: usize,
        expected: &'static str,
        found: String,
    },

    /// Destination outside the candidate set.
    #[error("invalid destination {dest}: {num_candidates} candidates")]
    InvalidDestination { dest: usize, num_candidates: usize },

    /// Choosing a destination needs at least one earlier node.
    #[error("no destination candidates for node {src}")]
    NoCandidates { src: usize },

    /// An edge decision was requested before any node exists.
    #[error("{0} needs at least one node")]
    EmptyGraph(&'static str),

    /// Sampled mode without a random source.
    #[error("episode has no sampler")]
    NoSampler,

    /// Probabilities that cannot define a distribution.
    #[error("sampling error: {0}")]
    Sampling(String),

    /// Optimizer name not recognised.
    #[error("unsupported optimizer: {0}")]
    UnsupportedOptimizer(String),

    /// Node decision outside `0..num_actions` (stop plus one per node type).
    #[error("invalid node action {action}: {num_actions} actions")]
    InvalidNodeAction { action: usize, num_actions: usize },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
