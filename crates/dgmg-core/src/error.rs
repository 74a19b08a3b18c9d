use thiserror::Error;

/// Errors that can occur in dgmg-core.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Dataset name with no configuration block.
    #[error("Unsupported dataset: {0}")]
    UnsupportedDataset(String),

    /// Missing or malformed configuration entry.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A metagraph needs at least one canonical edge type.
    #[error("Metagraph requires at least one canonical edge type")]
    EmptyMetagraph,

    /// Node type name not declared by the metagraph.
    #[error("Node type not found: {0}")]
    NodeTypeNotFound(String),

    /// Node id outside the working graph.
    #[error("Node {id} out of range (graph has {num_nodes} nodes)")]
    NodeOutOfRange { id: usize, num_nodes: usize },

    /// Leading integer of an action pair is not a known decision kind.
    #[error("Unknown action kind {0}")]
    UnknownActionKind(u8),

    /// Action value does not fit the trace vocabulary.
    #[error("Invalid action {kind}:{value} at position {position}: {reason}")]
    InvalidAction {
        kind: u8,
        value: usize,
        position: usize,
        reason: String,
    },

    /// Training accepts exactly one sample per batch.
    #[error("Batched training is not supported (got batch of {0})")]
    BatchSize(usize),
}

/// Result type alias for dgmg-core.
pub type Result<T> = std::result::Result<T, Error>;
