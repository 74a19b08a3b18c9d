// Allow minor clippy style warnings at crate level
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

//! Structure layer of the DGMG graph generator.
//!
//! This crate holds everything about graphs and traces that does not need
//! tensors:
//!
//! - [`Metagraph`] - node/edge type vocabulary from canonical edge types
//! - [`TypedGraph`] - the heterogeneous working graph grown during generation
//! - [`Action`] / [`ActionTrace`] - raw `(kind, value)` derivation traces
//! - [`decode`] - unfolding traces into replayable decision steps
//! - [`config`] - dataset-selected hyperparameters
//! - [`TraceDataset`] - collections of traces for training
//!
//! # Example
//!
//! ```rust
//! use dgmg_core::config::{dataset_based_configure, Options};
//! use dgmg_core::{decode::TraceDecoder, TraceDataset};
//!
//! let config = dataset_based_configure(&Options::new().with("dataset", "cycles"))?
//!     .to_config()?;
//! let metagraph = config.metagraph()?;
//! let decoder = TraceDecoder::new(config.trace_vocabulary(), &metagraph)?;
//!
//! let dataset = TraceDataset::reference();
//! let steps = decoder.decode(dataset.get(0).unwrap())?;
//! assert!(!steps.is_empty());
//! # Ok::<(), dgmg_core::Error>(())
//! ```

pub mod action;
pub mod config;
pub mod dataset;
pub mod decode;
mod error;
pub mod graph;
pub mod metagraph;

pub use action::{Action, ActionTrace, EdgeDirection};
pub use dataset::TraceDataset;
pub use error::{Error, Result};
pub use graph::{GraphStats, GraphSummary, NodeId, TypedGraph};
pub use metagraph::{EdgeType, Metagraph, NodeType};

// Re-export petgraph for callers that walk the working graph directly
pub use petgraph;
