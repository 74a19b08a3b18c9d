//! Neural layers and generation logic of DGMG.
//!
//! `dgmg-nn` sits on top of the structure layer (`dgmg-core`) and adds the
//! tensor side of the generator:
//!
//! # Modules
//!
//! - [`embed`]: gated per-type graph readout
//! - [`prop`]: message passing rounds with GRU node updates
//! - [`decision`]: add-node, add-edge and choose-destination modules
//! - [`model`]: the [`Dgmg`] state machine in training and inference mode
//! - [`episode`]: per-run state (working graph, trace cursor, log-probs)
//! - [`training`]: optimizer loop, sampling statistics, checkpoints
//! - [`init`]: parameter initialisation schemes and seeded resets
//!
//! # Example: Sampling a Graph
//!
//! ```rust
//! use candle_core::{DType, Device};
//! use candle_nn::{VarBuilder, VarMap};
//! use dgmg_core::config::{dataset_based_configure, Options};
//! use dgmg_nn::Dgmg;
//!
//! let config = dataset_based_configure(&Options::new().with("dataset", "cycles"))?
//!     .to_config()?;
//! let varmap = VarMap::new();
//! let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
//! let model = Dgmg::new(&config, vb)?;
//!
//! let graph = model.forward_inference(config.v_max(), 0)?;
//! assert!(graph.num_nodes() <= 20);
//! # Ok::<(), dgmg_nn::Error>(())
//! ```

pub mod decision;
pub mod embed;
pub mod episode;
pub mod error;
pub mod gru;
pub mod init;
pub mod model;
pub mod prob;
pub mod prop;
pub mod training;

pub use episode::{EdgeState, Episode, LogProbs, NodeState, WorkingGraph};
pub use error::{Error, Result};
pub use model::{Dgmg, Phase, Rollout, Sample};
pub use training::{EpochStats, GenerationStats, Trainer};
