//! `dgmg` generates heterogeneous graphs one decision at a time.
//!
//! This crate re-exports the two layers of the generator:
//!
//! - [`core`] (`dgmg-core`): metagraph, typed working graph, action traces,
//!   configuration and trace datasets
//! - [`nn`] (`dgmg-nn`): graph readout and propagation, decision modules,
//!   the generator state machine and its trainer
//!
//! # Example
//!
//! ```rust
//! use dgmg::core::config::{dataset_based_configure, Options};
//! use dgmg::core::TraceDataset;
//! use dgmg::nn::Trainer;
//!
//! let config = dataset_based_configure(&Options::new().with("dataset", "cycles"))?
//!     .to_config()?;
//! let mut trainer = Trainer::new(config, &candle_core::Device::Cpu)?;
//! let stats = trainer.train_epoch(&TraceDataset::reference())?;
//! assert!(stats.mean_loss > 0.0);
//! # Ok::<(), dgmg::nn::Error>(())
//! ```

pub use dgmg_core as core;
pub use dgmg_nn as nn;

pub use dgmg_core::config::{dataset_based_configure, DgmgConfig, Options};
pub use dgmg_core::{Action, ActionTrace, Metagraph, TraceDataset};
pub use dgmg_nn::{Dgmg, Trainer};
