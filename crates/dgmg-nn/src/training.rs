//! Teacher-forced training and sampling.
//!
//! The objective for one trace is its negative log-likelihood under the
//! model:
//!
//! ```text
//! loss = -sum_{decisions d} log p(d | graph so far)
//! ```
//!
//! Traces are trained one at a time; each step is a full optimizer update.
//!
//! # Example
//!
//! ```rust,no_run
//! use dgmg_core::config::{dataset_based_configure, Options};
//! use dgmg_core::TraceDataset;
//! use dgmg_nn::training::Trainer;
//!
//! let config = dataset_based_configure(&Options::new().with("dataset", "cycles"))?
//!     .to_config()?;
//! let mut trainer = Trainer::new(config, &candle_core::Device::Cpu)?;
//!
//! let stats = trainer.train_epoch(&TraceDataset::reference())?;
//! println!("epoch {} loss {:.4}", stats.epoch, stats.mean_loss);
//!
//! let (graphs, summary) = trainer.generate(10, 20, 0)?;
//! # Ok::<(), dgmg_nn::Error>(())
//! ```

use crate::episode::WorkingGraph;
use crate::error::{Error, Result};
use crate::init::reset_parameters;
use crate::model::Dgmg;
use candle_core::{DType, Device};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use dgmg_core::config::DgmgConfig;
use dgmg_core::{ActionTrace, TraceDataset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Summary of one pass over a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    pub mean_loss: f32,
    pub mean_log_prob: f32,
    pub samples: usize,
}

/// Summary of a batch of sampled graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub samples: usize,
    pub mean_nodes: f64,
    /// Mean number of links (edge pairs).
    pub mean_links: f64,
    pub max_nodes: usize,
    /// Total nodes per type over all samples.
    pub nodes_by_type: BTreeMap<String, usize>,
}

impl GenerationStats {
    fn from_graphs(graphs: &[WorkingGraph]) -> Self {
        let samples = graphs.len();
        let mut nodes_by_type = BTreeMap::new();
        let mut total_nodes = 0usize;
        let mut total_links = 0usize;
        let mut max_nodes = 0usize;
        for g in graphs {
            let stats = g.stats();
            total_nodes += stats.num_nodes;
            total_links += stats.num_links;
            max_nodes = max_nodes.max(stats.num_nodes);
            for (ntype, count) in stats.nodes_by_type {
                *nodes_by_type.entry(ntype).or_insert(0) += count;
            }
        }
        let denom = samples.max(1) as f64;
        Self {
            samples,
            mean_nodes: total_nodes as f64 / denom,
            mean_links: total_links as f64 / denom,
            max_nodes,
            nodes_by_type,
        }
    }
}

fn optimizer_params(name: &str, lr: f64) -> Result<ParamsAdamW> {
    match name {
        "Adam" => Ok(ParamsAdamW {
            lr,
            weight_decay: 0.0,
            ..Default::default()
        }),
        "AdamW" => Ok(ParamsAdamW {
            lr,
            ..Default::default()
        }),
        other => Err(Error::UnsupportedOptimizer(other.to_string())),
    }
}

/// Owns the parameters, the model and its optimizer.
pub struct Trainer {
    config: DgmgConfig,
    varmap: VarMap,
    model: Dgmg,
    optimizer: AdamW,
    epoch: usize,
}

impl Trainer {
    /// Initialise a fresh model for `config`, parameters drawn from
    /// `config.seed`.
    pub fn new(config: DgmgConfig, device: &Device) -> Result<Self> {
        let params = optimizer_params(&config.optimizer, config.lr)?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Dgmg::new(&config, vb)?;
        reset_parameters(&varmap, config.seed)?;
        let optimizer = AdamW::new(varmap.all_vars(), params)?;
        tracing::debug!(
            optimizer = %config.optimizer,
            lr = config.lr,
            vars = varmap.all_vars().len(),
            "initialised model"
        );
        Ok(Self {
            config,
            varmap,
            model,
            optimizer,
            epoch: 0,
        })
    }

    pub fn config(&self) -> &DgmgConfig {
        &self.config
    }

    pub fn model(&self) -> &Dgmg {
        &self.model
    }

    /// Epochs completed so far.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// One optimizer update on a single trace. Returns the loss.
    pub fn train_step(&mut self, trace: &ActionTrace) -> Result<f32> {
        let rollout = self.model.forward_train(trace)?;
        let loss = rollout.log_prob.neg()?;
        self.optimizer.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    /// One pass over every trace in order.
    pub fn train_epoch(&mut self, dataset: &TraceDataset) -> Result<EpochStats> {
        let mut total_loss = 0f32;
        for trace in dataset.iter() {
            let trace = dataset.collate_single(&[trace])?;
            total_loss += self.train_step(trace)?;
        }
        self.epoch += 1;

        let samples = dataset.len();
        let mean_loss = if samples == 0 {
            0.0
        } else {
            total_loss / samples as f32
        };
        let stats = EpochStats {
            epoch: self.epoch,
            mean_loss,
            mean_log_prob: -mean_loss,
            samples,
        };
        tracing::info!(
            epoch = stats.epoch,
            loss = stats.mean_loss,
            samples,
            "epoch complete"
        );
        Ok(stats)
    }

    /// Mean `log p(trace)` over a dataset, without updating.
    pub fn evaluate(&self, dataset: &TraceDataset) -> Result<f32> {
        if dataset.is_empty() {
            return Ok(0.0);
        }
        let mut total = 0f32;
        for trace in dataset.iter() {
            total += self.model.forward_train(trace)?.log_prob.to_scalar::<f32>()?;
        }
        Ok(total / dataset.len() as f32)
    }

    /// Sample `count` graphs of at most `v_max` nodes; sample `i` uses seed
    /// `seed + i`.
    pub fn generate(
        &self,
        count: usize,
        v_max: usize,
        seed: u64,
    ) -> Result<(Vec<WorkingGraph>, GenerationStats)> {
        let graphs = (0..count as u64)
            .map(|i| self.model.forward_inference(v_max, seed.wrapping_add(i)))
            .collect::<Result<Vec<_>>>()?;
        let stats = GenerationStats::from_graphs(&graphs);
        tracing::info!(
            samples = stats.samples,
            mean_nodes = stats.mean_nodes,
            mean_links = stats.mean_links,
            "generated graphs"
        );
        Ok((graphs, stats))
    }

    /// Write the parameters as safetensors.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    /// Overwrite the parameters from a safetensors file.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.load(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgmg_core::config::{dataset_based_configure, Options};

    fn config() -> DgmgConfig {
        dataset_based_configure(&Options::new().with("dataset", "cycles"))
            .unwrap()
            .to_config()
            .unwrap()
    }

    #[test]
    fn test_unsupported_optimizer() {
        let mut c = config();
        c.optimizer = "SGD".into();
        assert!(matches!(
            Trainer::new(c, &Device::Cpu),
            Err(Error::UnsupportedOptimizer(name)) if name == "SGD"
        ));
    }

    #[test]
    fn test_same_seed_same_model() {
        let dataset = TraceDataset::reference();
        let a = Trainer::new(config(), &Device::Cpu).unwrap();
        let b = Trainer::new(config(), &Device::Cpu).unwrap();
        assert_eq!(a.evaluate(&dataset).unwrap(), b.evaluate(&dataset).unwrap());

        let mut c = config();
        c.seed += 1;
        let c = Trainer::new(c, &Device::Cpu).unwrap();
        assert_ne!(a.evaluate(&dataset).unwrap(), c.evaluate(&dataset).unwrap());
    }

    #[test]
    fn test_configured_learning_rate_improves_likelihood() {
        let mut trainer = Trainer::new(config(), &Device::Cpu).unwrap();
        let dataset = TraceDataset::reference();
        let before = trainer.evaluate(&dataset).unwrap();
        for _ in 0..10 {
            trainer.train_epoch(&dataset).unwrap();
        }
        assert!(trainer.evaluate(&dataset).unwrap() > before);
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut c = config();
        c.lr = 1e-2;
        let mut trainer = Trainer::new(c, &Device::Cpu).unwrap();
        let dataset = TraceDataset::reference();

        let first = trainer.train_epoch(&dataset).unwrap();
        assert_eq!(first.epoch, 1);
        assert_eq!(first.samples, 1);
        assert!(first.mean_loss > 0.0);

        let mut last = first.clone();
        for _ in 0..20 {
            last = trainer.train_epoch(&dataset).unwrap();
        }
        assert_eq!(trainer.epoch(), 21);
        assert!(last.mean_loss < first.mean_loss);
        assert!(trainer.evaluate(&dataset).unwrap() > first.mean_log_prob);
    }

    #[test]
    fn test_generate_stats() {
        let trainer = Trainer::new(config(), &Device::Cpu).unwrap();
        let (graphs, stats) = trainer.generate(4, 5, 3).unwrap();
        assert_eq!(graphs.len(), 4);
        assert_eq!(stats.samples, 4);
        assert!(stats.max_nodes <= 5);
        assert!(stats.mean_nodes <= 5.0);
        assert_eq!(stats.nodes_by_type.len(), 4);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join("dgmg-nn-trainer-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.safetensors");

        let mut trained = Trainer::new(config(), &Device::Cpu).unwrap();
        trained.train_epoch(&TraceDataset::reference()).unwrap();
        trained.save(&path).unwrap();

        let mut fresh = Trainer::new(config(), &Device::Cpu).unwrap();
        fresh.load(&path).unwrap();

        let dataset = TraceDataset::reference();
        let a = trained.evaluate(&dataset).unwrap();
        let b = fresh.evaluate(&dataset).unwrap();
        assert!((a - b).abs() < 1e-4);
        std::fs::remove_file(path).unwrap();
    }
}
