//! Dataset-selected hyperparameters.
//!
//! Configuration is a flat key/value mapping ([`Options`]). Callers supply
//! their own options including a `dataset` key; [`dataset_based_configure`]
//! merges the matching dataset block on top, and [`Options::to_config`] turns
//! the result into a typed [`DgmgConfig`].
//!
//! ```rust
//! use dgmg_core::config::{dataset_based_configure, Options};
//!
//! let opts = Options::new().with("dataset", "cycles");
//! let merged = dataset_based_configure(&opts)?;
//! let config = merged.to_config()?;
//!
//! assert_eq!(config.node_hidden_size, 16);
//! assert_eq!(config.lr, 5e-4);
//! # Ok::<(), dgmg_core::Error>(())
//! ```

use crate::decode::TraceVocabulary;
use crate::error::{Error, Result};
use crate::metagraph::{EdgeType, Metagraph};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// A flat configuration mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, Value>);

impl Options {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Name of the selected dataset.
    pub fn dataset(&self) -> Result<&str> {
        self.get("dataset")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidConfig("missing string option `dataset`".to_string()))
    }

    /// Copy of `self` with every entry of `other` laid on top.
    pub fn merged(&self, other: &Options) -> Options {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    /// Load options from a JSON object file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Deserialize into the typed configuration.
    pub fn to_config(&self) -> Result<DgmgConfig> {
        let value = serde_json::to_value(self)?;
        serde_json::from_value(value).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// Defaults shared by the synthetic datasets.
pub fn synthetic_dataset_configure() -> Options {
    Options::new()
        .with("node_hidden_size", 16)
        .with("num_propagation_rounds", 2)
        .with("optimizer", "Adam")
        .with("nepochs", 1)
        .with("ds_size", 4000)
        .with("num_generated_samples", 10000)
}

/// Event-log graphs: events correlated with application, resource and offer
/// entities.
pub fn cycles_configure() -> Options {
    let cycles = Options::new()
        .with("min_size", 10)
        .with("max_size", 20)
        .with("lr", 5e-4)
        .with(
            "node_types",
            json!(["event", "application", "resource", "offer"]),
        )
        .with("edge_types", json!([":CORR", ":DF"]))
        .with(
            "correlation_attributes",
            json!(["application", "resource", "offer"]),
        )
        .with("edge_directions", json!(["to target", "to source"]))
        .with(
            "activity_labels",
            json!([
                "create application",
                "application ready",
                "create offer",
                "send offer",
                "offer cancelled"
            ]),
        )
        .with(
            "canonical_etypes",
            json!([
                ["event", ":DF", "event"],
                ["event", ":CORR", "application"],
                ["event", ":CORR", "resource"],
                ["event", ":CORR", "offer"]
            ]),
        );
    synthetic_dataset_configure().merged(&cycles)
}

/// Merge the dataset block selected by `opts["dataset"]` over `opts`.
///
/// Dataset values win over caller values for keys present in both.
pub fn dataset_based_configure(opts: &Options) -> Result<Options> {
    let ds_configure = match opts.dataset()? {
        "cycles" => cycles_configure(),
        other => return Err(Error::UnsupportedDataset(other.to_string())),
    };
    Ok(opts.merged(&ds_configure))
}

fn default_seed() -> u64 {
    42
}

/// Typed view of a merged configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DgmgConfig {
    pub dataset: String,
    pub node_hidden_size: usize,
    pub num_propagation_rounds: usize,
    pub optimizer: String,
    pub nepochs: usize,
    pub ds_size: usize,
    pub num_generated_samples: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub lr: f64,
    pub node_types: Vec<String>,
    pub edge_types: Vec<String>,
    pub correlation_attributes: Vec<String>,
    pub edge_directions: Vec<String>,
    pub activity_labels: Vec<String>,
    pub canonical_etypes: Vec<EdgeType>,
    /// Node cap during sampling; falls back to `max_size`.
    #[serde(default)]
    pub v_max: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl DgmgConfig {
    /// Load a merged configuration from a JSON object file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Options::from_json_file(path)?.to_config()
    }

    /// Maximum number of nodes in a sampled graph.
    pub fn v_max(&self) -> usize {
        self.v_max.unwrap_or(self.max_size)
    }

    /// Metagraph over the configured canonical edge types.
    pub fn metagraph(&self) -> Result<Metagraph> {
        Metagraph::new(self.canonical_etypes.clone())
    }

    /// Vocabulary for decoding traces of this dataset.
    pub fn trace_vocabulary(&self) -> TraceVocabulary {
        TraceVocabulary {
            node_types: self.node_types.clone(),
            edge_types: self.edge_types.clone(),
            edge_directions: self.edge_directions.clone(),
            activity_labels: self.activity_labels.clone(),
            correlation_attributes: self.correlation_attributes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycles_overrides_and_inherits() {
        let opts = Options::new().with("dataset", "cycles");
        let merged = dataset_based_configure(&opts).unwrap();

        assert_eq!(merged.get("lr"), Some(&json!(5e-4)));
        assert_eq!(merged.get("nepochs"), Some(&json!(1)));
        assert_eq!(merged.get("optimizer"), Some(&json!("Adam")));
        assert_eq!(merged.get("dataset"), Some(&json!("cycles")));
        assert!(!synthetic_dataset_configure().contains_key("lr"));
    }

    #[test]
    fn test_dataset_values_win_over_caller() {
        let opts = Options::new()
            .with("dataset", "cycles")
            .with("node_hidden_size", 64)
            .with("v_max", 5);
        let config = dataset_based_configure(&opts).unwrap().to_config().unwrap();

        assert_eq!(config.node_hidden_size, 16);
        assert_eq!(config.v_max(), 5);
    }

    #[test]
    fn test_unsupported_dataset_named_in_error() {
        let opts = Options::new().with("dataset", "not-a-real-dataset");
        let err = dataset_based_configure(&opts).unwrap_err();
        assert!(matches!(&err, Error::UnsupportedDataset(name) if name == "not-a-real-dataset"));
        assert!(err.to_string().contains("not-a-real-dataset"));
    }

    #[test]
    fn test_missing_dataset_key() {
        assert!(matches!(
            dataset_based_configure(&Options::new()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_typed_config_derives_model_inputs() {
        let config = dataset_based_configure(&Options::new().with("dataset", "cycles"))
            .unwrap()
            .to_config()
            .unwrap();

        assert_eq!(config.v_max(), 20);
        assert_eq!(config.seed, 42);

        let mg = config.metagraph().unwrap();
        assert_eq!(mg.num_node_types(), 4);
        assert_eq!(mg.num_edge_types(), 4);

        let vocab = config.trace_vocabulary();
        assert_eq!(vocab.edge_types, vec![":CORR", ":DF"]);
        assert_eq!(vocab.activity_labels.len(), 5);
    }

    #[test]
    fn test_incomplete_options_rejected() {
        let err = synthetic_dataset_configure().to_config().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
