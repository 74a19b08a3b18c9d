//! End-to-end generation scenarios.

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use dgmg::core::config::{dataset_based_configure, Options};
use dgmg::core::{EdgeType, Error as CoreError};
use dgmg::nn::Error;
use dgmg::{ActionTrace, Dgmg, DgmgConfig, TraceDataset, Trainer};
use proptest::prelude::*;

fn cycles() -> DgmgConfig {
    dataset_based_configure(&Options::new().with("dataset", "cycles"))
        .unwrap()
        .to_config()
        .unwrap()
}

/// Cycles hyperparameters over a metagraph with only `event` nodes.
fn events_only() -> DgmgConfig {
    let mut config = cycles();
    config.node_types = vec!["event".into()];
    config.canonical_etypes = vec![EdgeType::new("event", ":DF", "event")];
    config
}

fn model(config: &DgmgConfig) -> (VarMap, Dgmg) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = Dgmg::new(config, vb).unwrap();
    (varmap, model)
}

fn scalar(t: &candle_core::Tensor) -> f32 {
    t.flatten_all().unwrap().to_vec1::<f32>().unwrap()[0]
}

#[test]
fn single_event_trace_replays_three_decisions() {
    let (_varmap, model) = model(&events_only());
    let trace = ActionTrace::from_pairs(&[(0, 0), (1, 0), (6, 4), (0, 1)]).unwrap();

    let rollout = model.forward_train(&trace).unwrap();

    assert_eq!(rollout.graph.num_nodes(), 1);
    assert_eq!(rollout.graph.num_edges(), 0);
    let node = rollout.graph.node(0).unwrap();
    assert_eq!(rollout.graph.node_type(0).unwrap().as_str(), "event");
    assert_eq!(node.activity.as_deref(), Some("create application"));

    // add node, add edge (stop), add node (stop)
    assert_eq!(rollout.terms.add_node.len(), 2);
    assert_eq!(rollout.terms.add_edge.len(), 1);
    assert!(rollout.terms.choose_dest.is_empty());

    let total = rollout.log_prob.to_scalar::<f32>().unwrap();
    let sum: f32 = rollout
        .terms
        .add_node
        .iter()
        .chain(&rollout.terms.add_edge)
        .map(scalar)
        .sum();
    assert!(total.is_finite());
    assert!((total - sum).abs() < 1e-5);
}

#[test]
fn zero_node_limit_yields_empty_graph() {
    let (_varmap, model) = model(&cycles());
    for seed in 0..10 {
        let sample = model.sample(0, seed).unwrap();
        assert_eq!(sample.graph.num_nodes(), 0);
        assert_eq!(sample.graph.num_edges(), 0);
        // The first add-node decision still ran
        assert_eq!(sample.decisions, 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Each added node costs one add-node and at least one add-edge decision,
    /// and the run ends with one more add-node decision.
    #[test]
    fn sampled_runs_account_for_every_node(v_max in 0usize..7, seed in any::<u64>()) {
        let (_varmap, model) = model(&cycles());
        let sample = model.sample(v_max, seed).unwrap();
        let nodes = sample.graph.num_nodes();

        prop_assert!(nodes <= v_max);
        prop_assert!(sample.decisions >= 2 * nodes + 1);
        // Every link costs a destination and an add-edge decision
        prop_assert!(sample.decisions >= 2 * nodes + 1 + 2 * sample.graph.num_links());
    }
}

#[test]
fn sampled_graphs_never_exceed_node_limit() {
    let (_varmap, model) = model(&cycles());
    for (v_max, seed) in [(1, 3), (2, 5), (4, 8), (6, 13)] {
        let graph = model.forward_inference(v_max, seed).unwrap();
        assert!(graph.num_nodes() <= v_max);
        // Every edge has its mirror
        for (src, dst, _) in graph.edges() {
            assert!(graph.has_edge_between(dst, src));
        }
    }
}

#[test]
fn cycles_configuration_merges_synthetic_base() {
    let merged = dataset_based_configure(&Options::new().with("dataset", "cycles")).unwrap();
    assert_eq!(merged.get("lr"), Some(&serde_json::json!(5e-4)));
    assert_eq!(merged.get("nepochs"), Some(&serde_json::json!(1)));

    let config = merged.to_config().unwrap();
    assert_eq!(config.lr, 5e-4);
    assert_eq!(config.nepochs, 1);
}

#[test]
fn unknown_dataset_is_named() {
    let err = dataset_based_configure(&Options::new().with("dataset", "not-a-real-dataset"))
        .unwrap_err();
    assert!(matches!(&err, CoreError::UnsupportedDataset(name) if name == "not-a-real-dataset"));
    assert!(err.to_string().contains("not-a-real-dataset"));
}

#[test]
fn malformed_trace_is_an_error() {
    let (_varmap, model) = model(&cycles());
    let trace = ActionTrace::from_pairs(&[(0, 0), (6, 1), (0, 4)]).unwrap();
    assert!(matches!(
        model.forward_train(&trace),
        Err(Error::Core(CoreError::InvalidAction { kind: 6, .. }))
    ));

    assert!(matches!(
        ActionTrace::from_pairs(&[(9, 0)]),
        Err(CoreError::UnknownActionKind(9))
    ));
}

#[test]
fn reference_trace_trains_and_samples() {
    let mut trainer = Trainer::new(cycles(), &Device::Cpu).unwrap();
    let dataset = TraceDataset::reference();

    let before = trainer.evaluate(&dataset).unwrap();
    for _ in 0..10 {
        trainer.train_epoch(&dataset).unwrap();
    }
    let after = trainer.evaluate(&dataset).unwrap();
    assert!(after > before, "log p should rise: {before} -> {after}");

    let (graphs, stats) = trainer.generate(5, 10, 0).unwrap();
    assert_eq!(graphs.len(), 5);
    assert!(stats.max_nodes <= 10);
}
