//! Typed working graph grown one node and one edge pair at a time.
//!
//! [`TypedGraph`] is a directed multigraph over `petgraph` with a fixed,
//! declared set of node types and canonical edge types. Node ids are global
//! insertion positions (`0..num_nodes()`); each node also knows its type and
//! its index among nodes of that type. Edges are inserted in pairs, a forward
//! link plus its mirror, so that message passing is symmetric.
//!
//! Node and edge payloads are generic: the structure here carries only the
//! labels recorded from action traces, the tensor state lives with the model.

use crate::action::EdgeDirection;
use crate::error::{Error, Result};
use crate::metagraph::{EdgeType, NodeType};
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Global node id (insertion position).
pub type NodeId = usize;

/// A node of the working graph.
#[derive(Debug, Clone)]
pub struct Node<N> {
    /// Position of the node type in the declared node type list.
    pub type_pos: usize,
    /// Index among nodes of the same type.
    pub local: usize,
    /// Activity label, when a trace supplied one.
    pub activity: Option<String>,
    /// Model payload.
    pub data: N,
}

/// A directed edge of the working graph.
#[derive(Debug, Clone)]
pub struct Edge<E> {
    /// True for the reverse half of an inserted pair.
    pub mirror: bool,
    /// Relation name, when a trace supplied one.
    pub relation: Option<String>,
    /// Direction relative to the node that created the link.
    pub direction: Option<EdgeDirection>,
    /// Correlation entity types recorded on the link.
    pub correlations: Vec<String>,
    /// Model payload.
    pub data: E,
}

impl<E> Edge<E> {
    fn new(data: E, mirror: bool) -> Self {
        Self {
            mirror,
            relation: None,
            direction: None,
            correlations: Vec::new(),
            data,
        }
    }
}

/// A heterogeneous working graph with a fixed type schema.
#[derive(Debug, Clone)]
pub struct TypedGraph<N, E> {
    node_types: Vec<NodeType>,
    canonical_etypes: Vec<EdgeType>,
    type_counts: Vec<usize>,
    graph: DiGraph<Node<N>, Edge<E>>,
}

impl<N, E> TypedGraph<N, E> {
    /// Create an empty graph declaring the given types.
    pub fn with_schema(node_types: Vec<NodeType>, canonical_etypes: Vec<EdgeType>) -> Self {
        let type_counts = vec![0; node_types.len()];
        Self {
            node_types,
            canonical_etypes,
            type_counts,
            graph: DiGraph::new(),
        }
    }

    /// Declared node types.
    pub fn node_types(&self) -> &[NodeType] {
        &self.node_types
    }

    /// Declared canonical edge types.
    pub fn canonical_etypes(&self) -> &[EdgeType] {
        &self.canonical_etypes
    }

    /// Total number of nodes across all types.
    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of nodes of the type at `type_pos`.
    pub fn num_nodes_of(&self, type_pos: usize) -> usize {
        self.type_counts.get(type_pos).copied().unwrap_or(0)
    }

    /// Total number of directed edges, mirrors included.
    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of links (forward edges only).
    pub fn num_links(&self) -> usize {
        self.graph.edge_weights().filter(|e| !e.mirror).count()
    }

    /// Append a node of the type at `type_pos`, returning its global id.
    pub fn add_node(&mut self, type_pos: usize, data: N) -> Result<NodeId> {
        let Some(count) = self.type_counts.get_mut(type_pos) else {
            return Err(Error::NodeTypeNotFound(format!("position {type_pos}")));
        };
        let local = *count;
        *count += 1;
        let idx = self.graph.add_node(Node {
            type_pos,
            local,
            activity: None,
            data,
        });
        Ok(idx.index())
    }

    /// Most recently added node.
    pub fn last_node(&self) -> Option<NodeId> {
        self.num_nodes().checked_sub(1)
    }

    /// Get a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node<N>> {
        self.graph.node_weight(NodeIndex::new(id))
    }

    /// Get a mutable node by id.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node<N>> {
        self.graph.node_weight_mut(NodeIndex::new(id))
    }

    /// Iterate over nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node<N>)> {
        self.graph
            .node_indices()
            .map(move |idx| (idx.index(), &self.graph[idx]))
    }

    /// Mutable payloads in insertion order.
    pub fn node_data_mut(&mut self) -> impl Iterator<Item = &mut N> {
        self.graph.node_weights_mut().map(|n| &mut n.data)
    }

    /// Iterate over nodes of the type at `type_pos`, in insertion order.
    pub fn nodes_of_type(&self, type_pos: usize) -> impl Iterator<Item = (NodeId, &Node<N>)> {
        self.nodes().filter(move |(_, n)| n.type_pos == type_pos)
    }

    /// Type of a node.
    pub fn node_type(&self, id: NodeId) -> Option<&NodeType> {
        self.node(id).and_then(|n| self.node_types.get(n.type_pos))
    }

    /// Whether a directed edge `src -> dst` exists.
    pub fn has_edge_between(&self, src: NodeId, dst: NodeId) -> bool {
        if src >= self.num_nodes() || dst >= self.num_nodes() {
            return false;
        }
        self.graph
            .find_edge(NodeIndex::new(src), NodeIndex::new(dst))
            .is_some()
    }

    /// Insert `src -> dst` and its mirror `dst -> src`.
    pub fn add_edge_pair(&mut self, src: NodeId, dst: NodeId, forward: E, mirror: E) -> Result<()> {
        self.check_node(src)?;
        self.check_node(dst)?;
        let (s, d) = (NodeIndex::new(src), NodeIndex::new(dst));
        self.graph.add_edge(s, d, Edge::new(forward, false));
        self.graph.add_edge(d, s, Edge::new(mirror, true));
        Ok(())
    }

    /// The first forward link `src -> dst`.
    pub fn link_mut(&mut self, src: NodeId, dst: NodeId) -> Option<&mut Edge<E>> {
        if src >= self.num_nodes() || dst >= self.num_nodes() {
            return None;
        }
        let id: Option<EdgeIndex> = self
            .graph
            .edges_connecting(NodeIndex::new(src), NodeIndex::new(dst))
            .find(|e| !e.weight().mirror)
            .map(|e| e.id());
        match id {
            Some(id) => self.graph.edge_weight_mut(id),
            None => None,
        }
    }

    /// Iterate over directed edges as `(src, dst, edge)`.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, &Edge<E>)> {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), e.weight()))
    }

    fn check_node(&self, id: NodeId) -> Result<()> {
        if id < self.num_nodes() {
            Ok(())
        } else {
            Err(Error::NodeOutOfRange {
                id,
                num_nodes: self.num_nodes(),
            })
        }
    }

    /// Node and edge counts per type.
    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_type = BTreeMap::new();
        for (pos, ntype) in self.node_types.iter().enumerate() {
            nodes_by_type.insert(ntype.0.clone(), self.num_nodes_of(pos));
        }
        let mut links_by_relation = BTreeMap::new();
        for (_, _, edge) in self.edges().filter(|(_, _, e)| !e.mirror) {
            let key = edge.relation.clone().unwrap_or_else(|| "unlabelled".to_string());
            *links_by_relation.entry(key).or_insert(0) += 1;
        }
        GraphStats {
            num_nodes: self.num_nodes(),
            num_edges: self.num_edges(),
            num_links: self.num_links(),
            nodes_by_type,
            links_by_relation,
        }
    }

    /// Payload-free description of the graph.
    ///
    /// Links are reported in their semantic orientation: an `Incoming` link
    /// created by node `v` towards `u` is listed as `u -> v`.
    pub fn summary(&self) -> GraphSummary {
        let nodes = self
            .nodes()
            .map(|(id, n)| NodeSummary {
                id,
                ntype: self.node_types[n.type_pos].0.clone(),
                local: n.local,
                activity: n.activity.clone(),
            })
            .collect();
        let links = self
            .edges()
            .filter(|(_, _, e)| !e.mirror)
            .map(|(src, dst, e)| {
                let (src, dst) = match e.direction {
                    Some(EdgeDirection::Incoming) => (dst, src),
                    _ => (src, dst),
                };
                LinkSummary {
                    src,
                    dst,
                    relation: e.relation.clone(),
                    correlations: e.correlations.clone(),
                }
            })
            .collect();
        GraphSummary { nodes, links }
    }

    /// Graphviz rendering of the links.
    pub fn to_dot(&self) -> String {
        let labelled = self.graph.filter_map(
            |_, n| {
                let ntype = self.node_types[n.type_pos].as_str();
                Some(match &n.activity {
                    Some(activity) => format!("{ntype}{} [{activity}]", n.local),
                    None => format!("{ntype}{}", n.local),
                })
            },
            |_, e| {
                if e.mirror {
                    None
                } else {
                    Some(e.relation.clone().unwrap_or_default())
                }
            },
        );
        format!("{}", Dot::new(&labelled))
    }
}

/// Counts describing a working graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Total nodes.
    pub num_nodes: usize,
    /// Total directed edges, mirrors included.
    pub num_edges: usize,
    /// Forward links.
    pub num_links: usize,
    /// Nodes per declared type.
    pub nodes_by_type: BTreeMap<String, usize>,
    /// Links per relation label.
    pub links_by_relation: BTreeMap<String, usize>,
}

/// A node in a [`GraphSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub ntype: String,
    pub local: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
}

/// A link in a [`GraphSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSummary {
    pub src: NodeId,
    pub dst: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub correlations: Vec<String>,
}

/// Serializable structure of a working graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: Vec<NodeSummary>,
    pub links: Vec<LinkSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TypedGraph<u32, ()> {
        TypedGraph::with_schema(
            vec![NodeType::new("event"), NodeType::new("offer")],
            vec![
                EdgeType::new("event", ":DF", "event"),
                EdgeType::new("event", ":CORR", "offer"),
            ],
        )
    }

    #[test]
    fn test_add_nodes_tracks_local_indices() {
        let mut g = schema();
        assert_eq!(g.add_node(0, 10).unwrap(), 0);
        assert_eq!(g.add_node(1, 11).unwrap(), 1);
        assert_eq!(g.add_node(0, 12).unwrap(), 2);

        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.num_nodes_of(0), 2);
        assert_eq!(g.num_nodes_of(1), 1);
        assert_eq!(g.node(2).unwrap().local, 1);
        assert_eq!(g.node_type(1).unwrap().as_str(), "offer");
        assert_eq!(g.last_node(), Some(2));

        let events: Vec<NodeId> = g.nodes_of_type(0).map(|(id, _)| id).collect();
        assert_eq!(events, vec![0, 2]);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut g = schema();
        assert!(matches!(g.add_node(2, 0), Err(Error::NodeTypeNotFound(_))));
        assert_eq!(g.num_nodes(), 0);
    }

    #[test]
    fn test_edge_pair_is_symmetric() {
        let mut g = schema();
        g.add_node(0, 0).unwrap();
        g.add_node(1, 0).unwrap();
        g.add_edge_pair(1, 0, (), ()).unwrap();

        assert!(g.has_edge_between(1, 0));
        assert!(g.has_edge_between(0, 1));
        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.num_links(), 1);
    }

    #[test]
    fn test_edge_pair_out_of_range() {
        let mut g = schema();
        g.add_node(0, 0).unwrap();
        let err = g.add_edge_pair(0, 3, (), ()).unwrap_err();
        assert!(matches!(err, Error::NodeOutOfRange { id: 3, num_nodes: 1 }));
        assert!(!g.has_edge_between(0, 3));
    }

    #[test]
    fn test_summary_orients_incoming_links() {
        let mut g = schema();
        g.add_node(0, 0).unwrap();
        g.add_node(0, 0).unwrap();
        g.add_edge_pair(1, 0, (), ()).unwrap();
        {
            let link = g.link_mut(1, 0).unwrap();
            link.relation = Some(":DF".into());
            link.direction = Some(EdgeDirection::Incoming);
        }

        let summary = g.summary();
        assert_eq!(summary.links.len(), 1);
        assert_eq!((summary.links[0].src, summary.links[0].dst), (0, 1));

        let stats = g.stats();
        assert_eq!(stats.links_by_relation.get(":DF"), Some(&1));
        assert_eq!(stats.nodes_by_type.get("event"), Some(&2));
    }

    #[test]
    fn test_dot_contains_labels() {
        let mut g = schema();
        g.add_node(0, 0).unwrap();
        g.add_node(1, 0).unwrap();
        g.node_mut(0).unwrap().activity = Some("create offer".into());
        g.add_edge_pair(0, 1, (), ()).unwrap();
        g.link_mut(0, 1).unwrap().relation = Some(":CORR".into());

        let dot = g.to_dot();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("event0 [create offer]"));
        assert!(dot.contains(":CORR"));
    }
}
