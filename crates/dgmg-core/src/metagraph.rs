//! Node and edge type vocabulary of a heterogeneous graph.
//!
//! A [`Metagraph`] is derived once from a list of canonical edge types
//! `(src_type, relation, dst_type)` and is read-only afterwards. It assigns
//! 1-based indices to node types and canonical edge types (index 0 is left free
//! so decision layers can use it for "stop"), and hands out empty working graphs
//! that declare every type with zero nodes and zero edges.
//!
//! # Example
//!
//! ```rust
//! use dgmg_core::{EdgeType, Metagraph};
//!
//! let metagraph = Metagraph::new(vec![
//!     EdgeType::new("event", ":DF", "event"),
//!     EdgeType::new("event", ":CORR", "application"),
//! ])?;
//!
//! assert_eq!(metagraph.num_node_types(), 2);
//! assert_eq!(metagraph.ntype_index("application"), Some(2));
//! assert_eq!(metagraph.index_to_ntype(1).map(|t| t.as_str()), Some("event"));
//! # Ok::<(), dgmg_core::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::graph::TypedGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A node type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeType(pub String);

impl NodeType {
    /// Create a new node type.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&String> for NodeType {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

/// A canonical edge type, represented as (src_type, relation, dst_type).
///
/// Serialized as a three-element array so configuration files can list
/// `["event", ":DF", "event"]` directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String, String)", into = "(String, String, String)")]
pub struct EdgeType {
    /// Source node type.
    pub src_type: NodeType,
    /// Relation name.
    pub relation: String,
    /// Destination node type.
    pub dst_type: NodeType,
}

impl EdgeType {
    /// Create a new edge type.
    pub fn new(
        src_type: impl Into<NodeType>,
        relation: impl Into<String>,
        dst_type: impl Into<NodeType>,
    ) -> Self {
        Self {
            src_type: src_type.into(),
            relation: relation.into(),
            dst_type: dst_type.into(),
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.src_type, self.relation, self.dst_type)
    }
}

impl From<(String, String, String)> for EdgeType {
    fn from((src, relation, dst): (String, String, String)) -> Self {
        Self::new(src, relation, dst)
    }
}

impl From<EdgeType> for (String, String, String) {
    fn from(e: EdgeType) -> Self {
        (e.src_type.0, e.relation, e.dst_type.0)
    }
}

/// Static type vocabulary of a heterogeneous graph.
#[derive(Debug, Clone)]
pub struct Metagraph {
    canonical_etypes: Vec<EdgeType>,
    canonical_etype_to_index: HashMap<EdgeType, usize>,
    ntype_to_index: HashMap<NodeType, usize>,
    /// Node types in first-seen order; position `i` has index `i + 1`.
    nodes: Vec<NodeType>,
    relations: Vec<String>,
}

impl Metagraph {
    /// Build the vocabulary from canonical edge types.
    ///
    /// Node types are collected in first-seen order (source before
    /// destination). Duplicate canonical edge types keep their first index.
    pub fn new(canonical_etypes: Vec<EdgeType>) -> Result<Self> {
        if canonical_etypes.is_empty() {
            return Err(Error::EmptyMetagraph);
        }

        let mut canonical_etype_to_index = HashMap::new();
        let mut ntype_to_index = HashMap::new();
        let mut nodes = Vec::new();
        let mut relations: Vec<String> = Vec::new();
        let mut unique = Vec::with_capacity(canonical_etypes.len());

        for etype in canonical_etypes {
            if canonical_etype_to_index.contains_key(&etype) {
                continue;
            }
            canonical_etype_to_index.insert(etype.clone(), unique.len() + 1);

            for ntype in [&etype.src_type, &etype.dst_type] {
                if !ntype_to_index.contains_key(ntype) {
                    nodes.push(ntype.clone());
                    ntype_to_index.insert(ntype.clone(), nodes.len());
                }
            }
            if !relations.contains(&etype.relation) {
                relations.push(etype.relation.clone());
            }
            unique.push(etype);
        }

        Ok(Self {
            canonical_etypes: unique,
            canonical_etype_to_index,
            ntype_to_index,
            nodes,
            relations,
        })
    }

    /// Node types in first-seen order.
    pub fn nodes(&self) -> &[NodeType] {
        &self.nodes
    }

    /// Canonical edge types in declaration order (duplicates removed).
    pub fn canonical_etypes(&self) -> &[EdgeType] {
        &self.canonical_etypes
    }

    /// Distinct relation names in first-seen order.
    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    /// Number of node types.
    pub fn num_node_types(&self) -> usize {
        self.nodes.len()
    }

    /// Number of canonical edge types.
    pub fn num_edge_types(&self) -> usize {
        self.canonical_etypes.len()
    }

    /// 1-based index of a node type.
    pub fn ntype_index(&self, name: &str) -> Option<usize> {
        self.ntype_to_index.get(&NodeType::new(name)).copied()
    }

    /// Node type for a 1-based index.
    pub fn index_to_ntype(&self, index: usize) -> Option<&NodeType> {
        index.checked_sub(1).and_then(|pos| self.nodes.get(pos))
    }

    /// 1-based index of a canonical edge type.
    pub fn canonical_etype_index(&self, etype: &EdgeType) -> Option<usize> {
        self.canonical_etype_to_index.get(etype).copied()
    }

    /// Canonical edge type for a 1-based index.
    pub fn index_to_canonical_etype(&self, index: usize) -> Option<&EdgeType> {
        index.checked_sub(1).and_then(|pos| self.canonical_etypes.get(pos))
    }

    /// Whether `(src, relation, dst)` is declared.
    pub fn has_canonical_etype(&self, src: &NodeType, relation: &str, dst: &NodeType) -> bool {
        self.canonical_etypes
            .iter()
            .any(|e| &e.src_type == src && e.relation == relation && &e.dst_type == dst)
    }

    /// A fresh working graph with every type declared and nothing in it.
    pub fn empty_graph<N, E>(&self) -> TypedGraph<N, E> {
        TypedGraph::with_schema(self.nodes.clone(), self.canonical_etypes.clone())
    }
}
