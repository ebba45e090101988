//! The resolved-artifact graph and its tree projections.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use airlift_core::{DependencyNode, DependencyTree, ResolvedArtifact};

/// A dependency edge: whether the child is optional for its parent.
#[derive(Debug, Clone, Copy)]
pub struct DepEdge {
    pub optional: bool,
}

/// The resolver's working graph: one node per unique artifact identity,
/// edges in discovery order. Insertion order is preserved so the flat
/// list and conflict policy stay deterministic.
pub struct ArtifactGraph {
    graph: DiGraph<ResolvedArtifact, DepEdge>,
    index: HashMap<String, NodeIndex>,
    order: Vec<NodeIndex>,
    roots: Vec<NodeIndex>,
}

impl ArtifactGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            order: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Insert an artifact, returning its index. Re-inserting an identity
    /// returns the existing node untouched.
    pub fn add_artifact(&mut self, artifact: ResolvedArtifact) -> NodeIndex {
        let key = artifact.key();
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(artifact);
        self.index.insert(key, idx);
        self.order.push(idx);
        idx
    }

    /// Mark a node as a user-requested root.
    pub fn add_root(&mut self, idx: NodeIndex) {
        if !self.roots.contains(&idx) {
            self.roots.push(idx);
        }
    }

    /// Add an edge unless an identical one already exists.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DepEdge) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    pub fn find(&self, key: &str) -> Option<NodeIndex> {
        self.index.get(key).copied()
    }

    pub fn artifact(&self, idx: NodeIndex) -> &ResolvedArtifact {
        &self.graph[idx]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct children of a node, in edge insertion order.
    pub fn children_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, DepEdge)> {
        let mut children: Vec<(NodeIndex, DepEdge)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), *e.weight()))
            .collect();
        // petgraph iterates newest-first; restore insertion order
        children.reverse();
        children
    }

    /// The de-duplicated closure in discovery order.
    pub fn flat_list(&self) -> Vec<ResolvedArtifact> {
        self.order.iter().map(|&idx| self.graph[idx].clone()).collect()
    }

    /// Project one tree per root. Shared subtrees repeat under each
    /// parent; an edge that would re-enter an ancestor is cut so that a
    /// cycle never unrolls.
    pub fn trees(&self) -> Vec<DependencyTree> {
        self.roots
            .iter()
            .map(|&root| {
                let mut on_path = HashSet::new();
                DependencyTree::new(self.subtree(root, &mut on_path))
            })
            .collect()
    }

    fn subtree(&self, idx: NodeIndex, on_path: &mut HashSet<NodeIndex>) -> DependencyNode {
        let mut node = DependencyNode::new(self.graph[idx].clone());
        on_path.insert(idx);
        for (child, edge) in self.children_of(idx) {
            if on_path.contains(&child) {
                continue;
            }
            let mut child_node = self.subtree(child, on_path);
            child_node.optional = edge.optional;
            node.children.push(child_node);
        }
        on_path.remove(&idx);
        node
    }
}

impl Default for ArtifactGraph {
    fn default() -> Self {
        Self::new()
    }
}
