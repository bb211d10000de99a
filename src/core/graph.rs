//! Directed alignment graph returned by engines for `--print-graph`.

use std::fmt::Write as _;

/// A node holding one base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: usize,
    pub base: u8,
}

/// A directed edge weighted by the number of sequences traversing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub src: usize,
    pub dst: usize,
    pub weight: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectedGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl DirectedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its id.
    pub fn add_node(&mut self, base: u8) -> usize {
        let id = self.nodes.len();
        self.nodes.push(GraphNode { id, base });
        id
    }

    pub fn add_edge(&mut self, src: usize, dst: usize, weight: u32) {
        self.edges.push(GraphEdge { src, dst, weight });
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render in Graphviz DOT format.
    pub fn serialize_to_dot(&self) -> String {
        let mut out = String::with_capacity(32 + self.nodes.len() * 24 + self.edges.len() * 24);
        out.push_str("digraph graphname {\n");
        for node in &self.nodes {
            // Writing to a String cannot fail
            let _ = writeln!(out, "{} [label=\"{}\"];", node.id, node.base as char);
        }
        for edge in &self.edges {
            let _ = writeln!(
                out,
                "{} -> {} [label=\"{}\"];",
                edge.src, edge.dst, edge.weight
            );
        }
        out.push('}');
        out
    }
}
