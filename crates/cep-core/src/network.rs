//! Node/edge topology of the energy system.
//!
//! Nodes and directed edges live in a petgraph graph; the nodal energy
//! balance queries incoming and outgoing edges per node, transport
//! technologies query the reversed edge of an edge. An edge pair `(a,b)` /
//! `(b,a)` is detected automatically and exposed through
//! [`Topology::reversed_edge`].

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::config::EdgeSpec;
use crate::error::{CepError, CepResult};

/// Directed node/edge topology
#[derive(Debug, Clone)]
pub struct Topology {
    graph: DiGraph<String, String>,
    node_idx: HashMap<String, NodeIndex>,
    endpoints: HashMap<String, (String, String)>,
    reversed: HashMap<String, String>,
}

impl Topology {
    /// Build the topology from the system's node and edge lists.
    ///
    /// Edges referencing unknown nodes are a configuration error.
    pub fn new(nodes: &[String], edges: &[EdgeSpec]) -> CepResult<Self> {
        let mut graph = DiGraph::new();
        let mut node_idx = HashMap::new();
        for node in nodes {
            let idx = graph.add_node(node.clone());
            node_idx.insert(node.clone(), idx);
        }

        let mut endpoints = HashMap::new();
        let mut by_pair: HashMap<(String, String), String> = HashMap::new();
        for edge in edges {
            let from = *node_idx.get(&edge.from).ok_or_else(|| {
                CepError::Config(format!(
                    "edge {} references unknown node {}",
                    edge.name, edge.from
                ))
            })?;
            let to = *node_idx.get(&edge.to).ok_or_else(|| {
                CepError::Config(format!(
                    "edge {} references unknown node {}",
                    edge.name, edge.to
                ))
            })?;
            graph.add_edge(from, to, edge.name.clone());
            endpoints.insert(edge.name.clone(), (edge.from.clone(), edge.to.clone()));
            by_pair.insert((edge.from.clone(), edge.to.clone()), edge.name.clone());
        }

        let mut reversed = HashMap::new();
        for ((from, to), name) in &by_pair {
            if let Some(reverse) = by_pair.get(&(to.clone(), from.clone())) {
                reversed.insert(name.clone(), reverse.clone());
            }
        }

        Ok(Self {
            graph,
            node_idx,
            endpoints,
            reversed,
        })
    }

    pub fn node_names(&self) -> Vec<String> {
        self.graph.node_weights().cloned().collect()
    }

    pub fn edge_names(&self) -> Vec<String> {
        self.graph.edge_weights().cloned().collect()
    }

    /// `(from, to)` endpoints of an edge
    pub fn endpoints(&self, edge: &str) -> CepResult<(&str, &str)> {
        self.endpoints
            .get(edge)
            .map(|(from, to)| (from.as_str(), to.as_str()))
            .ok_or_else(|| CepError::Config(format!("unknown edge '{}'", edge)))
    }

    /// The edge running opposite to `edge`, when declared
    pub fn reversed_edge(&self, edge: &str) -> Option<&str> {
        self.reversed.get(edge).map(|s| s.as_str())
    }

    /// Edges ending at `node`
    pub fn edges_into(&self, node: &str) -> CepResult<Vec<String>> {
        self.edges_directed(node, Direction::Incoming)
    }

    /// Edges starting at `node`
    pub fn edges_out_of(&self, node: &str) -> CepResult<Vec<String>> {
        self.edges_directed(node, Direction::Outgoing)
    }

    fn edges_directed(&self, node: &str, direction: Direction) -> CepResult<Vec<String>> {
        let idx = self
            .node_idx
            .get(node)
            .ok_or_else(|| CepError::Config(format!("unknown node '{}'", node)))?;
        Ok(self
            .graph
            .edges_directed(*idx, direction)
            .map(|e| e.weight().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_topology() -> Topology {
        let nodes = vec!["a".to_string(), "b".to_string()];
        let edges = vec![EdgeSpec::new("a_b", "a", "b"), EdgeSpec::new("b_a", "b", "a")];
        Topology::new(&nodes, &edges).unwrap()
    }

    #[test]
    fn test_endpoints() {
        let topo = two_node_topology();
        assert_eq!(topo.endpoints("a_b").unwrap(), ("a", "b"));
    }

    #[test]
    fn test_reversed_edges() {
        let topo = two_node_topology();
        assert_eq!(topo.reversed_edge("a_b"), Some("b_a"));
        assert_eq!(topo.reversed_edge("b_a"), Some("a_b"));
    }

    #[test]
    fn test_directed_queries() {
        let topo = two_node_topology();
        assert_eq!(topo.edges_into("b").unwrap(), vec!["a_b".to_string()]);
        assert_eq!(topo.edges_out_of("b").unwrap(), vec!["b_a".to_string()]);
    }

    #[test]
    fn test_unknown_endpoint_is_config_error() {
        let nodes = vec!["a".to_string()];
        let edges = vec![EdgeSpec::new("a_c", "a", "c")];
        let err = Topology::new(&nodes, &edges).unwrap_err();
        assert!(matches!(err, CepError::Config(_)));
    }

    #[test]
    fn test_one_way_edge_has_no_reverse() {
        let nodes = vec!["a".to_string(), "b".to_string()];
        let edges = vec![EdgeSpec::new("a_b", "a", "b")];
        let topo = Topology::new(&nodes, &edges).unwrap();
        assert_eq!(topo.reversed_edge("a_b"), None);
    }
}
