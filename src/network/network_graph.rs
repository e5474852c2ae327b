use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use serde::{Deserialize, Serialize};

use crate::network::{
    edge::{TopologyEdge, UndirectedEdgeKey},
    neighbor::NeighborRecord,
    node::{NodeStatus, TopologyNode},
};

/// The topology accumulated by one crawl.
///
/// Nodes are keyed by address (or identity when no address is known) and
/// node_key_to_index_map maps those keys to graph indices to allow safe lookups.
/// The graph only grows: nodes and edges are added or merged, never removed.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    graph: StableUnGraph<TopologyNode, TopologyEdge>,
    node_key_to_index_map: HashMap<String, NodeIndex>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a device that answered a scan with its own name. That name replaces
    /// whatever label the node got when a neighbor first mentioned it.
    pub fn record_device(&mut self, key: &str, label: &str, status: NodeStatus) {
        match self.node_key_to_index_map.get(key) {
            Some(&index) => self.graph[index].set_authoritative_label(label, status),
            None => {
                let mut node = TopologyNode::leaf(key, label);
                node.status = status;
                self.insert_node(node);
            }
        }
    }

    /// Records an adjacency reported by `scanner`. The neighbor is added as a leaf labelled
    /// with its advertised identity if it is not in the graph yet; an existing edge between
    /// the two is merged rather than duplicated. Returns false for self-adjacencies, which
    /// are dropped.
    pub fn record_neighbor(&mut self, scanner: &str, record: &NeighborRecord) -> bool {
        let neighbor_key = record.key();
        if neighbor_key == scanner {
            return false;
        }
        let scanner_index = self.index_or_leaf(scanner, scanner);
        let neighbor_index = self.index_or_leaf(neighbor_key, &record.remote_id);

        match self.graph.find_edge(scanner_index, neighbor_index) {
            Some(edge_index) => self.graph[edge_index].merge(
                scanner,
                record.local_port.clone(),
                record.remote_port.clone(),
            ),
            None => {
                let edge = TopologyEdge::new(scanner, record.local_port.clone(), record.remote_port.clone());
                self.graph.add_edge(scanner_index, neighbor_index, edge);
            }
        }
        true
    }

    fn index_or_leaf(&mut self, key: &str, label: &str) -> NodeIndex {
        match self.node_key_to_index_map.get(key) {
            Some(&index) => index,
            None => self.insert_node(TopologyNode::leaf(key, label)),
        }
    }

    fn insert_node(&mut self, node: TopologyNode) -> NodeIndex {
        let key = node.key.clone();
        let index = self.graph.add_node(node);
        self.node_key_to_index_map.insert(key, index);
        index
    }

    pub fn node(&self, key: &str) -> Option<&TopologyNode> {
        self.node_key_to_index_map.get(key).map(|&index| &self.graph[index])
    }

    pub fn contains_node(&self, key: &str) -> bool {
        self.node_key_to_index_map.contains_key(key)
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<&TopologyEdge> {
        let a = *self.node_key_to_index_map.get(a)?;
        let b = *self.node_key_to_index_map.get(b)?;
        self.graph.find_edge(a, b).map(|edge_index| &self.graph[edge_index])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TopologyNode> {
        self.graph.node_indices().map(|index| &self.graph[index])
    }

    /// Iterates over `(endpoint, endpoint, edge)` triples.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &TopologyEdge)> {
        self.graph.edge_indices().filter_map(|edge_index| {
            let (a, b) = self.graph.edge_endpoints(edge_index)?;
            Some((
                self.graph[a].key.as_str(),
                self.graph[b].key.as_str(),
                &self.graph[edge_index],
            ))
        })
    }

    /// Keys of the nodes adjacent to `key`.
    pub fn neighbors(&self, key: &str) -> Vec<&str> {
        let Some(&index) = self.node_key_to_index_map.get(key) else {
            return Vec::new();
        };
        self.graph
            .neighbors(index)
            .map(|neighbor| self.graph[neighbor].key.as_str())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Underlying petgraph structure for renderers and graph algorithms.
    pub fn as_petgraph(&self) -> &StableUnGraph<TopologyNode, TopologyEdge> {
        &self.graph
    }

    /// Order-independent view of the graph, handed to serializers.
    pub fn snapshot(&self) -> TopologySnapshot {
        let mut nodes: Vec<TopologyNode> = self.nodes().cloned().collect();
        nodes.sort_by(|a, b| a.key.cmp(&b.key));

        let mut links: Vec<SnapshotLink> = self
            .edges()
            .map(|(a, b, edge)| {
                let key = UndirectedEdgeKey::new(a, b);
                SnapshotLink {
                    a_port: edge.port_of(&key.a).map(str::to_string),
                    b_port: edge.port_of(&key.b).map(str::to_string),
                    a: key.a,
                    b: key.b,
                }
            })
            .collect();
        links.sort_by(|x, y| (&x.a, &x.b).cmp(&(&y.a, &y.b)));

        TopologySnapshot { nodes, links }
    }
}

/// Sorted node and link lists. Two crawls of the same network produce equal snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub nodes: Vec<TopologyNode>,
    pub links: Vec<SnapshotLink>,
}

/// A link with endpoints in lexical order and the port on each endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLink {
    pub a: String,
    pub b: String,
    pub a_port: Option<String>,
    pub b_port: Option<String>,
}
