/*
 * This module defines the graph format the crawler builds and hands to consumers.
 * Nodes are devices keyed by address, edges are undirected physical links.
 */

pub mod edge;
pub mod neighbor;
pub mod network_graph;
pub mod node;
