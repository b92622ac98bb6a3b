use derive_more::Display;

use crate::graph::NodeId;

/// Errors raised while building or solving a flow network.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// More nodes were requested than the graph was sized for.
    #[display("problem size exceeds bounded capacity: {requested} nodes requested, at most {max} supported")]
    NodeCapacityExceeded { requested: usize, max: usize },
    /// The edge array is full.
    #[display("problem size exceeds bounded capacity: at most {max} edges supported")]
    EdgeCapacityExceeded { max: usize },
    /// An endpoint does not name a node of the graph.
    #[display("node {node} is outside a graph of {nr_nodes} nodes")]
    NodeOutOfRange { node: NodeId, nr_nodes: usize },
    /// Shortest paths are undefined because a negative-cost cycle is reachable.
    #[display("residual network contains a negative-cost cycle")]
    NegativeCycle,
}

impl core::error::Error for FlowError {}
