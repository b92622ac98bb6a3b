use core::fmt;

use error_stack::report;

use crate::FlowError;
use crate::Result;

pub type NodeId = usize;
/// Index into the edge arena. Edges come in pairs: `e ^ 1` is the reverse of `e`.
pub type EdgeId = usize;
pub type Flow = i32;
pub type Cost = i64;

/// Returns the edge paired with `edge`.
pub const fn reverse(edge: EdgeId) -> EdgeId {
    edge ^ 1
}

/// A directed arc of the residual network.
///
/// All edges leaving the same node are chained through `next`, starting from
/// that node's head in [`FlowGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Target node
    pub to: NodeId,
    /// Remaining residual capacity
    pub capacity: Flow,
    /// Cost per unit of flow
    pub cost: Cost,
    /// Net flow routed along this direction
    pub flow: Flow,
    /// Next edge of the same source node, `None` at the end of the list
    pub next: Option<EdgeId>,
}

impl Edge {
    const EMPTY: Edge = Edge {
        to: 0,
        capacity: 0,
        cost: 0,
        flow: 0,
        next: None,
    };
}

/// Flow network stored in fixed-size arrays.
///
/// `NODES` bounds the node count and `EDGES` bounds the number of edge slots
/// (two per [`FlowGraph::add_edge`] call). Every node keeps the index of its
/// most recently added edge, so adjacency lists are walked last-added first.
pub struct FlowGraph<const NODES: usize, const EDGES: usize> {
    edges: [Edge; EDGES],
    heads: [Option<EdgeId>; NODES],
    nr_edges: usize,
    nr_nodes: usize,
}

impl<const NODES: usize, const EDGES: usize> FlowGraph<NODES, EDGES> {
    /// Create an empty graph with `nr_nodes` nodes.
    pub fn new(nr_nodes: usize) -> Result<Self, FlowError> {
        let mut graph = Self {
            edges: [Edge::EMPTY; EDGES],
            heads: [None; NODES],
            nr_edges: 0,
            nr_nodes: 0,
        };
        graph.reset(nr_nodes)?;
        Ok(graph)
    }

    /// Drop every edge and resize the graph to `nr_nodes` nodes.
    pub fn reset(&mut self, nr_nodes: usize) -> Result<(), FlowError> {
        if nr_nodes > NODES {
            return Err(report!(FlowError::NodeCapacityExceeded {
                requested: nr_nodes,
                max: NODES,
            }));
        }
        self.heads.fill(None);
        self.nr_edges = 0;
        self.nr_nodes = nr_nodes;
        Ok(())
    }

    /// Add the edge `u -> v` together with its zero-capacity reverse `v -> u`.
    ///
    /// Returns the index of the forward edge; the reverse edge sits at the
    /// next index.
    pub fn add_edge(
        &mut self,
        u: NodeId,
        v: NodeId,
        capacity: Flow,
        cost: Cost,
    ) -> Result<EdgeId, FlowError> {
        for node in [u, v] {
            if node >= self.nr_nodes {
                return Err(report!(FlowError::NodeOutOfRange {
                    node,
                    nr_nodes: self.nr_nodes,
                }));
            }
        }
        if self.nr_edges + 2 > EDGES {
            return Err(report!(FlowError::EdgeCapacityExceeded { max: EDGES })
                .attach_printable(format!("while adding edge {u} -> {v}")));
        }

        let forward = self.nr_edges;
        self.edges[forward] = Edge {
            to: v,
            capacity,
            cost,
            flow: 0,
            next: self.heads[u],
        };
        self.heads[u] = Some(forward);

        let backward = reverse(forward);
        self.edges[backward] = Edge {
            to: u,
            capacity: 0,
            cost: -cost,
            flow: 0,
            next: self.heads[v],
        };
        self.heads[v] = Some(backward);

        self.nr_edges += 2;
        Ok(forward)
    }

    pub fn nr_nodes(&self) -> usize {
        self.nr_nodes
    }

    pub fn nr_edges(&self) -> usize {
        self.nr_edges
    }

    /// Most recently added edge leaving `node`.
    pub fn head(&self, node: NodeId) -> Option<EdgeId> {
        self.heads[..self.nr_nodes].get(node).copied().flatten()
    }

    /// # Panics
    ///
    /// Panics if `edge` was never added.
    pub fn edge(&self, edge: EdgeId) -> &Edge {
        &self.edges[..self.nr_edges][edge]
    }

    pub(crate) fn edge_mut(&mut self, edge: EdgeId) -> &mut Edge {
        &mut self.edges[..self.nr_edges][edge]
    }

    /// All edges added so far, in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges[..self.nr_edges]
    }

    /// Edges leaving `node`, most recently added first.
    pub fn adjacent(&self, node: NodeId) -> Adjacent<'_, NODES, EDGES> {
        Adjacent {
            graph: self,
            cursor: self.head(node),
        }
    }
}

impl<const NODES: usize, const EDGES: usize> fmt::Debug for FlowGraph<NODES, EDGES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowGraph")
            .field("nr_nodes", &self.nr_nodes)
            .field("nr_edges", &self.nr_edges)
            .field("heads", &&self.heads[..self.nr_nodes])
            .field("edges", &self.edges())
            .finish()
    }
}

/// Iterator over the adjacency list of one node.
pub struct Adjacent<'a, const NODES: usize, const EDGES: usize> {
    graph: &'a FlowGraph<NODES, EDGES>,
    cursor: Option<EdgeId>,
}

impl<'a, const NODES: usize, const EDGES: usize> Iterator for Adjacent<'a, NODES, EDGES> {
    type Item = (EdgeId, &'a Edge);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let edge = self.graph.edge(id);
        self.cursor = edge.next;
        Some((id, edge))
    }
}
