use error_stack::report;

use crate::graph::{reverse, Cost, EdgeId, Flow, FlowGraph, NodeId};
use crate::FlowError;
use crate::Result;

/// Cost added to the sink edge of every augmenting path.
pub const DEFAULT_CONVEX_PENALTY: Cost = 50;

/// Totals accumulated by [`MinCostMaxFlow::solve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct McmfResult {
    pub total_flow: Flow,
    pub total_cost: Cost,
}

/// One augmentation step, reported in the order the solver performs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Augmentation {
    /// Flow pushed along the path
    pub bottleneck: Flow,
    /// Cost of one unit along the path
    pub path_cost: Cost,
    /// Number of edges on the path
    pub hops: usize,
}

/// Shortest-path tree computed by [`find_cheapest_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheapestPath<const NODES: usize> {
    /// Cost from the source, `None` when unreachable
    pub distances: [Option<Cost>; NODES],
    /// Edge that last improved each node's distance
    pub predecessors: [Option<EdgeId>; NODES],
    /// Whether the sink is reachable through positive residual capacity
    pub found: bool,
}

impl<const NODES: usize> CheapestPath<NODES> {
    /// Walk the path from `sink` back to `source`, collecting the edges in
    /// that (backward) order.
    fn trace<const EDGES: usize>(
        &self,
        graph: &FlowGraph<NODES, EDGES>,
        source: NodeId,
        sink: NodeId,
    ) -> PathEdges<NODES> {
        let mut path = PathEdges {
            edges: [0; NODES],
            len: 0,
        };
        let mut node = sink;
        while node != source && path.len < NODES {
            let Some(edge) = self.predecessors[node] else {
                break;
            };
            path.edges[path.len] = edge;
            path.len += 1;
            node = graph.edge(reverse(edge)).to;
        }
        path
    }
}

/// Edges of one augmenting path, sink edge first.
struct PathEdges<const NODES: usize> {
    edges: [EdgeId; NODES],
    len: usize,
}

impl<const NODES: usize> PathEdges<NODES> {
    fn as_slice(&self) -> &[EdgeId] {
        &self.edges[..self.len]
    }
}

/// Fixed-size FIFO used by SPFA. A node is never queued twice, so `NODES`
/// slots are always enough.
struct WorkQueue<const NODES: usize> {
    slots: [NodeId; NODES],
    head: usize,
    len: usize,
}

impl<const NODES: usize> WorkQueue<NODES> {
    fn new() -> Self {
        Self {
            slots: [0; NODES],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, node: NodeId) {
        debug_assert!(self.len < NODES, "work queue overflow");
        self.slots[(self.head + self.len) % NODES] = node;
        self.len += 1;
    }

    fn pop(&mut self) -> Option<NodeId> {
        if self.len == 0 {
            return None;
        }
        let node = self.slots[self.head];
        self.head = (self.head + 1) % NODES;
        self.len -= 1;
        Some(node)
    }
}

/// Find the cheapest path from `source` to `sink` over edges with positive
/// residual capacity.
///
/// Uses the queue-based Bellman-Ford relaxation (SPFA) because reverse edges
/// carry negative costs. A distance is only overwritten on strict
/// improvement, so among equal-cost candidates the first one discovered wins:
/// the most recently added edge of a node's adjacency list.
///
/// Edges leaving the sink are never relaxed; an augmenting path ends at the
/// sink and never passes through it.
pub fn find_cheapest_path<const NODES: usize, const EDGES: usize>(
    graph: &FlowGraph<NODES, EDGES>,
    source: NodeId,
    sink: NodeId,
) -> Result<CheapestPath<NODES>, FlowError> {
    let nr_nodes = graph.nr_nodes();
    for node in [source, sink] {
        if node >= nr_nodes {
            return Err(report!(FlowError::NodeOutOfRange { node, nr_nodes }));
        }
    }

    let mut path = CheapestPath {
        distances: [None; NODES],
        predecessors: [None; NODES],
        found: false,
    };
    // Edge count of the path recorded for each node; a path of `nr_nodes`
    // edges must repeat a node, which only a negative cycle can cause.
    let mut hops = [0usize; NODES];
    let mut pending = [false; NODES];
    let mut queue = WorkQueue::<NODES>::new();

    path.distances[source] = Some(0);
    queue.push(source);
    pending[source] = true;

    while let Some(u) = queue.pop() {
        pending[u] = false;
        if u == sink {
            continue;
        }
        let Some(distance_u) = path.distances[u] else {
            continue;
        };

        for (id, edge) in graph.adjacent(u) {
            if edge.capacity <= 0 {
                continue;
            }
            let candidate = distance_u.saturating_add(edge.cost);
            let v = edge.to;
            if path.distances[v].is_some_and(|current| current <= candidate) {
                continue;
            }

            path.distances[v] = Some(candidate);
            path.predecessors[v] = Some(id);
            hops[v] = hops[u] + 1;
            if hops[v] >= nr_nodes {
                return Err(report!(FlowError::NegativeCycle)
                    .attach_printable(format!("node {v} reached through {} edges", hops[v])));
            }
            if !pending[v] {
                pending[v] = true;
                queue.push(v);
            }
        }
    }

    path.found = source != sink && path.distances[sink].is_some();
    Ok(path)
}

/// Successive-shortest-path min-cost max-flow solver.
///
/// After every augmentation the edge entering the sink becomes
/// `convex_penalty` more expensive, so routing another unit through the same
/// terminal resource costs more than the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinCostMaxFlow {
    convex_penalty: Cost,
}

impl Default for MinCostMaxFlow {
    fn default() -> Self {
        Self::new(DEFAULT_CONVEX_PENALTY)
    }
}

impl MinCostMaxFlow {
    pub fn new(convex_penalty: Cost) -> Self {
        Self { convex_penalty }
    }

    pub fn convex_penalty(&self) -> Cost {
        self.convex_penalty
    }

    /// Push as much flow as possible from `source` to `sink` at minimum cost.
    pub fn solve<const NODES: usize, const EDGES: usize>(
        &self,
        graph: &mut FlowGraph<NODES, EDGES>,
        source: NodeId,
        sink: NodeId,
    ) -> Result<McmfResult, FlowError> {
        self.solve_observed(graph, source, sink, |_| {})
    }

    /// Same as [`MinCostMaxFlow::solve`], calling `observe` after every
    /// augmentation.
    pub fn solve_observed<const NODES: usize, const EDGES: usize>(
        &self,
        graph: &mut FlowGraph<NODES, EDGES>,
        source: NodeId,
        sink: NodeId,
        mut observe: impl FnMut(&Augmentation),
    ) -> Result<McmfResult, FlowError> {
        let mut result = McmfResult::default();

        loop {
            let cheapest = find_cheapest_path(graph, source, sink)?;
            let (Some(path_cost), Some(sink_edge)) =
                (cheapest.distances[sink], cheapest.predecessors[sink])
            else {
                break;
            };
            if !cheapest.found {
                break;
            }

            let path = cheapest.trace(graph, source, sink);
            let bottleneck = path
                .as_slice()
                .iter()
                .map(|&id| graph.edge(id).capacity)
                .min()
                .unwrap_or(0);
            if bottleneck <= 0 {
                break;
            }

            for &id in path.as_slice() {
                push_flow(graph, id, bottleneck);
            }

            let sink_cost = &mut graph.edge_mut(sink_edge).cost;
            *sink_cost = sink_cost.saturating_add(self.convex_penalty);
            let reverse_cost = &mut graph.edge_mut(reverse(sink_edge)).cost;
            *reverse_cost = reverse_cost.saturating_sub(self.convex_penalty);

            result.total_flow += bottleneck;
            result.total_cost = result
                .total_cost
                .saturating_add(path_cost.saturating_mul(Cost::from(bottleneck)));

            let augmentation = Augmentation {
                bottleneck,
                path_cost,
                hops: path.len,
            };
            tracing::debug!(
                bottleneck = augmentation.bottleneck,
                path_cost = augmentation.path_cost,
                hops = augmentation.hops,
                "augmented"
            );
            observe(&augmentation);
        }

        Ok(result)
    }
}

/// Solve with the default convex penalty.
pub fn solve<const NODES: usize, const EDGES: usize>(
    graph: &mut FlowGraph<NODES, EDGES>,
    source: NodeId,
    sink: NodeId,
) -> Result<McmfResult, FlowError> {
    MinCostMaxFlow::default().solve(graph, source, sink)
}

/// Move `amount` units along `id`. Flow previously recorded on the reverse
/// edge is cancelled first, so a pair never records flow in both directions.
fn push_flow<const NODES: usize, const EDGES: usize>(
    graph: &mut FlowGraph<NODES, EDGES>,
    id: EdgeId,
    amount: Flow,
) {
    let backward = reverse(id);

    let cancelled = {
        let edge = graph.edge_mut(backward);
        edge.capacity += amount;
        let cancelled = edge.flow.clamp(0, amount);
        edge.flow -= cancelled;
        cancelled
    };

    let edge = graph.edge_mut(id);
    edge.capacity -= amount;
    edge.flow += amount - cancelled;
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::graph::Edge;

    type Graph = FlowGraph<8, 32>;

    #[test]
    fn test_mcmf_can_map_one_vm_to_one_cpu() {
        let (source, vm, pcpu, sink) = (0, 1, 2, 3);
        let mut graph = Graph::new(4).unwrap();
        graph.add_edge(source, vm, 1, 0).unwrap();
        graph.add_edge(vm, pcpu, 1, 1).unwrap();
        graph.add_edge(pcpu, sink, 1, 0).unwrap();

        let result = solve(&mut graph, source, sink).unwrap();
        assert_eq!(
            result,
            McmfResult {
                total_flow: 1,
                total_cost: 1
            }
        );

        let source_head = graph.head(source).unwrap();
        assert_eq!(
            *graph.edge(source_head),
            Edge {
                to: vm,
                capacity: 0,
                cost: 0,
                flow: 1,
                next: None,
            }
        );
        assert_eq!(
            *graph.edge(reverse(source_head)),
            Edge {
                to: source,
                capacity: 1,
                cost: 0,
                flow: 0,
                next: None,
            }
        );

        let vm_head = graph.head(vm).unwrap();
        assert_eq!(
            *graph.edge(vm_head),
            Edge {
                to: pcpu,
                capacity: 0,
                cost: 1,
                flow: 1,
                next: Some(reverse(source_head)),
            }
        );
        assert_eq!(graph.edge(reverse(vm_head)).capacity, 1);
        assert_eq!(graph.edge(reverse(vm_head)).cost, -1);

        // The sink edge carries the convex penalty after being used once.
        let pcpu_head = graph.head(pcpu).unwrap();
        assert_eq!(
            *graph.edge(pcpu_head),
            Edge {
                to: sink,
                capacity: 0,
                cost: DEFAULT_CONVEX_PENALTY,
                flow: 1,
                next: Some(reverse(vm_head)),
            }
        );
        assert_eq!(
            graph.edge(reverse(pcpu_head)).cost,
            -DEFAULT_CONVEX_PENALTY
        );
        assert_eq!(graph.edge(reverse(pcpu_head)).capacity, 1);
    }

    #[test]
    fn test_mcmf_can_map_two_vm_to_two_cpu_using_reverse_edge() {
        let (source, vm_1, vm_2, pcpu_1, pcpu_2, sink) = (0, 1, 2, 3, 4, 5);
        let mut graph = Graph::new(6).unwrap();
        graph.add_edge(source, vm_1, 1, 0).unwrap();
        let vm_1_pcpu_1 = graph.add_edge(vm_1, pcpu_1, 1, 1).unwrap();
        graph.add_edge(pcpu_1, sink, 1, 0).unwrap();
        graph.add_edge(source, vm_2, 1, 0).unwrap();
        let vm_2_pcpu_2 = graph.add_edge(vm_2, pcpu_2, 1, 10).unwrap();
        graph.add_edge(pcpu_2, sink, 1, 0).unwrap();
        let vm_1_pcpu_2 = graph.add_edge(vm_1, pcpu_2, 1, 3).unwrap();
        let vm_2_pcpu_1 = graph.add_edge(vm_2, pcpu_1, 1, 5).unwrap();

        let mut costs = Vec::new();
        let result = MinCostMaxFlow::default()
            .solve_observed(&mut graph, source, sink, |step| costs.push(step.path_cost))
            .unwrap();

        assert_eq!(
            result,
            McmfResult {
                total_flow: 2,
                total_cost: 8
            }
        );
        // The second path reroutes vm_1 through the reverse of vm_1 -> pcpu_1.
        assert_eq!(costs, vec![1, 7]);

        // Pushing through the reverse edge cancels the earlier unit instead of
        // recording flow in both directions.
        let forward = graph.edge(vm_1_pcpu_1);
        assert_eq!((forward.capacity, forward.flow), (1, 0));
        let backward = graph.edge(reverse(vm_1_pcpu_1));
        assert_eq!((backward.capacity, backward.flow), (0, 0));

        assert_eq!(graph.edge(vm_1_pcpu_2).flow, 1);
        assert_eq!(graph.edge(vm_2_pcpu_1).flow, 1);
        assert_eq!(graph.edge(vm_2_pcpu_2).flow, 0);
        assert_eq!(graph.edge(vm_2_pcpu_2).capacity, 1);
    }

    #[test]
    fn source_equal_to_sink_is_not_an_error() {
        let mut graph = Graph::new(2).unwrap();
        graph.add_edge(0, 1, 1, 1).unwrap();

        let path = find_cheapest_path(&graph, 0, 0).unwrap();
        assert!(!path.found);

        let result = solve(&mut graph, 0, 0).unwrap();
        assert_eq!(result, McmfResult::default());
    }

    #[test]
    fn zero_capacity_network_yields_nothing() {
        let mut graph = Graph::new(3).unwrap();
        graph.add_edge(0, 1, 0, 1).unwrap();
        graph.add_edge(1, 2, 0, 1).unwrap();

        let result = solve(&mut graph, 0, 2).unwrap();
        assert_eq!(result, McmfResult::default());
        assert!(graph.edges().iter().all(|edge| edge.flow == 0));
    }

    #[test]
    fn unknown_terminal_is_rejected() {
        let graph = Graph::new(2).unwrap();
        let err = find_cheapest_path(&graph, 0, 5).unwrap_err();
        assert_eq!(
            err.current_context(),
            &FlowError::NodeOutOfRange {
                node: 5,
                nr_nodes: 2
            }
        );
    }

    #[test]
    fn equal_cost_tie_goes_to_last_added_edge() {
        let (source, a, b, sink) = (0, 1, 2, 3);
        let mut graph = Graph::new(4).unwrap();
        let via_a = graph.add_edge(source, a, 1, 0).unwrap();
        let via_b = graph.add_edge(source, b, 1, 0).unwrap();
        let a_sink = graph.add_edge(a, sink, 1, 4).unwrap();
        let b_sink = graph.add_edge(b, sink, 1, 4).unwrap();

        let path = find_cheapest_path(&graph, source, sink).unwrap();
        assert!(path.found);
        assert_eq!(path.distances[sink], Some(4));
        // b is reached through the most recently added source edge and is
        // dequeued first, so it claims the sink.
        assert_eq!(path.predecessors[b], Some(via_b));
        assert_eq!(path.predecessors[a], Some(via_a));
        assert_eq!(path.predecessors[sink], Some(b_sink));
        assert_ne!(path.predecessors[sink], Some(a_sink));
    }

    #[test]
    fn negative_cycle_is_reported() {
        let mut graph = Graph::new(4).unwrap();
        graph.add_edge(0, 1, 1, 0).unwrap();
        graph.add_edge(1, 2, 1, -5).unwrap();
        graph.add_edge(2, 1, 1, 1).unwrap();
        graph.add_edge(2, 3, 1, 0).unwrap();

        let err = find_cheapest_path(&graph, 0, 3).unwrap_err();
        assert_eq!(err.current_context(), &FlowError::NegativeCycle);
    }

    fn hub_network<const NODES: usize, const EDGES: usize>(graph: &mut FlowGraph<NODES, EDGES>) {
        // source=0, a=1, b=2, hub=3, alt=4, sink=5
        graph.add_edge(0, 1, 1, 0).unwrap();
        graph.add_edge(0, 2, 1, 0).unwrap();
        graph.add_edge(1, 3, 1, 0).unwrap();
        graph.add_edge(2, 3, 1, 0).unwrap();
        graph.add_edge(2, 4, 1, 0).unwrap();
        graph.add_edge(3, 5, 2, 0).unwrap();
        graph.add_edge(4, 5, 1, 30).unwrap();
    }

    #[test]
    fn penalty_discourages_piling_onto_one_sink_edge() {
        let mut graph = Graph::new(6).unwrap();
        hub_network(&mut graph);

        let result = MinCostMaxFlow::new(50).solve(&mut graph, 0, 5).unwrap();
        assert_eq!(
            result,
            McmfResult {
                total_flow: 2,
                total_cost: 30
            }
        );
        // b was moved off the hub once a second hub unit cost 50.
        let hub_sink = graph.adjacent(3).find(|(_, edge)| edge.to == 5).unwrap().1;
        assert_eq!(hub_sink.flow, 1);
        let alt_sink = graph.adjacent(4).find(|(_, edge)| edge.to == 5).unwrap().1;
        assert_eq!(alt_sink.flow, 1);
    }

    #[test]
    fn zero_penalty_is_plain_min_cost_flow() {
        let mut graph = Graph::new(6).unwrap();
        hub_network(&mut graph);

        let result = MinCostMaxFlow::new(0).solve(&mut graph, 0, 5).unwrap();
        assert_eq!(
            result,
            McmfResult {
                total_flow: 2,
                total_cost: 0
            }
        );
        let hub_sink = graph.adjacent(3).find(|(_, edge)| edge.to == 5).unwrap().1;
        assert_eq!(hub_sink.flow, 2);
    }

    #[test]
    fn huge_costs_saturate_instead_of_overflowing() {
        let mut graph = Graph::new(3).unwrap();
        graph.add_edge(0, 1, 1, Cost::MAX).unwrap();
        graph.add_edge(1, 2, 1, 1).unwrap();

        let result = solve(&mut graph, 0, 2).unwrap();
        assert_eq!(
            result,
            McmfResult {
                total_flow: 1,
                total_cost: Cost::MAX
            }
        );
    }
}
