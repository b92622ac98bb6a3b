//! Placement through a min-cost max-flow network.
//!
//! The network has four layers:
//!
//! ```text
//! source --(1, 0)--> vm_i --(1, affinity + utilization)--> pcpu_j --(k, 0)--> sink
//! ```
//!
//! Every VM can be routed to every pCPU. Staying put costs only the pCPU's
//! utilization while moving adds the migration penalty. Each unit entering
//! the sink from a pCPU makes the next unit through that pCPU more expensive
//! by the co-location penalty.

use error_stack::report;
use error_stack::ResultExt;
use flow_network::Cost;
use flow_network::FlowGraph;
use flow_network::MinCostMaxFlow;
use flow_network::NodeId;

use super::CpuScheduler;
use super::ScheduleError;
use crate::config::SchedulerConfig;
use crate::domain::PcpuId;
use crate::domain::Schedule;
use crate::domain::SystemState;
use crate::domain::MAX_PCPUS;
use crate::domain::MAX_VMS;
use crate::Result;

/// Source, every VM, every pCPU and the sink.
pub const MAX_NODES: usize = 2 + MAX_VMS + MAX_PCPUS;
/// Both directions of every source, placement and sink edge.
pub const MAX_EDGES: usize = (MAX_VMS + MAX_VMS * MAX_PCPUS + MAX_PCPUS) * 2;

pub type PlacementGraph = FlowGraph<MAX_NODES, MAX_EDGES>;

/// Node numbering of one placement network.
#[derive(Debug, Clone, Copy)]
struct Layout {
    nr_vms: usize,
    nr_pcpus: usize,
}

impl Layout {
    const SOURCE: NodeId = 0;

    fn nr_nodes(&self) -> usize {
        self.nr_vms + self.nr_pcpus + 2
    }

    fn vm(&self, index: usize) -> NodeId {
        1 + index
    }

    fn pcpu(&self, index: usize) -> NodeId {
        1 + self.nr_vms + index
    }

    fn sink(&self) -> NodeId {
        self.nr_vms + self.nr_pcpus + 1
    }

    /// Index of the pCPU behind `node`, if `node` is a pCPU node.
    fn pcpu_index(&self, node: NodeId) -> Option<usize> {
        let first = self.pcpu(0);
        (first..first + self.nr_pcpus)
            .contains(&node)
            .then(|| node - first)
    }
}

/// Scheduler solving each decision as a min-cost max-flow problem.
#[derive(Debug, Clone)]
pub struct McmfScheduler {
    config: SchedulerConfig,
    solver: MinCostMaxFlow,
}

impl Default for McmfScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl McmfScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            solver: MinCostMaxFlow::new(config.co_location_penalty),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn placement_cost(&self, current_pcpu: PcpuId, pcpu_id: PcpuId, utilization: f64) -> Cost {
        let affinity = if current_pcpu == pcpu_id {
            0
        } else {
            self.config.migration_penalty
        };
        // Truncates toward zero, NaN becomes 0.
        affinity.saturating_add(utilization as Cost)
    }

    fn build(
        &self,
        graph: &mut PlacementGraph,
        layout: &Layout,
        state: &SystemState,
    ) -> Result<(), ScheduleError> {
        for index in 0..layout.nr_vms {
            graph
                .add_edge(Layout::SOURCE, layout.vm(index), 1, 0)
                .change_context(ScheduleError::Solver)?;
        }

        for (vm_index, vm) in state.vms.iter().enumerate() {
            for (pcpu_index, pcpu) in state.pcpus.iter().enumerate() {
                let cost = self.placement_cost(vm.current_pcpu, pcpu.id, pcpu.utilization_rate);
                graph
                    .add_edge(layout.vm(vm_index), layout.pcpu(pcpu_index), 1, cost)
                    .change_context(ScheduleError::Solver)
                    .attach_printable_lazy(|| format!("placing {} on pCPU {}", vm.name, pcpu.id))?;
            }
        }

        for index in 0..layout.nr_pcpus {
            graph
                .add_edge(
                    layout.pcpu(index),
                    layout.sink(),
                    self.config.max_vms_per_pcpu,
                    0,
                )
                .change_context(ScheduleError::Solver)?;
        }
        Ok(())
    }

    /// The pCPU receiving flow from VM `index`, found by scanning its whole
    /// adjacency list.
    fn assigned_pcpu(
        graph: &PlacementGraph,
        layout: &Layout,
        state: &SystemState,
        index: usize,
    ) -> Option<PcpuId> {
        graph
            .adjacent(layout.vm(index))
            .filter(|(_, edge)| edge.flow > 0)
            .find_map(|(_, edge)| layout.pcpu_index(edge.to))
            .map(|pcpu_index| state.pcpus[pcpu_index].id)
    }
}

impl CpuScheduler for McmfScheduler {
    #[tracing::instrument(level = "debug", skip_all, fields(vms = state.vms.len(), pcpus = state.pcpus.len()))]
    fn schedule(&mut self, state: &SystemState) -> Result<Schedule, ScheduleError> {
        let layout = Layout {
            nr_vms: state.vms.len(),
            nr_pcpus: state.pcpus.len(),
        };
        if layout.nr_vms > MAX_VMS || layout.nr_pcpus > MAX_PCPUS {
            return Err(report!(ScheduleError::ProblemTooLarge {
                nr_vms: layout.nr_vms,
                nr_pcpus: layout.nr_pcpus,
                max_vms: MAX_VMS,
                max_pcpus: MAX_PCPUS,
            }));
        }
        if layout.nr_vms == 0 || layout.nr_pcpus == 0 {
            return Ok(Schedule::unassigned(layout.nr_vms));
        }

        let mut graph =
            PlacementGraph::new(layout.nr_nodes()).change_context(ScheduleError::Solver)?;
        self.build(&mut graph, &layout, state)?;

        let result = self
            .solver
            .solve(&mut graph, Layout::SOURCE, layout.sink())
            .change_context(ScheduleError::Solver)?;

        let vm_to_pcpu = (0..layout.nr_vms)
            .map(|index| Self::assigned_pcpu(&graph, &layout, state, index))
            .collect();

        tracing::debug!(
            total_flow = result.total_flow,
            total_cost = result.total_cost,
            "placement network solved"
        );

        Ok(Schedule {
            vm_to_pcpu,
            num_assigned: result.total_flow.unsigned_abs() as usize,
            total_cost: result.total_cost,
        })
    }
}

/// One-shot placement with the given cost parameters.
pub fn compute_schedule(
    state: &SystemState,
    config: &SchedulerConfig,
) -> Result<Schedule, ScheduleError> {
    McmfScheduler::new(*config).schedule(state)
}
