//! Inputs and outputs of one scheduling decision.

use flow_network::Cost;
use serde::Deserialize;
use serde::Serialize;

pub type VmId = u32;
pub type PcpuId = usize;

/// Largest number of VMs a single decision accepts.
pub const MAX_VMS: usize = 8;
/// Largest number of pCPUs a single decision accepts.
pub const MAX_PCPUS: usize = 4;

/// A single-vCPU virtual machine as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vm {
    pub id: VmId,
    pub name: String,
    /// pCPU the vCPU currently runs on
    pub current_pcpu: PcpuId,
    /// Share of one pCPU used during the last interval, in percent
    pub usage_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pcpu {
    pub id: PcpuId,
    /// Busy share during the last interval, in percent
    pub utilization_rate: f64,
}

/// Snapshot of the host, fixed for the duration of one decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub vms: Vec<Vm>,
    pub pcpus: Vec<Pcpu>,
}

/// Placement decided for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Indexed like [`SystemState::vms`]; `None` leaves the VM where it is.
    pub vm_to_pcpu: Vec<Option<PcpuId>>,
    pub num_assigned: usize,
    pub total_cost: Cost,
}

impl Schedule {
    /// A schedule that places none of `nr_vms` VMs.
    pub fn unassigned(nr_vms: usize) -> Self {
        Self {
            vm_to_pcpu: vec![None; nr_vms],
            num_assigned: 0,
            total_cost: 0,
        }
    }

    /// Number of VMs that leave their current pCPU.
    pub fn migrations(&self, state: &SystemState) -> usize {
        state
            .vms
            .iter()
            .zip(&self.vm_to_pcpu)
            .filter(|(vm, target)| matches!(target, Some(pcpu) if *pcpu != vm.current_pcpu))
            .count()
    }
}
