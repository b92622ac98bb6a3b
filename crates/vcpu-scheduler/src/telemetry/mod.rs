//! Host introspection: raw samples, derived rates and pinning.

use serde::Deserialize;
use serde::Serialize;

use crate::domain::PcpuId;
use crate::domain::Schedule;
use crate::domain::SystemState;
use crate::domain::VmId;
use crate::Result;

pub mod file;
pub mod utilization;

pub use file::FileProbe;
pub use utilization::derive_state;
pub use utilization::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ProbeError {
    #[display("failed to read host sample")]
    ReadFailed,
    #[display("failed to parse host sample")]
    ParseFailed,
    #[display("failed to write pinning")]
    WriteFailed,
    #[display("VM `{name}` has {vcpus} vCPUs, only single-vCPU VMs are supported")]
    Unsupported { name: String, vcpus: u32 },
}

impl core::error::Error for ProbeError {}

fn single_vcpu() -> u32 {
    1
}

/// Cumulative counters of one VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmSample {
    pub id: VmId,
    pub name: String,
    #[serde(default = "single_vcpu")]
    pub vcpus: u32,
    pub current_pcpu: PcpuId,
    /// Total CPU time consumed since the VM started
    pub cpu_time_ns: u64,
}

/// Cumulative counters of one physical CPU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PcpuSample {
    pub id: PcpuId,
    /// Total idle time since boot
    pub idle_ns: u64,
    /// Busy percentage reported by the host, used until a delta is available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
}

/// Raw counters read from the host at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSample {
    #[serde(default)]
    pub vms: Vec<VmSample>,
    #[serde(default)]
    pub pcpus: Vec<PcpuSample>,
}

impl HostSample {
    /// Reject VMs the scheduler cannot place.
    pub fn validate(&self) -> Result<(), ProbeError> {
        match self.vms.iter().find(|vm| vm.vcpus != 1) {
            Some(vm) => Err(error_stack::report!(ProbeError::Unsupported {
                name: vm.name.clone(),
                vcpus: vm.vcpus,
            })),
            None => Ok(()),
        }
    }
}

/// Access to the host the scheduler runs on
pub trait HostProbe: Send {
    /// Read the current raw counters.
    fn query(&mut self) -> Result<HostSample, ProbeError>;

    /// Move every assigned VM whose placement differs from its current pCPU.
    ///
    /// Returns the number of VMs whose pinning changed.
    fn apply_pinning(&mut self, state: &SystemState, schedule: &Schedule)
        -> Result<usize, ProbeError>;
}
