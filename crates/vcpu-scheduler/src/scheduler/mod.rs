use crate::domain::Schedule;
use crate::domain::SystemState;
use crate::Result;

pub mod mcmf;

pub use mcmf::compute_schedule;
pub use mcmf::McmfScheduler;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ScheduleError {
    #[display(
        "problem size exceeds bounded capacity: {nr_vms} VMs and {nr_pcpus} pCPUs requested, \
         at most {max_vms} VMs and {max_pcpus} pCPUs supported"
    )]
    ProblemTooLarge {
        nr_vms: usize,
        nr_pcpus: usize,
        max_vms: usize,
        max_pcpus: usize,
    },
    #[display("flow solver failed")]
    Solver,
}

impl core::error::Error for ScheduleError {}

/// Trait for vCPU placement strategies
pub trait CpuScheduler: Send {
    /// Decide where every VM of `state` should run.
    ///
    /// VMs that cannot be placed are left unassigned rather than failing
    /// the whole decision.
    fn schedule(&mut self, state: &SystemState) -> Result<Schedule, ScheduleError>;
}
