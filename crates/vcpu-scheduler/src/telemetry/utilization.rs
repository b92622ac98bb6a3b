//! Converts cumulative counters into per-interval rates.

use std::time::Duration;

use super::HostSample;
use crate::domain::Pcpu;
use crate::domain::SystemState;
use crate::domain::Vm;

/// Scheduler input derived from two consecutive samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: SystemState,
    /// VMs that were also present in the previous sample
    pub matched_vms: usize,
}

fn percent_of(delta_ns: u64, interval_ns: u128) -> f64 {
    if interval_ns == 0 {
        return 0.0;
    }
    delta_ns as f64 * 100.0 / interval_ns as f64
}

/// Derive rates from `current` against the sample taken one interval earlier.
///
/// VMs are matched by name and pCPUs by id. A VM seen for the first time, or
/// whose counter went backward, gets a rate of 0. A pCPU without a usable
/// delta falls back to the utilization the host reported, or 0.
pub fn derive_state(
    current: &HostSample,
    previous: Option<&HostSample>,
    interval: Duration,
) -> Snapshot {
    let interval_ns = interval.as_nanos();
    let mut matched_vms = 0;

    let vms = current
        .vms
        .iter()
        .map(|vm| {
            let earlier = previous.and_then(|p| p.vms.iter().find(|e| e.name == vm.name));
            if earlier.is_some() {
                matched_vms += 1;
            }
            let usage_rate = earlier
                .and_then(|e| vm.cpu_time_ns.checked_sub(e.cpu_time_ns))
                .map_or(0.0, |delta| percent_of(delta, interval_ns));
            Vm {
                id: vm.id,
                name: vm.name.clone(),
                current_pcpu: vm.current_pcpu,
                usage_rate,
            }
        })
        .collect();

    let pcpus = current
        .pcpus
        .iter()
        .map(|pcpu| {
            let idle = previous
                .and_then(|p| p.pcpus.iter().find(|e| e.id == pcpu.id))
                .and_then(|e| pcpu.idle_ns.checked_sub(e.idle_ns))
                .filter(|_| interval_ns > 0);
            let utilization_rate = match idle {
                Some(delta) => (100.0 - percent_of(delta, interval_ns)).clamp(0.0, 100.0),
                None => pcpu.utilization.unwrap_or(0.0).clamp(0.0, 100.0),
            };
            Pcpu {
                id: pcpu.id,
                utilization_rate,
            }
        })
        .collect();

    Snapshot {
        state: SystemState { vms, pcpus },
        matched_vms,
    }
}
