use std::time::Duration;

use error_stack::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::domain::Schedule;
use crate::domain::SystemState;
use crate::scheduler::CpuScheduler;
use crate::telemetry::derive_state;
use crate::telemetry::HostProbe;
use crate::telemetry::HostSample;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum CycleError {
    #[display("failed to sample host")]
    Telemetry,
    #[display("failed to compute placement")]
    Scheduling,
    #[display("failed to apply pinning")]
    Pinning,
}

impl core::error::Error for CycleError {}

/// Result of one completed scheduling cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub state: SystemState,
    pub schedule: Schedule,
    pub migrations: usize,
    /// Pins actually changed on the host
    pub changed: usize,
}

/// Periodic control loop: sample, schedule, pin.
pub struct Hypervisor<P: HostProbe, S: CpuScheduler> {
    probe: P,
    scheduler: S,
    scheduling_interval: Duration,
    previous: Option<HostSample>,
}

impl<P: HostProbe, S: CpuScheduler> Hypervisor<P, S> {
    pub fn new(probe: P, scheduler: S, scheduling_interval: Duration) -> Self {
        Self {
            probe,
            scheduler,
            scheduling_interval,
            previous: None,
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Run a single cycle.
    ///
    /// The fresh sample replaces the previous one as soon as it is read, so a
    /// failed placement does not distort the next cycle's rates.
    pub fn schedule_once(&mut self) -> Result<CycleOutcome, CycleError> {
        let sample = self.probe.query().change_context(CycleError::Telemetry)?;
        let snapshot = derive_state(&sample, self.previous.as_ref(), self.scheduling_interval);
        self.previous = Some(sample);

        let state = snapshot.state;
        tracing::debug!(
            vms = state.vms.len(),
            pcpus = state.pcpus.len(),
            matched_vms = snapshot.matched_vms,
            "host sampled"
        );

        let schedule = self
            .scheduler
            .schedule(&state)
            .change_context(CycleError::Scheduling)?;
        let migrations = schedule.migrations(&state);

        tracing::info!(
            target: "metrics.schedule",
            num_vms = state.vms.len(),
            num_assigned = schedule.num_assigned,
            total_cost = schedule.total_cost,
            migrations = migrations,
        );
        for pcpu in &state.pcpus {
            tracing::info!(
                target: "metrics.pcpu",
                tag_pcpu = pcpu.id,
                utilization = pcpu.utilization_rate,
            );
        }

        let changed = self
            .probe
            .apply_pinning(&state, &schedule)
            .change_context(CycleError::Pinning)?;

        Ok(CycleOutcome {
            state,
            schedule,
            migrations,
            changed,
        })
    }

    /// Start the scheduling loop
    ///
    /// Cancellation is observed between cycles only.
    pub async fn run(&mut self, cancellation_token: CancellationToken) {
        tracing::info!(interval = ?self.scheduling_interval, "scheduling loop started");
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    tracing::info!("scheduling loop shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(self.scheduling_interval) => {}
            }

            match self.schedule_once() {
                Ok(outcome) => {
                    tracing::info!(
                        assigned = outcome.schedule.num_assigned,
                        changed = outcome.changed,
                        total_cost = outcome.schedule.total_cost,
                        "scheduling cycle complete"
                    );
                }
                Err(e) => {
                    tracing::error!("scheduling cycle failed: {e:?}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use error_stack::report;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::scheduler::McmfScheduler;
    use crate::telemetry::PcpuSample;
    use crate::telemetry::ProbeError;
    use crate::telemetry::VmSample;

    const SECOND: u64 = 1_000_000_000;

    /// Replays queued samples and records every applied schedule.
    #[derive(Default)]
    struct ScriptedProbe {
        samples: VecDeque<HostSample>,
        applied: Vec<Vec<Option<usize>>>,
    }

    impl HostProbe for ScriptedProbe {
        fn query(&mut self) -> Result<HostSample, ProbeError> {
            self.samples
                .pop_front()
                .ok_or_else(|| report!(ProbeError::ReadFailed))
        }

        fn apply_pinning(
            &mut self,
            state: &SystemState,
            schedule: &Schedule,
        ) -> Result<usize, ProbeError> {
            self.applied.push(schedule.vm_to_pcpu.clone());
            Ok(schedule.migrations(state))
        }
    }

    fn sample(idle: [u64; 2], cpu_time: [u64; 2]) -> HostSample {
        HostSample {
            vms: cpu_time
                .iter()
                .enumerate()
                .map(|(index, &cpu_time_ns)| VmSample {
                    id: index as u32,
                    name: format!("vm{index}"),
                    vcpus: 1,
                    current_pcpu: 0,
                    cpu_time_ns,
                })
                .collect(),
            pcpus: idle
                .iter()
                .enumerate()
                .map(|(id, &idle_ns)| PcpuSample {
                    id,
                    idle_ns,
                    utilization: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_cycle_uses_previous_sample_for_rates() {
        let probe = ScriptedProbe {
            samples: VecDeque::from([
                sample([0, 0], [0, 0]),
                // pCPU 0 idled 0.5s of 1s, pCPU 1 idled the full second.
                sample([SECOND / 2, SECOND], [SECOND / 4, 0]),
            ]),
            ..Default::default()
        };
        let mut hypervisor =
            Hypervisor::new(probe, McmfScheduler::default(), Duration::from_secs(1));

        let first = hypervisor.schedule_once().unwrap();
        assert_eq!(first.state.pcpus[0].utilization_rate, 0.0);
        // Both VMs start on pCPU 0; only one may stay.
        assert_eq!(first.schedule.vm_to_pcpu, vec![Some(1), Some(0)]);
        assert_eq!(first.migrations, 1);
        assert_eq!(first.changed, 1);

        let second = hypervisor.schedule_once().unwrap();
        assert_eq!(second.state.pcpus[0].utilization_rate, 50.0);
        assert_eq!(second.state.pcpus[1].utilization_rate, 0.0);
        assert_eq!(second.state.vms[0].usage_rate, 25.0);
        assert_eq!(second.schedule.total_cost, 100);

        assert_eq!(hypervisor.probe().applied.len(), 2);
    }

    #[test]
    fn test_probe_failure_is_reported() {
        let mut hypervisor = Hypervisor::new(
            ScriptedProbe::default(),
            McmfScheduler::default(),
            Duration::from_secs(1),
        );
        let err = hypervisor.schedule_once().unwrap_err();
        assert_eq!(err.current_context(), &CycleError::Telemetry);
        assert!(hypervisor.probe().applied.is_empty());
    }

    #[test(tokio::test(start_paused = true))]
    async fn test_run_stops_when_cancelled() {
        let probe = ScriptedProbe {
            samples: VecDeque::from([sample([0, 0], [0, 0])]),
            ..Default::default()
        };
        let mut hypervisor =
            Hypervisor::new(probe, McmfScheduler::default(), Duration::from_secs(5));

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(12)).await;
                token.cancel();
            })
        };

        hypervisor.run(token).await;
        canceller.await.unwrap();

        // Ticks at 5s and 10s; the second finds no sample and is only logged.
        assert_eq!(hypervisor.probe().applied.len(), 1);
    }
}
