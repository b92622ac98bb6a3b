use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use similar_asserts::assert_eq;
use test_log::test;
use tokio_util::sync::CancellationToken;
use vcpu_scheduler::hypervisor::CycleError;
use vcpu_scheduler::hypervisor::Hypervisor;
use vcpu_scheduler::scheduler::McmfScheduler;
use vcpu_scheduler::telemetry::file::Pin;
use vcpu_scheduler::telemetry::FileProbe;

fn write_sample(path: &Path, web_pcpu: usize, db_pcpu: usize, idle_ns: [u64; 2]) {
    let sample = format!(
        r#"
vms:
  - id: 1
    name: web
    currentPcpu: {web_pcpu}
    cpuTimeNs: 1000000000
  - id: 2
    name: db
    currentPcpu: {db_pcpu}
    cpuTimeNs: 3000000000
pcpus:
  - id: 0
    idleNs: {}
    utilization: 90
  - id: 1
    idleNs: {}
"#,
        idle_ns[0], idle_ns[1]
    );
    fs::write(path, sample).unwrap();
}

fn read_pins(path: &Path) -> BTreeMap<String, Pin> {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

#[test]
fn test_file_probe_drives_pinning() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("host.yaml");
    let pinning_file = dir.path().join("pinning.json");

    let probe = FileProbe::new(&state_file, Some(pinning_file.clone()));
    let mut hypervisor = Hypervisor::new(probe, McmfScheduler::default(), Duration::from_secs(1));

    // Both VMs share the busy pCPU 0.
    write_sample(&state_file, 0, 0, [0, 0]);
    let first = hypervisor.schedule_once().unwrap();
    assert_eq!(first.state.pcpus[0].utilization_rate, 90.0);
    assert_eq!(first.schedule.vm_to_pcpu, vec![Some(0), Some(1)]);
    assert_eq!(first.schedule.total_cost, 140);
    assert_eq!(first.changed, 1);
    assert_eq!(read_pins(&pinning_file)["db"], Pin { vm_id: 2, pcpu: 1 });

    // The collector reports the new placement; both pCPUs idled the full second.
    write_sample(&state_file, 0, 1, [1_000_000_000, 1_000_000_000]);
    let second = hypervisor.schedule_once().unwrap();
    assert_eq!(second.state.pcpus[0].utilization_rate, 0.0);
    assert_eq!(second.schedule.vm_to_pcpu, vec![Some(0), Some(1)]);
    assert_eq!(second.schedule.total_cost, 0);
    assert_eq!(second.changed, 0);
    assert_eq!(&read_pins(&pinning_file), hypervisor.probe().pins());
}

#[test]
fn test_unsupported_vm_fails_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("host.yaml");
    fs::write(
        &state_file,
        "vms:\n  - {id: 1, name: big, vcpus: 2, currentPcpu: 0, cpuTimeNs: 0}\n",
    )
    .unwrap();

    let mut hypervisor = Hypervisor::new(
        FileProbe::new(&state_file, None),
        McmfScheduler::default(),
        Duration::from_secs(1),
    );
    let err = hypervisor.schedule_once().unwrap_err();
    assert_eq!(err.current_context(), &CycleError::Telemetry);
}

#[test(tokio::test(start_paused = true))]
async fn test_daemon_loop_exits_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("host.yaml");
    let pinning_file = dir.path().join("pinning.json");
    write_sample(&state_file, 0, 1, [0, 0]);

    let mut hypervisor = Hypervisor::new(
        FileProbe::new(&state_file, Some(pinning_file.clone())),
        McmfScheduler::default(),
        Duration::from_secs(5),
    );

    let token = CancellationToken::new();
    token.cancel();
    hypervisor.run(token).await;

    // Cancelled before the first tick, so nothing was pinned.
    assert!(!pinning_file.exists());
    assert!(hypervisor.probe().pins().is_empty());
}
