use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use error_stack::ResultExt;
use serde::Deserialize;
use serde::Serialize;

use super::HostProbe;
use super::HostSample;
use super::ProbeError;
use crate::domain::PcpuId;
use crate::domain::Schedule;
use crate::domain::SystemState;
use crate::domain::VmId;
use crate::Result;

/// Desired pinning of one VM as written to the pinning file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    pub vm_id: VmId,
    pub pcpu: PcpuId,
}

/// Host probe backed by plain files.
///
/// Every query re-reads a YAML [`HostSample`] from `state_file`, written by
/// an external collector. Applied placements are kept in memory and, when a
/// pinning file is configured, written there as a JSON map from VM name to
/// [`Pin`].
#[derive(Debug)]
pub struct FileProbe {
    state_file: PathBuf,
    pinning_file: Option<PathBuf>,
    pins: BTreeMap<String, Pin>,
}

impl FileProbe {
    pub fn new<P: Into<PathBuf>>(state_file: P, pinning_file: Option<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
            pinning_file,
            pins: BTreeMap::new(),
        }
    }

    /// Pins applied so far, keyed by VM name.
    pub fn pins(&self) -> &BTreeMap<String, Pin> {
        &self.pins
    }

    fn write_pins(&self, path: &Path) -> Result<(), ProbeError> {
        let document = serde_json::to_vec_pretty(&self.pins).change_context(ProbeError::WriteFailed)?;

        // Replace atomically so readers never see a partial document.
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, document)
            .change_context(ProbeError::WriteFailed)
            .attach_printable_lazy(|| format!("path: {}", staging.display()))?;
        fs::rename(&staging, path)
            .change_context(ProbeError::WriteFailed)
            .attach_printable_lazy(|| format!("path: {}", path.display()))
    }
}

pub(crate) fn read_sample(path: &Path) -> Result<HostSample, ProbeError> {
    let contents = fs::read_to_string(path)
        .change_context(ProbeError::ReadFailed)
        .attach_printable_lazy(|| format!("path: {}", path.display()))?;
    let sample: HostSample = serde_yaml::from_str(&contents)
        .change_context(ProbeError::ParseFailed)
        .attach_printable_lazy(|| format!("path: {}", path.display()))?;
    sample.validate()?;
    Ok(sample)
}

impl HostProbe for FileProbe {
    fn query(&mut self) -> Result<HostSample, ProbeError> {
        read_sample(&self.state_file)
    }

    fn apply_pinning(
        &mut self,
        state: &SystemState,
        schedule: &Schedule,
    ) -> Result<usize, ProbeError> {
        let mut changed = 0;
        let mut pins = BTreeMap::new();

        for (vm, target) in state.vms.iter().zip(&schedule.vm_to_pcpu) {
            let pcpu = match *target {
                Some(pcpu) if pcpu != vm.current_pcpu => {
                    tracing::info!(
                        vm = %vm.name,
                        from = vm.current_pcpu,
                        to = pcpu,
                        "pinning vCPU"
                    );
                    changed += 1;
                    pcpu
                }
                Some(pcpu) => pcpu,
                None => vm.current_pcpu,
            };
            pins.insert(vm.name.clone(), Pin { vm_id: vm.id, pcpu });
        }
        self.pins = pins;

        if let Some(path) = &self.pinning_file {
            self.write_pins(path)?;
        }
        Ok(changed)
    }
}
