use flow_network::Cost;
use flow_network::Flow;
use flow_network::DEFAULT_CONVEX_PENALTY;
use serde::Deserialize;
use serde::Serialize;

use crate::config::daemon::CostArgs;

/// Extra cost of moving a vCPU off its current pCPU.
pub const DEFAULT_MIGRATION_PENALTY: Cost = 50;

/// Upper bound accepted for either penalty on the command line.
pub const MAX_PENALTY: Cost = 1_000_000;

/// Cost parameters of the placement network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    pub migration_penalty: Cost,
    /// Added to a pCPU each time one more VM lands on it
    pub co_location_penalty: Cost,
    pub max_vms_per_pcpu: Flow,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            migration_penalty: DEFAULT_MIGRATION_PENALTY,
            co_location_penalty: DEFAULT_CONVEX_PENALTY,
            max_vms_per_pcpu: 1,
        }
    }
}

impl From<&CostArgs> for SchedulerConfig {
    fn from(args: &CostArgs) -> Self {
        Self {
            migration_penalty: args.migration_penalty,
            co_location_penalty: args.co_location_penalty,
            max_vms_per_pcpu: args.max_vms_per_pcpu,
        }
    }
}
