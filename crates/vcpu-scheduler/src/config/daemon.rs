use std::path::PathBuf;

use clap::{Args, Parser};
use flow_network::Cost;
use flow_network::Flow;
use flow_network::DEFAULT_CONVEX_PENALTY;

use crate::config::scheduler::DEFAULT_MIGRATION_PENALTY;
use crate::config::scheduler::MAX_PENALTY;

/// Cost parameters shared by every subcommand
#[derive(Args, Clone, Debug)]
pub struct CostArgs {
    #[arg(
        long,
        env = "VCPU_SCHED_MIGRATION_PENALTY",
        default_value_t = DEFAULT_MIGRATION_PENALTY,
        value_parser = clap::value_parser!(Cost).range(0..=MAX_PENALTY),
        help = "Extra cost of moving a vCPU away from its current pCPU"
    )]
    pub migration_penalty: Cost,

    #[arg(
        long,
        env = "VCPU_SCHED_CO_LOCATION_PENALTY",
        default_value_t = DEFAULT_CONVEX_PENALTY,
        value_parser = clap::value_parser!(Cost).range(0..=MAX_PENALTY),
        help = "Cost added to a pCPU for every additional VM placed on it"
    )]
    pub co_location_penalty: Cost,

    #[arg(
        long,
        env = "VCPU_SCHED_MAX_VMS_PER_PCPU",
        default_value_t = 1,
        value_parser = clap::value_parser!(Flow).range(1..),
        help = "Number of VMs a single pCPU may host"
    )]
    pub max_vms_per_pcpu: Flow,
}

#[derive(Parser, Clone, Debug)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "VCPU_SCHED_INTERVAL",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds between two scheduling decisions"
    )]
    pub interval: u64,

    #[arg(
        long,
        env = "VCPU_SCHED_STATE_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "YAML host sample refreshed by the collector, e.g. /run/vcpu-sched/host.yaml"
    )]
    pub state_file: PathBuf,

    #[arg(
        long,
        env = "VCPU_SCHED_PINNING_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Where to write the desired pinning as JSON"
    )]
    pub pinning_file: Option<PathBuf>,

    #[arg(
        long,
        env = "VCPU_SCHED_METRICS_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Path for printing scheduling metrics, e.g. /logs/metrics.log"
    )]
    pub metrics_file: Option<PathBuf>,

    #[command(flatten)]
    pub costs: CostArgs,
}

#[derive(Parser, Clone, Debug)]
pub struct PlanArgs {
    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        help = "Current YAML host sample"
    )]
    pub current: PathBuf,

    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        help = "Sample taken one interval earlier, used for utilization deltas"
    )]
    pub previous: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = 5,
        help = "Seconds between the previous and the current sample"
    )]
    pub interval: u64,

    #[command(flatten)]
    pub costs: CostArgs,
}
