use clap::{Parser, Subcommand};
use utils::version;

use crate::config::daemon::{DaemonArgs, PlanArgs};

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the vCPU pinning daemon
    Daemon(Box<DaemonArgs>),
    /// Compute a single placement and print it as JSON
    Plan(PlanArgs),
}
