//! Periodic vCPU to pCPU placement.
//!
//! Each cycle samples the host, derives utilization rates, solves a
//! min-cost max-flow placement network and applies the resulting pinning.

use error_stack::Report;

pub mod config;
pub mod domain;
pub mod hypervisor;
pub mod logging;
pub mod scheduler;
pub mod telemetry;

/// Result type using error-stack for context-rich error reporting
pub type Result<T, C> = core::result::Result<T, Report<C>>;
