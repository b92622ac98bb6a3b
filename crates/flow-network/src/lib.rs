//! Bounded flow networks and a min-cost max-flow solver.
//!
//! This crate provides two components:
//! - [`FlowGraph`]: a fixed-capacity arena of paired forward/reverse edges
//!   with index-linked adjacency lists
//! - [`MinCostMaxFlow`]: successive shortest paths over SPFA relaxation, with a
//!   convex-cost penalty applied to the edge that enters the sink
//!
//! Neither component allocates once the graph is constructed, so a solve has
//! predictable latency when it runs inside a periodic control loop.

use error_stack::Report;

mod error;
pub mod graph;
pub mod mcmf;

/// Result type using error-stack for context-rich error reporting
pub type Result<T, C> = core::result::Result<T, Report<C>>;

pub use error::FlowError;
pub use graph::{reverse, Cost, Edge, EdgeId, Flow, FlowGraph, NodeId};
pub use mcmf::{
    find_cheapest_path, solve, Augmentation, CheapestPath, McmfResult, MinCostMaxFlow,
    DEFAULT_CONVEX_PENALTY,
};
