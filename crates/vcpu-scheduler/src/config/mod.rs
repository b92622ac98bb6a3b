pub mod cli;
pub mod daemon;
pub mod scheduler;

pub use cli::*;
pub use daemon::*;
pub use scheduler::*;
