//! provides logging helpers

use std::io;

use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

pub type StderrLayer<S> = fmt::Layer<S, DefaultFields, Format, fn() -> io::Stderr>;

/// Default filter: INFO, overridable through `RUST_LOG`.
pub fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Human readable layer writing to stderr.
///
/// Left unfiltered so callers can combine it with their own filters.
pub fn get_fmt_layer<S>() -> StderrLayer<S> {
    fmt::layer()
        .with_writer(io::stderr as fn() -> io::Stderr)
        .with_target(true)
}

/// initiate the global tracing subscriber
pub fn init() {
    registry()
        .with(get_fmt_layer().with_filter(env_filter()))
        .init();
}
