//! Tracing subscriber setup for the binary.

pub mod logging;

pub use logging::{filter_directives, init_tracing, LogFormat, LOG_FILTER_ENV};
