//! Batch scan operations
//!
//! This module provides the ports a scan needs and the orchestrator that
//! walks a job's identifiers through them.

pub mod ports;
pub mod service;

pub use ports::{CostLookup, FetchError, FetchedItem, ItemFailure, ItemFetcher, ResultSink};
pub use service::ScanOrchestrator;
