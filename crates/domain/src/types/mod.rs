//! Domain types and models

pub mod job;
pub mod scan;

pub use job::{Job, JobCounters, JobId, JobStatus, JobUpdate, ScanConfig, ScanRequest};
pub use scan::{CostBreakdown, FailureKind, ScanFailure, ScanResult};
