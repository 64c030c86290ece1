//! Port interfaces for batch scan operations

use async_trait::async_trait;
use sellerscan_domain::{
    CostBreakdown, FailureKind, Job, JobId, JobUpdate, Result, ScanConfig, ScanFailure,
    ScanResult,
};
use serde_json::Value;
use thiserror::Error;

/// Durable job/result store
#[async_trait]
pub trait ResultSink: Send + Sync {
    // Jobs
    /// Create a pending job and return its id
    async fn create_job(&self, total_items: u64, source: &str, config: &ScanConfig)
        -> Result<JobId>;

    /// Persist a status transition together with the current counters
    async fn update_job_status(&self, job_id: JobId, update: &JobUpdate) -> Result<()>;

    /// Get a job by its ID (`NotFound` when unknown)
    async fn get_job(&self, job_id: JobId) -> Result<Job>;

    // Items
    /// Record a successful item
    async fn append_result(&self, job_id: JobId, identifier: &str, payload: &Value) -> Result<()>;

    /// Record a failed item
    async fn append_failure(
        &self,
        job_id: JobId,
        identifier: &str,
        attempts: u32,
        kind: FailureKind,
        reason: &str,
    ) -> Result<()>;

    // Queries
    /// Results of a job in insertion order
    async fn list_results(&self, job_id: JobId) -> Result<Vec<ScanResult>>;

    /// Failures of a job in insertion order
    async fn list_failures(&self, job_id: JobId) -> Result<Vec<ScanFailure>>;
}

/// Seller-side cost data keyed by SKU
#[async_trait]
pub trait CostLookup: Send + Sync {
    async fn get_cost(&self, sku: &str) -> Result<Option<CostBreakdown>>;
}

/// Successfully fetched item
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedItem {
    pub payload: Value,
    /// Underlying requests made, retries included
    pub attempts: u32,
}

/// Item-level failure; recorded and the scan moves on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub attempts: u32,
    pub message: String,
}

/// Error returned by an [`ItemFetcher`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The item could not be fetched; the job continues
    #[error("{} failure after {} attempt(s): {}", .0.kind, .0.attempts, .0.message)]
    Item(ItemFailure),

    /// Something is broken beyond this item; the job fails
    #[error("internal fetcher error: {0}")]
    Internal(String),
}

impl FetchError {
    pub fn item(kind: FailureKind, attempts: u32, message: impl Into<String>) -> Self {
        Self::Item(ItemFailure { kind, attempts, message: message.into() })
    }
}

/// Fetches one identifier from the upstream API, retrying transient errors
/// up to `max_retries` times
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    async fn fetch(&self, identifier: &str, max_retries: u32)
        -> std::result::Result<FetchedItem, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::item(FailureKind::RateLimited, 4, "HTTP 429");
        assert_eq!(err.to_string(), "rate_limited failure after 4 attempt(s): HTTP 429");
    }
}
