//! Scan job model
//!
//! A job is a point-in-time snapshot of a list of identifiers walked under a
//! fixed [`ScanConfig`]. Its status only moves forward:
//! `pending -> running -> {completed | failed | cancelled}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_SCAN_JITTER_MS, DEFAULT_SCAN_RATE_LIMIT, DEFAULT_SCAN_SOURCE,
    MAX_SCAN_CONCURRENCY, MIN_SCAN_CONCURRENCY,
};
use crate::impl_domain_status_conversions;
use crate::{Result, SellerScanError};

/// Job identifier (UUIDv7, time ordered)
pub type JobId = Uuid;

/// Lifecycle state of a scan job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl_domain_status_conversions!(JobStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl JobStatus {
    /// Completed, failed and cancelled jobs never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Progress counters of a job
///
/// `processed_count == success_count + failure_count` at every persisted
/// update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub processed_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
}

impl JobCounters {
    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.processed_count += 1;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.processed_count += 1;
    }
}

/// Pacing and retry settings of a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Items per second across the whole job
    pub rate_limit: f64,
    /// Upper bound of the random delay added between items
    pub jitter_ms: u64,
    /// Retries per item on transient errors
    pub max_retries: u32,
    /// Number of workers (1..=8)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    MIN_SCAN_CONCURRENCY
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            rate_limit: DEFAULT_SCAN_RATE_LIMIT,
            jitter_ms: DEFAULT_SCAN_JITTER_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            concurrency: MIN_SCAN_CONCURRENCY,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.rate_limit.is_finite() || self.rate_limit <= 0.0 {
            return Err(SellerScanError::InvalidInput(format!(
                "rate_limit must be a positive number, got {}",
                self.rate_limit
            )));
        }
        if !(MIN_SCAN_CONCURRENCY..=MAX_SCAN_CONCURRENCY).contains(&self.concurrency) {
            return Err(SellerScanError::InvalidInput(format!(
                "concurrency must be between {MIN_SCAN_CONCURRENCY} and \
                 {MAX_SCAN_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        Ok(())
    }
}

/// Request to start a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub identifiers: Vec<String>,
    #[serde(flatten)]
    pub config: ScanConfig,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    DEFAULT_SCAN_SOURCE.to_string()
}

impl ScanRequest {
    pub fn new(identifiers: Vec<String>, config: ScanConfig) -> Self {
        Self { identifiers, config, source: default_source() }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Reject requests that could never produce a meaningful job
    ///
    /// Duplicate identifiers are allowed and scanned once per occurrence.
    pub fn validate(&self) -> Result<()> {
        if self.identifiers.is_empty() {
            return Err(SellerScanError::InvalidInput(
                "identifiers must not be empty".to_string(),
            ));
        }
        if self.identifiers.iter().any(|id| id.trim().is_empty()) {
            return Err(SellerScanError::InvalidInput(
                "identifiers must not contain blank values".to_string(),
            ));
        }
        self.config.validate()
    }
}

/// Persisted scan job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub total_items: u64,
    #[serde(flatten)]
    pub counters: JobCounters,
    pub config: ScanConfig,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Internal error message when the job failed
    pub error: Option<String>,
}

impl Job {
    /// New pending job
    pub fn pending(total_items: u64, source: String, config: ScanConfig) -> Self {
        Self {
            id: Uuid::now_v7(),
            status: JobStatus::Pending,
            total_items,
            counters: JobCounters::default(),
            config,
            source,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Apply a status update; timestamps and error already set are kept when
    /// the update leaves them empty
    pub fn apply(&mut self, update: &JobUpdate) {
        self.status = update.status;
        self.counters = update.counters;
        if update.started_at.is_some() {
            self.started_at = update.started_at;
        }
        if update.completed_at.is_some() {
            self.completed_at = update.completed_at;
        }
        if update.error.is_some() {
            self.error.clone_from(&update.error);
        }
    }
}

/// Status transition persisted through the result sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub counters: JobCounters,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn new(status: JobStatus, counters: JobCounters) -> Self {
        Self { status, counters, started_at: None, completed_at: None, error: None }
    }

    #[must_use]
    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    #[must_use]
    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    #[must_use]
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}
