//! Per-item scan outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobId;
use crate::impl_domain_status_conversions;

/// Successful item fetch, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: Uuid,
    pub job_id: JobId,
    pub identifier: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(job_id: JobId, identifier: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            identifier: identifier.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Why an item could not be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Credentials rejected (401/403 or exchange failure); never retried
    Auth,
    /// Still throttled (429) after the retry budget
    RateLimited,
    /// Other 4xx, or 5xx after the retry budget
    Upstream,
    /// Connection failure or timeout after the retry budget
    Network,
}

impl_domain_status_conversions!(FailureKind {
    Auth => "auth",
    RateLimited => "rate_limited",
    Upstream => "upstream",
    Network => "network",
});

/// Failed item fetch, immutable once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub id: Uuid,
    pub job_id: JobId,
    pub identifier: String,
    pub attempts: u32,
    pub kind: FailureKind,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl ScanFailure {
    pub fn new(
        job_id: JobId,
        identifier: impl Into<String>,
        attempts: u32,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            identifier: identifier.into(),
            attempts,
            kind,
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }
}

/// Landed cost of a SKU as known to the seller
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub unit_cost: f64,
    #[serde(default)]
    pub shipping_cost: f64,
    #[serde(default)]
    pub other_costs: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.unit_cost + self.shipping_cost + self.other_costs
    }
}
