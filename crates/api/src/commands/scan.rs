//! Scan trigger commands
//!
//! - `start_scan` - validate a request and start a background job
//! - `get_status` - persisted job state and counters
//! - `cancel_scan` - cooperative cancellation of a running job
//! - `scan_report` - wait for a job and collect its results and failures

use sellerscan_domain::{Job, JobId, Result, ScanFailure, ScanRequest, ScanResult, SellerScanError};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::context::AppContext;

/// Final state of a job with everything it recorded
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub job: Job,
    pub results: Vec<ScanResult>,
    pub failures: Vec<ScanFailure>,
}

/// Start scanning `request.identifiers`; returns once the job is running.
#[instrument(skip(ctx, request), fields(items = request.identifiers.len()))]
pub async fn start_scan(ctx: &AppContext, request: ScanRequest) -> Result<JobId> {
    let job_id = ctx.orchestrator.start_scan(request).await?;
    info!(%job_id, "Scan accepted");
    Ok(job_id)
}

pub async fn get_status(ctx: &AppContext, job_id: JobId) -> Result<Job> {
    ctx.orchestrator.get_status(job_id).await
}

/// Returns `false` when the job already finished or runs elsewhere.
pub async fn cancel_scan(ctx: &AppContext, job_id: JobId) -> Result<bool> {
    ctx.orchestrator.cancel(job_id).await
}

pub async fn scan_report(ctx: &AppContext, job_id: JobId) -> Result<ScanReport> {
    let job = ctx.orchestrator.wait(job_id).await?;
    let results = ctx.sink.list_results(job_id).await?;
    let failures = ctx.sink.list_failures(job_id).await?;
    Ok(ScanReport { job, results, failures })
}

pub fn parse_job_id(raw: &str) -> Result<JobId> {
    Uuid::parse_str(raw.trim())
        .map_err(|e| SellerScanError::InvalidInput(format!("invalid job id '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_must_be_uuids() {
        let id = Uuid::now_v7();
        assert_eq!(parse_job_id(&format!(" {id} ")).unwrap(), id);
        assert!(matches!(parse_job_id("job-1"), Err(SellerScanError::InvalidInput(_))));
    }
}
