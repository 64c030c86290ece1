//! In-memory result sink used when no database path is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sellerscan_core::ResultSink;
use sellerscan_domain::{
    FailureKind, Job, JobId, JobUpdate, Result as DomainResult, ScanConfig, ScanFailure,
    ScanResult, SellerScanError,
};
use serde_json::Value;

#[derive(Default)]
pub struct InMemoryResultSink {
    jobs: RwLock<HashMap<JobId, Job>>,
    results: RwLock<Vec<ScanResult>>,
    failures: RwLock<Vec<ScanFailure>>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_job(&self, job_id: JobId) -> DomainResult<()> {
        if self.jobs.read().contains_key(&job_id) {
            Ok(())
        } else {
            Err(SellerScanError::NotFound(format!("scan job {job_id}")))
        }
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn create_job(
        &self,
        total_items: u64,
        source: &str,
        config: &ScanConfig,
    ) -> DomainResult<JobId> {
        let job = Job::pending(total_items, source.to_string(), config.clone());
        let id = job.id;
        self.jobs.write().insert(id, job);
        Ok(id)
    }

    async fn update_job_status(&self, job_id: JobId, update: &JobUpdate) -> DomainResult<()> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| SellerScanError::NotFound(format!("scan job {job_id}")))?;
        job.apply(update);
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> DomainResult<Job> {
        self.jobs
            .read()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| SellerScanError::NotFound(format!("scan job {job_id}")))
    }

    async fn append_result(
        &self,
        job_id: JobId,
        identifier: &str,
        payload: &Value,
    ) -> DomainResult<()> {
        self.ensure_job(job_id)?;
        self.results.write().push(ScanResult::new(job_id, identifier, payload.clone()));
        Ok(())
    }

    async fn append_failure(
        &self,
        job_id: JobId,
        identifier: &str,
        attempts: u32,
        kind: FailureKind,
        reason: &str,
    ) -> DomainResult<()> {
        self.ensure_job(job_id)?;
        self.failures.write().push(ScanFailure::new(job_id, identifier, attempts, kind, reason));
        Ok(())
    }

    async fn list_results(&self, job_id: JobId) -> DomainResult<Vec<ScanResult>> {
        self.ensure_job(job_id)?;
        Ok(self.results.read().iter().filter(|r| r.job_id == job_id).cloned().collect())
    }

    async fn list_failures(&self, job_id: JobId) -> DomainResult<Vec<ScanFailure>> {
        self.ensure_job(job_id)?;
        Ok(self.failures.read().iter().filter(|f| f.job_id == job_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use sellerscan_domain::{JobCounters, JobStatus};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn results_are_scoped_to_their_job() {
        let sink = InMemoryResultSink::new();
        let first = sink.create_job(1, "manual", &ScanConfig::default()).await.unwrap();
        let second = sink.create_job(1, "manual", &ScanConfig::default()).await.unwrap();

        sink.append_result(first, "B0001", &json!({"ok": true})).await.unwrap();
        sink.append_failure(second, "B0002", 1, FailureKind::Auth, "HTTP 403").await.unwrap();

        assert_eq!(sink.list_results(first).await.unwrap().len(), 1);
        assert!(sink.list_results(second).await.unwrap().is_empty());
        assert_eq!(sink.list_failures(second).await.unwrap()[0].kind, FailureKind::Auth);
    }

    #[tokio::test]
    async fn updates_apply_to_stored_job() {
        let sink = InMemoryResultSink::new();
        let job_id = sink.create_job(4, "manual", &ScanConfig::default()).await.unwrap();

        let counters = JobCounters { processed_count: 1, success_count: 1, failure_count: 0 };
        sink.update_job_status(job_id, &JobUpdate::new(JobStatus::Running, counters))
            .await
            .unwrap();

        let job = sink.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.counters, counters);
    }

    #[tokio::test]
    async fn unknown_jobs_are_not_found() {
        let sink = InMemoryResultSink::new();
        let missing = Uuid::now_v7();
        assert!(matches!(sink.get_job(missing).await, Err(SellerScanError::NotFound(_))));
        assert!(sink.append_result(missing, "B0001", &json!({})).await.is_err());
    }
}
