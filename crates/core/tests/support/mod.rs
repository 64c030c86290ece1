//! Shared test helpers for `sellerscan-core` integration tests.
//!
//! In-memory sink and scripted fetchers so orchestrator tests can focus on
//! job behaviour instead of storage or HTTP.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sellerscan_core::{CostLookup, FetchError, FetchedItem, ItemFetcher, ResultSink};
use sellerscan_domain::{
    CostBreakdown, FailureKind, Job, JobId, JobStatus, JobUpdate, Result as DomainResult,
    ScanConfig, ScanFailure, ScanResult, SellerScanError,
};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

/// In-memory mock for `ResultSink`.
///
/// Keeps every status update so tests can assert on transitions, and can be
/// told to fail `append_result` for one identifier.
#[derive(Default)]
pub struct RecordingSink {
    jobs: Mutex<HashMap<JobId, Job>>,
    updates: Mutex<Vec<JobUpdate>>,
    results: Mutex<Vec<ScanResult>>,
    failures: Mutex<Vec<ScanFailure>>,
    broken_identifier: Mutex<Option<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_append_for(&self, identifier: &str) {
        *self.broken_identifier.lock() = Some(identifier.to_string());
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.updates.lock().iter().map(|u| u.status).collect()
    }

    pub fn updates(&self) -> Vec<JobUpdate> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn create_job(
        &self,
        total_items: u64,
        source: &str,
        config: &ScanConfig,
    ) -> DomainResult<JobId> {
        let job = Job::pending(total_items, source.to_string(), config.clone());
        let id = job.id;
        self.jobs.lock().insert(id, job);
        Ok(id)
    }

    async fn update_job_status(&self, job_id: JobId, update: &JobUpdate) -> DomainResult<()> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| SellerScanError::NotFound(format!("job {job_id}")))?;
        job.apply(update);
        self.updates.lock().push(update.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> DomainResult<Job> {
        self.jobs
            .lock()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| SellerScanError::NotFound(format!("job {job_id}")))
    }

    async fn append_result(
        &self,
        job_id: JobId,
        identifier: &str,
        payload: &Value,
    ) -> DomainResult<()> {
        if self.broken_identifier.lock().as_deref() == Some(identifier) {
            return Err(SellerScanError::Database("disk I/O error".to_string()));
        }
        self.results.lock().push(ScanResult::new(job_id, identifier, payload.clone()));
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
        self.failures.lock().push(ScanFailure::new(job_id, identifier, attempts, kind, reason));
        Ok(())
    }

    async fn list_results(&self, job_id: JobId) -> DomainResult<Vec<ScanResult>> {
        Ok(self.results.lock().iter().filter(|r| r.job_id == job_id).cloned().collect())
    }

    async fn list_failures(&self, job_id: JobId) -> DomainResult<Vec<ScanFailure>> {
        Ok(self.failures.lock().iter().filter(|f| f.job_id == job_id).cloned().collect())
    }
}

/// Fetcher whose outcome per identifier is scripted up front.
///
/// Identifiers not listed succeed with `{"asin": identifier}`. Calls beyond
/// `gate_after` block until [`ScriptedFetcher::open_gate`] is called.
pub struct ScriptedFetcher {
    failing: HashMap<String, FailureKind>,
    internal: HashSet<String>,
    panicking: HashSet<String>,
    calls: Mutex<Vec<String>>,
    started: AtomicUsize,
    gate_after: Option<usize>,
    gate: Arc<Semaphore>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            failing: HashMap::new(),
            internal: HashSet::new(),
            panicking: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            gate_after: None,
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn failing(mut self, identifier: &str, kind: FailureKind) -> Self {
        self.failing.insert(identifier.to_string(), kind);
        self
    }

    pub fn internal_error_on(mut self, identifier: &str) -> Self {
        self.internal.insert(identifier.to_string());
        self
    }

    pub fn panicking_on(mut self, identifier: &str) -> Self {
        self.panicking.insert(identifier.to_string());
        self
    }

    pub fn gated_after(mut self, calls: usize) -> Self {
        self.gate_after = Some(calls);
        self
    }

    pub fn open_gate(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ItemFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        identifier: &str,
        max_retries: u32,
    ) -> std::result::Result<FetchedItem, FetchError> {
        let call = self.started.fetch_add(1, Ordering::SeqCst);
        if self.gate_after.is_some_and(|limit| call >= limit) {
            let _permit =
                self.gate.acquire().await.map_err(|e| FetchError::Internal(e.to_string()))?;
        }
        self.calls.lock().push(identifier.to_string());

        if self.panicking.contains(identifier) {
            panic!("fetcher exploded on {identifier}");
        }
        if self.internal.contains(identifier) {
            return Err(FetchError::Internal(format!("decoder state corrupted at {identifier}")));
        }
        if let Some(kind) = self.failing.get(identifier) {
            return Err(FetchError::item(*kind, max_retries + 1, format!("scripted {kind}")));
        }
        Ok(FetchedItem { payload: json!({ "asin": identifier }), attempts: 1 })
    }
}

/// Cost lookup backed by a fixed map
pub struct StaticCosts(pub HashMap<String, CostBreakdown>);

#[async_trait]
impl CostLookup for StaticCosts {
    async fn get_cost(&self, sku: &str) -> DomainResult<Option<CostBreakdown>> {
        Ok(self.0.get(sku).copied())
    }
}

/// Poll the sink until `predicate` holds or two seconds of real time pass
pub async fn wait_until<F>(sink: &RecordingSink, job_id: JobId, predicate: F) -> Job
where
    F: Fn(&Job) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let job = sink.get_job(job_id).await.expect("job exists");
        if predicate(&job) || tokio::time::Instant::now() >= deadline {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

pub fn identifiers(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("ID-{n}")).collect()
}
