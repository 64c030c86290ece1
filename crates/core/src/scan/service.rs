//! Batch scan orchestrator - core business logic
//!
//! A scan walks a shuffled snapshot of identifiers with a bounded pool of
//! workers. Each worker paces itself so the whole job stays near
//! `rate_limit` items per second, records every item as a result or a
//! failure, and checks for cancellation between items. Item failures never
//! stop a job; only internal errors (sink failures, broken fetchers, worker
//! panics) do, and they mark the job `failed`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sellerscan_common::resilience::{SharedClock, SystemClock};
use sellerscan_domain::{
    FailureKind, Job, JobCounters, JobId, JobStatus, JobUpdate, Result, ScanConfig, ScanRequest,
    SellerScanError,
};
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::ports::{CostLookup, FetchError, ItemFetcher, ResultSink};

struct RunningJob {
    cancel: CancellationToken,
    /// Cancelled once the background task has ended
    done: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Starts, tracks and cancels scan jobs
pub struct ScanOrchestrator {
    sink: Arc<dyn ResultSink>,
    fetcher: Arc<dyn ItemFetcher>,
    cost_lookup: Option<Arc<dyn CostLookup>>,
    clock: SharedClock,
    rng: Arc<Mutex<StdRng>>,
    jobs: Mutex<HashMap<JobId, RunningJob>>,
}

impl ScanOrchestrator {
    /// Create an orchestrator using the system clock and an entropy-seeded RNG
    pub fn new(sink: Arc<dyn ResultSink>, fetcher: Arc<dyn ItemFetcher>) -> Self {
        Self {
            sink,
            fetcher,
            cost_lookup: None,
            clock: SystemClock::shared(),
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different clock for pacing delays and timestamps
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Make shuffling and jitter reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    /// Enrich successful payloads with seller cost data
    pub fn with_cost_lookup(mut self, lookup: Arc<dyn CostLookup>) -> Self {
        self.cost_lookup = Some(lookup);
        self
    }

    /// Create a job and start scanning in the background
    ///
    /// The job is `running` by the time this returns.
    #[instrument(skip(self, request), fields(items = request.identifiers.len(), source = %request.source))]
    pub async fn start_scan(&self, request: ScanRequest) -> Result<JobId> {
        request.validate()?;

        let ScanRequest { mut identifiers, config, source } = request;
        let total = identifiers.len() as u64;

        let job_id = self.sink.create_job(total, &source, &config).await?;
        self.sink
            .update_job_status(
                job_id,
                &JobUpdate::new(JobStatus::Running, JobCounters::default())
                    .started_at(self.clock.utc_now()),
            )
            .await?;

        identifiers.shuffle(&mut *self.rng.lock());

        let cancel = CancellationToken::new();
        let run = Arc::new(JobRun {
            job_id,
            total,
            config: config.clone(),
            sink: Arc::clone(&self.sink),
            fetcher: Arc::clone(&self.fetcher),
            cost_lookup: self.cost_lookup.clone(),
            clock: Arc::clone(&self.clock),
            rng: Arc::clone(&self.rng),
            queue: Mutex::new(VecDeque::from(identifiers)),
            counters: AsyncMutex::new(JobCounters::default()),
            halt: cancel.child_token(),
            cancel: cancel.clone(),
            failure: Mutex::new(None),
        });
        let done = CancellationToken::new();
        let done_guard = done.clone().drop_guard();
        let handle = tokio::spawn(async move {
            let _done = done_guard;
            run.execute().await;
        });

        {
            let mut jobs = self.jobs.lock();
            jobs.retain(|_, job| !job.done.is_cancelled());
            jobs.insert(job_id, RunningJob { cancel, done, handle: Some(handle) });
        }

        info!(
            %job_id,
            total,
            concurrency = config.concurrency,
            rate_limit = config.rate_limit,
            "Scan job started"
        );
        Ok(job_id)
    }

    /// Current persisted state of a job
    pub async fn get_status(&self, job_id: JobId) -> Result<Job> {
        self.sink.get_job(job_id).await
    }

    /// Request cooperative cancellation
    ///
    /// Returns `false` when the job is already terminal or is not running in
    /// this process. In-flight items finish before the job stops.
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: JobId) -> Result<bool> {
        let job = self.sink.get_job(job_id).await?;
        if job.status.is_terminal() {
            debug!(%job_id, status = %job.status, "Cancel ignored for finished job");
            return Ok(false);
        }

        let token = self.jobs.lock().get(&job_id).map(|job| job.cancel.clone());
        match token {
            Some(token) => {
                token.cancel();
                info!(%job_id, "Scan job cancellation requested");
                Ok(true)
            }
            None => {
                warn!(%job_id, status = %job.status, "Job is not running in this process");
                Ok(false)
            }
        }
    }

    /// Wait for the background task of a job and return its final state
    ///
    /// The first waiter joins the task and sees its panic, if any; later
    /// waiters only wait for it to end.
    pub async fn wait(&self, job_id: JobId) -> Result<Job> {
        let tracked = self
            .jobs
            .lock()
            .get_mut(&job_id)
            .map(|job| (job.handle.take(), job.done.clone()));

        match tracked {
            Some((Some(handle), _)) => {
                if let Err(err) = handle.await {
                    error!(%job_id, error = %err, "Scan job task ended abnormally");
                    return Err(SellerScanError::Internal(format!(
                        "scan task for {job_id}: {err}"
                    )));
                }
            }
            Some((None, done)) => done.cancelled().await,
            None => {}
        }
        self.sink.get_job(job_id).await
    }
}

/// Base spacing between two items of the same worker
///
/// Each of `concurrency` workers waits `concurrency / rate_limit` seconds so
/// the job as a whole approaches `rate_limit` items per second.
fn base_interval(config: &ScanConfig) -> Duration {
    let seconds = config.concurrency.max(1) as f64 / config.rate_limit;
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// State shared by the workers of one job
struct JobRun {
    job_id: JobId,
    total: u64,
    config: ScanConfig,
    sink: Arc<dyn ResultSink>,
    fetcher: Arc<dyn ItemFetcher>,
    cost_lookup: Option<Arc<dyn CostLookup>>,
    clock: SharedClock,
    rng: Arc<Mutex<StdRng>>,
    queue: Mutex<VecDeque<String>>,
    counters: AsyncMutex<JobCounters>,
    /// Cancelled by the user
    cancel: CancellationToken,
    /// Stops workers; cancelled with `cancel` or by an internal error
    halt: CancellationToken,
    failure: Mutex<Option<String>>,
}

impl JobRun {
    #[instrument(skip(self), fields(job_id = %self.job_id))]
    async fn execute(self: Arc<Self>) {
        let total = usize::try_from(self.total).unwrap_or(usize::MAX);
        let workers = self.config.concurrency.min(total).max(1);

        let mut set = JoinSet::new();
        for worker in 0..workers {
            set.spawn(Arc::clone(&self).work(worker));
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => self.fail(err.to_string()),
                Err(err) => self.fail(format!("scan worker panicked: {err}")),
            }
        }

        self.finish().await;
    }

    async fn work(self: Arc<Self>, worker: usize) -> Result<()> {
        let mut handled = 0_u64;

        loop {
            if self.halt.is_cancelled() {
                debug!(job_id = %self.job_id, worker, "Worker observed stop signal");
                break;
            }
            let Some(identifier) = self.queue.lock().pop_front() else {
                break;
            };

            if handled > 0 {
                let delay = self.inter_item_delay();
                tokio::select! {
                    () = self.halt.cancelled() => {
                        debug!(job_id = %self.job_id, worker, "Worker stopped during pacing delay");
                        break;
                    }
                    () = self.clock.sleep(delay) => {}
                }
            }

            self.process(&identifier).await?;
            handled += 1;
        }

        debug!(job_id = %self.job_id, worker, handled, "Worker finished");
        Ok(())
    }

    fn inter_item_delay(&self) -> Duration {
        let jitter = if self.config.jitter_ms == 0 {
            0
        } else {
            self.rng.lock().gen_range(0..=self.config.jitter_ms)
        };
        base_interval(&self.config).saturating_add(Duration::from_millis(jitter))
    }

    async fn process(&self, identifier: &str) -> Result<()> {
        match self.fetcher.fetch(identifier, self.config.max_retries).await {
            Ok(item) => {
                let payload = self.enrich(identifier, item.payload).await;
                self.sink.append_result(self.job_id, identifier, &payload).await?;
                debug!(job_id = %self.job_id, identifier, attempts = item.attempts, "Item scanned");
                self.record(JobCounters::record_success).await
            }
            Err(FetchError::Item(failure)) => {
                if failure.kind == FailureKind::Auth {
                    error!(
                        job_id = %self.job_id,
                        identifier,
                        attempts = failure.attempts,
                        reason = %failure.message,
                        "SP-API rejected credentials while scanning"
                    );
                } else {
                    warn!(
                        job_id = %self.job_id,
                        identifier,
                        kind = %failure.kind,
                        attempts = failure.attempts,
                        reason = %failure.message,
                        "Item scan failed"
                    );
                }
                self.sink
                    .append_failure(
                        self.job_id,
                        identifier,
                        failure.attempts,
                        failure.kind,
                        &failure.message,
                    )
                    .await?;
                self.record(JobCounters::record_failure).await
            }
            Err(FetchError::Internal(message)) => Err(SellerScanError::Internal(message)),
        }
    }

    async fn enrich(&self, identifier: &str, response: Value) -> Value {
        let Some(lookup) = &self.cost_lookup else {
            return response;
        };

        let cost = match lookup.get_cost(identifier).await {
            Ok(cost) => cost,
            Err(err) => {
                warn!(job_id = %self.job_id, identifier, error = %err, "Cost lookup failed");
                None
            }
        };

        json!({
            "identifier": identifier,
            "response": response,
            "cost": cost,
            "cost_total": cost.map(|c| c.total()),
        })
    }

    async fn record(&self, apply: fn(&mut JobCounters)) -> Result<()> {
        let mut counters = self.counters.lock().await;
        apply(&mut counters);
        self.sink
            .update_job_status(self.job_id, &JobUpdate::new(JobStatus::Running, *counters))
            .await
    }

    fn fail(&self, message: String) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                error!(job_id = %self.job_id, error = %message, "Scan job aborted");
                *failure = Some(message);
            }
        }
        self.halt.cancel();
    }

    async fn finish(&self) {
        let counters = *self.counters.lock().await;
        let failure = self.failure.lock().clone();
        let now = self.clock.utc_now();

        let update = match failure {
            Some(message) => {
                JobUpdate::new(JobStatus::Failed, counters).completed_at(now).error(message)
            }
            None if self.cancel.is_cancelled() && counters.processed_count < self.total => {
                JobUpdate::new(JobStatus::Cancelled, counters).completed_at(now)
            }
            None => JobUpdate::new(JobStatus::Completed, counters).completed_at(now),
        };

        match self.sink.update_job_status(self.job_id, &update).await {
            Ok(()) => info!(
                job_id = %self.job_id,
                status = %update.status,
                processed = counters.processed_count,
                succeeded = counters.success_count,
                failed = counters.failure_count,
                "Scan job finished"
            ),
            Err(err) => error!(
                job_id = %self.job_id,
                status = %update.status,
                error = %err,
                "Failed to persist final job status"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate_limit: f64, concurrency: usize) -> ScanConfig {
        ScanConfig { rate_limit, jitter_ms: 0, max_retries: 0, concurrency }
    }

    #[test]
    fn test_single_worker_interval_is_inverse_rate() {
        assert_eq!(base_interval(&config(1.0, 1)), Duration::from_secs(1));
        assert_eq!(base_interval(&config(4.0, 1)), Duration::from_millis(250));
    }

    #[test]
    fn test_interval_scales_with_workers() {
        assert_eq!(base_interval(&config(2.0, 4)), Duration::from_secs(2));
    }

    #[test]
    fn test_tiny_rate_saturates() {
        assert_eq!(base_interval(&config(f64::MIN_POSITIVE, 8)), Duration::MAX);
    }
}
