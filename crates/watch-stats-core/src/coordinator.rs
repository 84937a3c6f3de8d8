//! Job lifecycle for uploads: background processing of every (profile, year)
//! unit plus a priority path that can jump the queue.
//!
//! A job walks its units in order on a spawned task, waiting on the job's
//! [`Gate`] before each one. A priority request closes the gate, computes its
//! unit right away and reopens the gate when its hold is dropped. Results are
//! committed with a compare-and-swap on `uploaded_at`, so neither path can
//! overwrite a result the other stored after it last looked.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use watch_stats_config::{Config, RowErrorPolicy};
use watch_stats_models::{
    AnalyticsPayload, JobId, JobStatus, ProfileYears, ResultKey, UserId, WorkUnit, YearlyTrends,
};

use crate::aggregator::{yearly_trends, DEFAULT_TOP_TITLES};
use crate::cache::EphemeralCache;
use crate::codec::{JobData, JobDataCodec};
use crate::error::{CoordinatorError, Result};
use crate::export::ViewingExport;
use crate::gate::Gate;
use crate::normalizer::normalize;
use crate::partitioner::{discover_units, processing_order, should_process};
use crate::pipeline::UnitPipeline;
use crate::resolver::Catalog;
use crate::store::{CommitOutcome, ResultStore};

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// How long an upload's raw data stays cached
    pub job_data_ttl: Duration,
    /// How long a finished job stays queryable
    pub status_ttl: Duration,
    pub row_error_policy: RowErrorPolicy,
    pub top_titles: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            job_data_ttl: Duration::from_secs(1800),
            status_ttl: Duration::from_secs(3600),
            row_error_policy: RowErrorPolicy::Skip,
            top_titles: DEFAULT_TOP_TITLES,
        }
    }
}

impl From<&Config> for CoordinatorOptions {
    fn from(config: &Config) -> Self {
        Self {
            job_data_ttl: config.jobs.job_data_ttl(),
            status_ttl: config.jobs.status_ttl(),
            row_error_policy: config.analytics.row_error_policy,
            top_titles: config.analytics.top_titles,
        }
    }
}

/// Returned by [`Coordinator::submit_upload`] before any unit is processed.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub job_id: JobId,
    pub profile_years: ProfileYears,
    /// Hours per year for each profile, across the whole upload
    pub yearly_watchtime: YearlyTrends,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
    pub job_id: JobId,
    /// `scheduled`, `running`, `completed`, `error` or `not_found`
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
}

/// Answer to a result lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultResponse {
    Ready { data: AnalyticsPayload },
    PriorityProcessing { message: String },
    Processing { message: String },
    NotFound { message: String },
}

/// Answer to a synchronous priority request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PriorityResponse {
    Ready { data: AnalyticsPayload },
    Error { message: String },
}

impl From<Result<AnalyticsPayload>> for PriorityResponse {
    fn from(result: Result<AnalyticsPayload>) -> Self {
        match result {
            Ok(data) => PriorityResponse::Ready { data },
            Err(e) => PriorityResponse::Error { message: e.to_string() },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PriorityTrigger {
    Ready(AnalyticsPayload),
    AlreadyProcessing,
    Started,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub units_computed: u64,
    pub priority_requests: u64,
    pub race_skips: u64,
    pub unit_failures: u64,
}

#[derive(Debug, Default)]
struct Metrics {
    units_computed: AtomicU64,
    priority_requests: AtomicU64,
    race_skips: AtomicU64,
    unit_failures: AtomicU64,
}

impl Metrics {
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            units_computed: self.units_computed.load(Ordering::Relaxed),
            priority_requests: self.priority_requests.load(Ordering::Relaxed),
            race_skips: self.race_skips.load(Ordering::Relaxed),
            unit_failures: self.unit_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
struct StatusRecord {
    status: JobStatus,
    message: String,
    error: Option<String>,
    finished_at: Option<Instant>,
}

struct JobState {
    id: JobId,
    user: UserId,
    units: Vec<WorkUnit>,
    profile_years: ProfileYears,
    started_at: DateTime<Utc>,
    /// Units handled so far by the background loop
    cursor: AtomicUsize,
    gate: Gate,
    status: watch::Sender<StatusRecord>,
}

impl JobState {
    fn new(id: JobId, user: UserId, profile_years: ProfileYears) -> Self {
        let (status, _) = watch::channel(StatusRecord {
            status: JobStatus::Scheduled,
            message: "Job scheduled".to_string(),
            error: None,
            finished_at: None,
        });
        Self {
            id,
            user,
            units: processing_order(&profile_years),
            profile_years,
            started_at: Utc::now(),
            cursor: AtomicUsize::new(0),
            gate: Gate::new(),
            status,
        }
    }

    fn cache_key(&self) -> String {
        job_data_key(&self.user, &self.id)
    }

    fn set_status(&self, status: JobStatus, message: String, error: Option<String>) {
        let finished_at = status.is_terminal().then(Instant::now);
        self.status.send_replace(StatusRecord {
            status,
            message,
            error,
            finished_at,
        });
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.status
            .borrow()
            .finished_at
            .map_or(false, |finished| finished.elapsed() >= ttl)
    }

    fn progress(&self) -> JobProgress {
        JobProgress {
            processed: self.cursor.load(Ordering::SeqCst).min(self.units.len()),
            total: self.units.len(),
        }
    }
}

fn job_data_key(user: &UserId, job_id: &JobId) -> String {
    format!("job_data:{}:{}", user, job_id)
}

#[derive(Debug, Default)]
struct RunSummary {
    computed: usize,
    skipped: usize,
    failed: usize,
}

enum UnitOutcome {
    Stored,
    AlreadyMaterialized,
}

struct Inner {
    store: Arc<dyn ResultStore>,
    cache: Arc<dyn EphemeralCache>,
    pipeline: UnitPipeline,
    codec: JobDataCodec,
    options: CoordinatorOptions,
    jobs: RwLock<HashMap<JobId, Arc<JobState>>>,
    in_flight: Mutex<HashSet<ResultKey>>,
    metrics: Metrics,
}

/// Marks a key as having a priority request in flight until dropped.
struct InFlightGuard {
    inner: Arc<Inner>,
    key: ResultKey,
}

impl InFlightGuard {
    fn acquire(inner: &Arc<Inner>, key: ResultKey) -> Option<Self> {
        let mut in_flight = inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(Self {
            inner: inner.clone(),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.key);
    }
}

/// Shared handle to the job engine. Cloning is cheap.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn ResultStore>,
        cache: Arc<dyn EphemeralCache>,
        catalog: Arc<Catalog>,
        options: CoordinatorOptions,
    ) -> Self {
        let pipeline = UnitPipeline::new(catalog, options.row_error_policy, options.top_titles);
        Self {
            inner: Arc::new(Inner {
                store,
                cache,
                pipeline,
                codec: JobDataCodec::default(),
                options,
                jobs: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
                metrics: Metrics::default(),
            }),
        }
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.inner.options
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Accept an upload and start processing it in the background.
    ///
    /// Returns as soon as the raw data is cached and the job is registered.
    #[instrument(skip(self, export, user), fields(user = %user, rows = export.len()))]
    pub async fn submit_upload(&self, export: ViewingExport, user: UserId) -> Result<Submission> {
        self.prune_finished_jobs().await;
        export.validate_columns()?;

        let job_id = JobId::generate();
        let policy = self.inner.options.row_error_policy;
        let codec = self.inner.codec;
        let data_job_id = job_id.clone();
        let data_user = user.clone();

        let (profile_years, yearly_watchtime, encoded) =
            tokio::task::spawn_blocking(move || -> Result<(ProfileYears, YearlyTrends, Vec<u8>)> {
                let normalized = normalize(&export.records, policy)?;
                if !normalized.skipped.is_empty() {
                    warn!("Skipped {} malformed rows while partitioning upload", normalized.skipped.len());
                }
                let profile_years = discover_units(&normalized.records);
                let yearly_watchtime = yearly_trends(&normalized.records);
                let data = JobData {
                    job_id: data_job_id,
                    user: data_user,
                    profile_years: profile_years.clone(),
                    records: export.records,
                };
                Ok((profile_years, yearly_watchtime, codec.encode(&data)?))
            })
            .await
            .map_err(|e| CoordinatorError::TaskFailed(e.to_string()))??;

        let job = Arc::new(JobState::new(job_id.clone(), user, profile_years.clone()));
        self.inner
            .cache
            .set(&job.cache_key(), encoded, self.inner.options.job_data_ttl)
            .await?;

        let total = job.units.len();
        job.set_status(JobStatus::Running, format!("Processing {} units", total), None);
        self.inner.jobs.write().await.insert(job_id.clone(), job.clone());
        self.spawn_background(job);

        info!(job_id = %job_id, units = total, "Upload accepted");
        Ok(Submission {
            job_id,
            profile_years,
            yearly_watchtime,
            status: JobStatus::Running,
            message: format!("Upload accepted, processing {} units in the background", total),
        })
    }

    fn spawn_background(&self, job: Arc<JobState>) {
        let worker = {
            let coordinator = self.clone();
            let job = job.clone();
            tokio::spawn(async move { coordinator.run_background(job).await })
        };

        let coordinator = self.clone();
        tokio::spawn(async move {
            let outcome = match worker.await {
                Ok(Ok(summary)) => Ok(summary),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("Background processing aborted: {}", e)),
            };
            coordinator.finish_job(&job, outcome).await;
        });
    }

    async fn run_background(&self, job: Arc<JobState>) -> Result<RunSummary> {
        let data = Arc::new(self.load_job_data(&job).await?);
        let mut summary = RunSummary::default();

        // eligibility is judged once, against the job's start time
        let mut eligible = HashSet::new();
        for unit in &job.units {
            let existing = self.inner.store.get(&ResultKey::new(&job.user, unit)).await?;
            if should_process(existing.as_ref(), unit, job.started_at) {
                eligible.insert(unit.clone());
            } else {
                debug!(job_id = %job.id, profile = %unit.profile_name, year = unit.year, "Stored result is final, skipping");
            }
        }

        for unit in &job.units {
            job.gate.wait_open().await;

            if !eligible.contains(unit) {
                summary.skipped += 1;
            } else {
                match self.process_background_unit(&job, &data, unit).await {
                    Ok(UnitOutcome::Stored) => summary.computed += 1,
                    Ok(UnitOutcome::AlreadyMaterialized) => summary.skipped += 1,
                    Err(e) => {
                        self.inner.metrics.unit_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(job_id = %job.id, profile = %unit.profile_name, year = unit.year, "Unit failed: {}", e);
                        summary.failed += 1;
                    }
                }
            }

            job.cursor.fetch_add(1, Ordering::SeqCst);
        }

        Ok(summary)
    }

    async fn process_background_unit(&self, job: &JobState, data: &Arc<JobData>, unit: &WorkUnit) -> Result<UnitOutcome> {
        let key = ResultKey::new(&job.user, unit);
        let existing = self.inner.store.get(&key).await?;

        if let Some(stored) = &existing {
            if stored.uploaded_at > job.started_at {
                self.inner.metrics.race_skips.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = %job.id, profile = %unit.profile_name, year = unit.year, "Already materialized since job start");
                return Ok(UnitOutcome::AlreadyMaterialized);
            }
        }

        let payload = self.compute_unit(data.clone(), unit.clone()).await?;
        let expected = existing.map(|stored| stored.uploaded_at);

        match self.inner.store.compare_and_upsert(&key, expected, payload, Utc::now()).await? {
            CommitOutcome::Written(_) => {
                info!(job_id = %job.id, profile = %unit.profile_name, year = unit.year, operation = "background", "Stored result");
                Ok(UnitOutcome::Stored)
            }
            CommitOutcome::Conflict(_) => {
                self.inner.metrics.race_skips.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = %job.id, profile = %unit.profile_name, year = unit.year, "Lost commit race, keeping stored result");
                Ok(UnitOutcome::AlreadyMaterialized)
            }
        }
    }

    async fn finish_job(&self, job: &JobState, outcome: std::result::Result<RunSummary, String>) {
        match outcome {
            Ok(summary) => {
                info!(
                    job_id = %job.id,
                    computed = summary.computed,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "Job completed"
                );
                let message = format!(
                    "Processed {} units ({} computed, {} skipped, {} failed)",
                    job.units.len(),
                    summary.computed,
                    summary.skipped,
                    summary.failed
                );
                job.set_status(JobStatus::Completed, message, None);
            }
            Err(message) => {
                error!(job_id = %job.id, "Job failed: {}", message);
                job.set_status(JobStatus::Error, "Processing failed".to_string(), Some(message));
            }
        }

        if let Err(e) = self.inner.cache.delete(&job.cache_key()).await {
            warn!(job_id = %job.id, "Failed to evict job data: {}", e);
        }
    }

    /// Compute one unit right away, pausing the job's background work meanwhile.
    ///
    /// A stored result is returned as-is without recomputation.
    #[instrument(skip(self, job_id), fields(job_id = %job_id))]
    pub async fn priority_process(&self, job_id: &JobId, profile: &str, year: i32) -> Result<AnalyticsPayload> {
        self.inner.metrics.priority_requests.fetch_add(1, Ordering::Relaxed);

        let job = self
            .job(job_id)
            .await
            .ok_or_else(|| CoordinatorError::JobNotFound(job_id.clone()))?;
        let unit = WorkUnit::new(profile, year);
        let key = ResultKey::new(&job.user, &unit);

        if let Some(existing) = self.inner.store.get(&key).await? {
            debug!("Returning stored result");
            return Ok(existing.data);
        }

        let _hold = job.gate.close();
        let data = Arc::new(self.load_job_data(&job).await?);
        let payload = self.compute_unit(data, unit).await?;

        match self.inner.store.compare_and_upsert(&key, None, payload.clone(), Utc::now()).await? {
            CommitOutcome::Written(stored) => {
                info!(profile, year, operation = "priority", "Stored result");
                Ok(stored.data)
            }
            CommitOutcome::Conflict(current) => {
                self.inner.metrics.race_skips.fetch_add(1, Ordering::Relaxed);
                debug!("Result stored concurrently, returning it");
                Ok(current.map(|stored| stored.data).unwrap_or(payload))
            }
        }
    }

    /// Return a stored result, or start a priority computation for it without waiting.
    pub async fn get_or_trigger_priority(&self, job_id: &JobId, profile: &str, year: i32) -> Result<PriorityTrigger> {
        let job = self
            .job(job_id)
            .await
            .ok_or_else(|| CoordinatorError::JobNotFound(job_id.clone()))?;
        let key = ResultKey::new(&job.user, &WorkUnit::new(profile, year));

        if let Some(existing) = self.inner.store.get(&key).await? {
            return Ok(PriorityTrigger::Ready(existing.data));
        }

        let Some(guard) = InFlightGuard::acquire(&self.inner, key) else {
            return Ok(PriorityTrigger::AlreadyProcessing);
        };

        let coordinator = self.clone();
        let job_id = job_id.clone();
        let profile = profile.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = coordinator.priority_process(&job_id, &profile, year).await {
                warn!(job_id = %job_id, profile = %profile, year, "Priority processing failed: {}", e);
            }
        });

        Ok(PriorityTrigger::Started)
    }

    pub async fn get_result(&self, user: &UserId, profile: &str, year: i32) -> Result<ResultResponse> {
        let unit = WorkUnit::new(profile, year);
        let key = ResultKey::new(user, &unit);

        if let Some(stored) = self.inner.store.get(&key).await? {
            return Ok(ResultResponse::Ready { data: stored.data });
        }

        let priority_in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key);
        if priority_in_flight {
            return Ok(ResultResponse::PriorityProcessing {
                message: format!("Priority processing in progress for {}", unit),
            });
        }

        let owned_by_running_job = self.inner.jobs.read().await.values().any(|job| {
            &job.user == user && !job.status.borrow().status.is_terminal() && job.units.contains(&unit)
        });
        if owned_by_running_job {
            return Ok(ResultResponse::Processing {
                message: format!("{} is still being processed", unit),
            });
        }

        Ok(ResultResponse::NotFound {
            message: format!("No data found for {}", unit),
        })
    }

    pub async fn job_status(&self, job_id: &JobId) -> JobStatusReport {
        match self.job(job_id).await {
            Some(job) => {
                let record = job.status.borrow().clone();
                JobStatusReport {
                    job_id: job_id.clone(),
                    status: record.status.as_str().to_string(),
                    message: record.message,
                    error: record.error,
                    progress: Some(job.progress()),
                }
            }
            None => JobStatusReport {
                job_id: job_id.clone(),
                status: "not_found".to_string(),
                message: "Job not found or expired".to_string(),
                error: None,
                progress: None,
            },
        }
    }

    /// Wait until the job reaches `completed` or `error`.
    pub async fn wait_for_job(&self, job_id: &JobId) -> Result<JobStatus> {
        let job = self
            .job(job_id)
            .await
            .ok_or_else(|| CoordinatorError::JobNotFound(job_id.clone()))?;
        let mut rx = job.status.subscribe();
        let record = rx
            .wait_for(|record| record.status.is_terminal())
            .await
            .map_err(|e| CoordinatorError::TaskFailed(e.to_string()))?;
        Ok(record.status)
    }

    pub async fn job_profile_years(&self, job_id: &JobId) -> Option<ProfileYears> {
        self.job(job_id).await.map(|job| job.profile_years.clone())
    }

    /// Profile -> years with stored results for `user`, newest year first.
    pub async fn list_stored(&self, user: &UserId) -> Result<BTreeMap<String, Vec<i32>>> {
        Ok(self.inner.store.list_partitions(user).await?)
    }

    async fn job(&self, job_id: &JobId) -> Option<Arc<JobState>> {
        let ttl = self.inner.options.status_ttl;
        self.inner
            .jobs
            .read()
            .await
            .get(job_id)
            .filter(|job| !job.expired(ttl))
            .cloned()
    }

    async fn prune_finished_jobs(&self) {
        let ttl = self.inner.options.status_ttl;
        let mut jobs = self.inner.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !job.expired(ttl));
        if jobs.len() < before {
            debug!("Pruned {} finished jobs", before - jobs.len());
        }
    }

    async fn load_job_data(&self, job: &JobState) -> Result<JobData> {
        let bytes = self
            .inner
            .cache
            .get(&job.cache_key())
            .await?
            .ok_or_else(|| CoordinatorError::JobNotFound(job.id.clone()))?;

        let codec = self.inner.codec;
        let data = tokio::task::spawn_blocking(move || codec.decode(&bytes))
            .await
            .map_err(|e| CoordinatorError::TaskFailed(e.to_string()))??;
        Ok(data)
    }

    /// Run the unit pipeline on the blocking pool. A panic becomes a unit error.
    async fn compute_unit(&self, data: Arc<JobData>, unit: WorkUnit) -> Result<AnalyticsPayload> {
        let pipeline = self.inner.pipeline.clone();
        let task_unit = unit.clone();
        let joined = tokio::task::spawn_blocking(move || pipeline.compute(&data.records, &task_unit)).await;

        match joined {
            Ok(Ok(payload)) => {
                self.inner.metrics.units_computed.fetch_add(1, Ordering::Relaxed);
                Ok(payload)
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(CoordinatorError::UnitProcessing {
                unit,
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
