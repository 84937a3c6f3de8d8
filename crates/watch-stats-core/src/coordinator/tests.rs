use super::*;
use crate::cache::InMemoryCache;
use crate::error::{CacheError, StoreError};
use crate::store::InMemoryResultStore;
use async_trait::async_trait;
use chrono::TimeZone;
use std::sync::atomic::AtomicBool;
use tokio::time::timeout;
use watch_stats_models::{CatalogEntry, RawRecord, StoredResult, WatchSummary};

const WAIT: Duration = Duration::from_secs(5);

fn raw(profile: &str, start: &str, duration: &str, title: &str) -> RawRecord {
    RawRecord {
        profile_name: profile.to_string(),
        start_time: start.to_string(),
        duration: duration.to_string(),
        title: title.to_string(),
        supplemental_video_type: None,
        device_type: "Smart TV".to_string(),
        country: "US (United States)".to_string(),
    }
}

/// Alice: 2021, 2022, 2023. Bob: 2022.
fn export() -> ViewingExport {
    ViewingExport::from_records(vec![
        raw("Alice", "2021-03-01 20:00:00", "01:00:00", "Show A: Season 1: Episode 1"),
        raw("Alice", "2021-03-02 20:00:00", "00:45:00", "Show A: Season 1: Episode 2"),
        raw("Alice", "2022-07-04 18:30:00", "02:00:00", "Movie B"),
        raw("Alice", "2023-01-01 10:00:00", "01:00:00", "Show A: Season 2: Episode 1"),
        raw("Bob", "2022-12-31 23:00:00", "00:30:00", "Movie B"),
    ])
}

fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::new(vec![
        CatalogEntry::new("Show A", "TV Show", "TV-14"),
        CatalogEntry::new("Movie B", "Movie", "PG-13"),
    ]))
}

fn coordinator_with(store: Arc<dyn ResultStore>, cache: Arc<dyn EphemeralCache>) -> Coordinator {
    Coordinator::new(store, cache, catalog(), CoordinatorOptions::default())
}

fn user() -> UserId {
    UserId::new("user-1")
}

fn key(profile: &str, year: i32) -> ResultKey {
    ResultKey::new(&user(), &WorkUnit::new(profile, year))
}

fn empty_payload() -> AnalyticsPayload {
    AnalyticsPayload {
        total_title_watchtime: vec![],
        total_type_watchtime: vec![],
        monthly_watchtime: vec![],
        ratings_watchtime: vec![],
        summary: WatchSummary::default(),
    }
}

async fn wait_for_ready(coordinator: &Coordinator, profile: &str, year: i32) -> AnalyticsPayload {
    timeout(WAIT, async {
        loop {
            if let ResultResponse::Ready { data } = coordinator.get_result(&user(), profile, year).await.unwrap() {
                return data;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("result never became ready")
}

/// Cache whose writes always fail.
struct UnavailableCache;

#[async_trait]
impl EphemeralCache for UnavailableCache {
    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> std::result::Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> std::result::Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> std::result::Result<(), CacheError> {
        Ok(())
    }
}

/// Store that rejects commits for one profile.
struct RejectingStore {
    inner: InMemoryResultStore,
    rejected_profile: String,
}

#[async_trait]
impl ResultStore for RejectingStore {
    async fn get(&self, key: &ResultKey) -> std::result::Result<Option<StoredResult>, StoreError> {
        self.inner.get(key).await
    }

    async fn upsert(
        &self,
        key: &ResultKey,
        data: AnalyticsPayload,
        uploaded_at: DateTime<Utc>,
    ) -> std::result::Result<StoredResult, StoreError> {
        self.inner.upsert(key, data, uploaded_at).await
    }

    async fn compare_and_upsert(
        &self,
        key: &ResultKey,
        expected: Option<DateTime<Utc>>,
        data: AnalyticsPayload,
        uploaded_at: DateTime<Utc>,
    ) -> std::result::Result<CommitOutcome, StoreError> {
        if key.profile_name == self.rejected_profile {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        self.inner.compare_and_upsert(key, expected, data, uploaded_at).await
    }

    async fn list_partitions(&self, user: &UserId) -> std::result::Result<BTreeMap<String, Vec<i32>>, StoreError> {
        self.inner.list_partitions(user).await
    }

    async fn clear(&self) -> std::result::Result<usize, StoreError> {
        self.inner.clear().await
    }
}

/// Store where another writer commits `target` right before the first
/// compare-and-upsert on it lands.
struct InterleavingStore {
    inner: InMemoryResultStore,
    target: ResultKey,
    interleaved: AtomicBool,
}

impl InterleavingStore {
    fn new(target: ResultKey) -> Self {
        Self {
            inner: InMemoryResultStore::new(),
            target,
            interleaved: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ResultStore for InterleavingStore {
    async fn get(&self, key: &ResultKey) -> std::result::Result<Option<StoredResult>, StoreError> {
        self.inner.get(key).await
    }

    async fn upsert(
        &self,
        key: &ResultKey,
        data: AnalyticsPayload,
        uploaded_at: DateTime<Utc>,
    ) -> std::result::Result<StoredResult, StoreError> {
        self.inner.upsert(key, data, uploaded_at).await
    }

    async fn compare_and_upsert(
        &self,
        key: &ResultKey,
        expected: Option<DateTime<Utc>>,
        data: AnalyticsPayload,
        uploaded_at: DateTime<Utc>,
    ) -> std::result::Result<CommitOutcome, StoreError> {
        if key == &self.target && !self.interleaved.swap(true, Ordering::SeqCst) {
            self.inner.upsert(key, empty_payload(), Utc::now()).await?;
        }
        self.inner.compare_and_upsert(key, expected, data, uploaded_at).await
    }

    async fn list_partitions(&self, user: &UserId) -> std::result::Result<BTreeMap<String, Vec<i32>>, StoreError> {
        self.inner.list_partitions(user).await
    }

    async fn clear(&self) -> std::result::Result<usize, StoreError> {
        self.inner.clear().await
    }
}

#[tokio::test]
async fn test_submit_returns_before_processing() {
    let store = Arc::new(InMemoryResultStore::new());
    let coordinator = coordinator_with(store.clone(), Arc::new(InMemoryCache::new()));

    let submission = coordinator.submit_upload(export(), user()).await.unwrap();
    assert_eq!(submission.status, JobStatus::Running);
    assert_eq!(submission.profile_years["Alice"].iter().copied().collect::<Vec<_>>(), vec![2021, 2022, 2023]);
    assert_eq!(submission.profile_years["Bob"].iter().copied().collect::<Vec<_>>(), vec![2022]);

    // nothing has run yet on this single-threaded runtime
    let report = coordinator.job_status(&submission.job_id).await;
    assert_eq!(report.status, "running");
    assert_eq!(report.progress, Some(JobProgress { processed: 0, total: 4 }));
    assert_eq!(store.len().await, 0);

    let status = timeout(WAIT, coordinator.wait_for_job(&submission.job_id)).await.unwrap().unwrap();
    assert_eq!(status, JobStatus::Completed);

    assert_eq!(store.len().await, 4);
    for (profile, year) in [("Alice", 2021), ("Alice", 2022), ("Alice", 2023), ("Bob", 2022)] {
        assert!(store.get(&key(profile, year)).await.unwrap().is_some(), "missing {} {}", profile, year);
    }

    let report = coordinator.job_status(&submission.job_id).await;
    assert_eq!(report.status, "completed");
    assert_eq!(report.progress, Some(JobProgress { processed: 4, total: 4 }));
    assert_eq!(coordinator.metrics().units_computed, 4);
}

#[tokio::test]
async fn test_job_data_evicted_on_completion() {
    let cache = Arc::new(InMemoryCache::new());
    let coordinator = coordinator_with(Arc::new(InMemoryResultStore::new()), cache.clone());

    let submission = coordinator.submit_upload(export(), user()).await.unwrap();
    assert_eq!(cache.len().await, 1);

    timeout(WAIT, coordinator.wait_for_job(&submission.job_id)).await.unwrap().unwrap();
    // eviction happens right after the status flips
    timeout(WAIT, async {
        while cache.len().await > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // the job is still queryable but its data is gone
    let err = coordinator.priority_process(&submission.job_id, "Carol", 2022).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::JobNotFound(_)));
}

#[tokio::test]
async fn test_priority_twice_uses_stored_result() {
    let store = Arc::new(InMemoryResultStore::new());
    let coordinator = coordinator_with(store.clone(), Arc::new(InMemoryCache::new()));
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();

    let job = coordinator.job(&submission.job_id).await.unwrap();
    let hold = job.gate.close();

    let first = coordinator.priority_process(&submission.job_id, "Alice", 2022).await.unwrap();
    let second = coordinator.priority_process(&submission.job_id, "Alice", 2022).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(coordinator.metrics().units_computed, 1);
    assert_eq!(coordinator.metrics().priority_requests, 2);

    assert_eq!(first.total_title_watchtime[0].title, "Movie B");
    assert_eq!(first.total_title_watchtime[0].hrs, 2.0);
    assert_eq!(first.summary.unique_movies, 1);

    match coordinator.get_result(&user(), "Alice", 2022).await.unwrap() {
        ResultResponse::Ready { data } => assert_eq!(data, first),
        other => panic!("expected ready, got {:?}", other),
    }

    drop(hold);
    timeout(WAIT, coordinator.wait_for_job(&submission.job_id)).await.unwrap().unwrap();
    assert_eq!(store.len().await, 4);
    assert_eq!(coordinator.metrics().units_computed, 4);
}

#[tokio::test]
async fn test_mid_queue_priority_is_not_recomputed() {
    let store = Arc::new(InMemoryResultStore::new());
    let coordinator = coordinator_with(store.clone(), Arc::new(InMemoryCache::new()));
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();

    let job = coordinator.job(&submission.job_id).await.unwrap();
    let hold = job.gate.close();

    let data = coordinator.priority_process(&submission.job_id, "Bob", 2022).await.unwrap();
    let stored_at = store.get(&key("Bob", 2022)).await.unwrap().unwrap().uploaded_at;
    // the background loop is parked at the gate
    assert_eq!(job.progress().processed, 0);

    drop(hold);
    let status = timeout(WAIT, coordinator.wait_for_job(&submission.job_id)).await.unwrap().unwrap();
    assert_eq!(status, JobStatus::Completed);

    let bob = store.get(&key("Bob", 2022)).await.unwrap().unwrap();
    assert_eq!(bob.uploaded_at, stored_at);
    assert_eq!(bob.data, data);
    assert_eq!(store.len().await, 4);
    assert_eq!(coordinator.metrics().units_computed, 4);
}

#[tokio::test]
async fn test_concurrent_triggers_enter_once() {
    let coordinator = coordinator_with(Arc::new(InMemoryResultStore::new()), Arc::new(InMemoryCache::new()));
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();

    let job = coordinator.job(&submission.job_id).await.unwrap();
    let _hold = job.gate.close();

    let first = coordinator.get_or_trigger_priority(&submission.job_id, "Alice", 2023).await.unwrap();
    let second = coordinator.get_or_trigger_priority(&submission.job_id, "Alice", 2023).await.unwrap();
    assert_eq!(first, PriorityTrigger::Started);
    assert_eq!(second, PriorityTrigger::AlreadyProcessing);

    assert!(matches!(
        coordinator.get_result(&user(), "Alice", 2023).await.unwrap(),
        ResultResponse::PriorityProcessing { .. }
    ));

    let data = wait_for_ready(&coordinator, "Alice", 2023).await;
    assert_eq!(data.total_title_watchtime[0].title, "Show A");
    assert_eq!(coordinator.metrics().priority_requests, 1);

    let third = coordinator.get_or_trigger_priority(&submission.job_id, "Alice", 2023).await.unwrap();
    assert_eq!(third, PriorityTrigger::Ready(data));
}

#[tokio::test]
async fn test_get_result_while_job_runs() {
    let coordinator = coordinator_with(Arc::new(InMemoryResultStore::new()), Arc::new(InMemoryCache::new()));
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();

    let job = coordinator.job(&submission.job_id).await.unwrap();
    let hold = job.gate.close();

    assert!(matches!(
        coordinator.get_result(&user(), "Alice", 2021).await.unwrap(),
        ResultResponse::Processing { .. }
    ));
    assert!(matches!(
        coordinator.get_result(&user(), "Alice", 1999).await.unwrap(),
        ResultResponse::NotFound { .. }
    ));
    assert!(matches!(
        coordinator.get_result(&UserId::new("someone-else"), "Alice", 2021).await.unwrap(),
        ResultResponse::NotFound { .. }
    ));

    drop(hold);
    timeout(WAIT, coordinator.wait_for_job(&submission.job_id)).await.unwrap().unwrap();

    let ready = coordinator.get_result(&user(), "Alice", 2021).await.unwrap();
    let ResultResponse::Ready { data } = ready else {
        panic!("expected ready result");
    };
    assert_eq!(data.summary.total_hours, 1.75);
    assert_eq!(data.monthly_watchtime.len(), 12);
    assert_eq!(data.monthly_watchtime[2].hrs, 1.75);
}

#[tokio::test]
async fn test_unknown_job() {
    let coordinator = coordinator_with(Arc::new(InMemoryResultStore::new()), Arc::new(InMemoryCache::new()));
    let job_id = JobId::from("missing");

    let err = coordinator.priority_process(&job_id, "Alice", 2023).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::JobNotFound(ref id) if id == &job_id));

    let response = PriorityResponse::from(coordinator.priority_process(&job_id, "Alice", 2023).await);
    assert!(matches!(response, PriorityResponse::Error { .. }));

    assert_eq!(coordinator.job_status(&job_id).await.status, "not_found");
    assert!(coordinator.wait_for_job(&job_id).await.is_err());
    assert!(matches!(
        coordinator.get_or_trigger_priority(&job_id, "Alice", 2023).await,
        Err(CoordinatorError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_expired_job_data() {
    let cache = Arc::new(InMemoryCache::new());
    let coordinator = coordinator_with(Arc::new(InMemoryResultStore::new()), cache.clone());
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();

    // the background task has not loaded its data yet
    cache.delete(&job_data_key(&user(), &submission.job_id)).await.unwrap();

    let err = coordinator.priority_process(&submission.job_id, "Alice", 2023).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::JobNotFound(_)));

    let status = timeout(WAIT, coordinator.wait_for_job(&submission.job_id)).await.unwrap().unwrap();
    assert_eq!(status, JobStatus::Error);

    let report = coordinator.job_status(&submission.job_id).await;
    assert_eq!(report.status, "error");
    assert!(report.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn test_cache_failure_rejects_upload() {
    let coordinator = coordinator_with(Arc::new(InMemoryResultStore::new()), Arc::new(UnavailableCache));
    let err = coordinator.submit_upload(export(), user()).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Cache(_)));
    assert!(coordinator.inner.jobs.read().await.is_empty());
}

#[tokio::test]
async fn test_schema_mismatch_rejects_upload() {
    let coordinator = coordinator_with(Arc::new(InMemoryResultStore::new()), Arc::new(InMemoryCache::new()));
    let mut upload = export();
    upload.headers.swap(0, 1);

    let err = coordinator.submit_upload(upload, user()).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::SchemaMismatch { .. }));
}

#[tokio::test]
async fn test_unit_failure_does_not_stop_job() {
    let store = Arc::new(RejectingStore {
        inner: InMemoryResultStore::new(),
        rejected_profile: "Alice".to_string(),
    });
    let coordinator = coordinator_with(store.clone(), Arc::new(InMemoryCache::new()));
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();

    let status = timeout(WAIT, coordinator.wait_for_job(&submission.job_id)).await.unwrap().unwrap();
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(coordinator.metrics().unit_failures, 3);
    assert!(store.get(&key("Bob", 2022)).await.unwrap().is_some());

    let report = coordinator.job_status(&submission.job_id).await;
    assert!(report.message.contains("3 failed"));
}

#[tokio::test]
async fn test_final_results_are_not_recomputed() {
    let store = Arc::new(InMemoryResultStore::new());
    let final_at = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
    let previous = empty_payload();
    store.upsert(&key("Alice", 2021), previous.clone(), final_at).await.unwrap();

    let coordinator = coordinator_with(store.clone(), Arc::new(InMemoryCache::new()));
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();
    timeout(WAIT, coordinator.wait_for_job(&submission.job_id)).await.unwrap().unwrap();

    let kept = store.get(&key("Alice", 2021)).await.unwrap().unwrap();
    assert_eq!(kept.uploaded_at, final_at);
    assert_eq!(kept.data, previous);
    assert_eq!(coordinator.metrics().units_computed, 3);

    let stored = coordinator.list_stored(&user()).await.unwrap();
    assert_eq!(stored["Alice"], vec![2023, 2022, 2021]);
    assert_eq!(stored["Bob"], vec![2022]);
}

#[tokio::test]
async fn test_priority_returns_result_stored_concurrently() {
    let store = Arc::new(InterleavingStore::new(key("Alice", 2022)));
    let coordinator = coordinator_with(store.clone(), Arc::new(InMemoryCache::new()));
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();

    let job = coordinator.job(&submission.job_id).await.unwrap();
    let hold = job.gate.close();

    let data = coordinator.priority_process(&submission.job_id, "Alice", 2022).await.unwrap();
    assert_eq!(data, empty_payload());
    assert_eq!(store.get(&key("Alice", 2022)).await.unwrap().unwrap().data, empty_payload());

    let metrics = coordinator.metrics();
    assert_eq!(metrics.race_skips, 1);
    assert_eq!(metrics.units_computed, 1);
    // the priority hold is gone, only ours remains
    assert_eq!(job.gate.holds(), 1);

    drop(hold);
}

#[tokio::test]
async fn test_background_keeps_result_stored_concurrently() {
    let store = Arc::new(InterleavingStore::new(key("Bob", 2022)));
    let coordinator = coordinator_with(store.clone(), Arc::new(InMemoryCache::new()));
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();

    let status = timeout(WAIT, coordinator.wait_for_job(&submission.job_id)).await.unwrap().unwrap();
    assert_eq!(status, JobStatus::Completed);

    assert_eq!(store.get(&key("Bob", 2022)).await.unwrap().unwrap().data, empty_payload());
    assert_eq!(store.inner.len().await, 4);

    let metrics = coordinator.metrics();
    assert_eq!(metrics.race_skips, 1);
    assert_eq!(metrics.units_computed, 4);
    assert_eq!(metrics.unit_failures, 0);

    let report = coordinator.job_status(&submission.job_id).await;
    assert!(report.message.contains("3 computed, 1 skipped, 0 failed"), "{}", report.message);
}

#[tokio::test]
async fn test_failed_priority_reopens_gate() {
    let store = Arc::new(InMemoryResultStore::new());
    let coordinator = coordinator_with(store.clone(), Arc::new(InMemoryCache::new()));
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();

    let err = coordinator.priority_process(&submission.job_id, "Carol", 2022).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::NoDataForPartition(ref unit) if unit.profile_name == "Carol" && unit.year == 2022
    ));

    let job = coordinator.job(&submission.job_id).await.unwrap();
    assert!(job.gate.is_open());
    assert_eq!(job.gate.holds(), 0);

    let status = timeout(WAIT, coordinator.wait_for_job(&submission.job_id)).await.unwrap().unwrap();
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(store.len().await, 4);
    assert_eq!(coordinator.metrics().unit_failures, 0);
}

#[tokio::test]
async fn test_submission_carries_yearly_trend() {
    let coordinator = coordinator_with(Arc::new(InMemoryResultStore::new()), Arc::new(InMemoryCache::new()));
    let submission = coordinator.submit_upload(export(), user()).await.unwrap();

    let alice: Vec<(i32, f64)> = submission.yearly_watchtime["Alice"].iter().map(|y| (y.year, y.hrs)).collect();
    assert_eq!(alice, vec![(2021, 1.75), (2022, 2.0), (2023, 1.0)]);
    assert_eq!(submission.yearly_watchtime["Bob"].len(), 1);
    assert_eq!(submission.yearly_watchtime["Bob"][0].hrs, 0.5);

    let json = serde_json::to_value(&submission).unwrap();
    assert_eq!(json["yearly_watchtime"]["Alice"][0]["year"], 2021);
}
