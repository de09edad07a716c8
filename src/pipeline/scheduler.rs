// src/pipeline/scheduler.rs

//! Saved-search execution: aggregate, diff against seen results, record, notify.
//!
//! Every run of a saved search holds that search's entry in a [`KeyedLocks`]
//! table for its whole duration. Manual runs wait for a run already in
//! flight; scheduled sweeps skip such searches and count them instead.
//!
//! Runs of a search that was checked before are narrowed to records added
//! since the day before its last check. The overlap absorbs timezone and
//! indexing lag on the backend side; the seen-result diff removes repeats.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use futures::stream::{self, StreamExt};

use crate::backends::{BackendClient, ClientMap, SyntheticClient};
use crate::error::{AppError, Result};
use crate::models::{Frequency, RunSummary, SavedSearch, SchedulerConfig, SeenResult, SweepReport};
use crate::pipeline::aggregate::{AggregateResponse, Aggregator};
use crate::pipeline::diff::calculate_diff;
use crate::pipeline::lock::KeyedLocks;
use crate::pipeline::notify::Notifier;
use crate::storage::SavedSearchStore;

const ALL_BACKENDS_FAILED: &str = "all backends failed";

pub struct AlertScheduler {
    store: Arc<dyn SavedSearchStore>,
    aggregator: Aggregator,
    notifier: Arc<dyn Notifier>,
    locks: KeyedLocks,
    max_concurrent: usize,
    poll_interval: Duration,
    since_last_check: bool,
}

/// What a sweep did with one due search.
enum SweepStep {
    Ran(RunSummary),
    InFlight,
    NoLongerDue,
}

impl AlertScheduler {
    pub fn new(
        store: Arc<dyn SavedSearchStore>,
        aggregator: Aggregator,
        notifier: Arc<dyn Notifier>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            aggregator,
            notifier,
            locks: KeyedLocks::new(),
            max_concurrent: config.max_concurrent.max(1),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            since_last_check: config.since_last_check,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Run one saved search now, regardless of its schedule or active flag.
    pub async fn run_saved_search(&self, id: u64) -> Result<RunSummary> {
        self.run_at(id, Utc::now()).await
    }

    pub async fn run_at(&self, id: u64, now: DateTime<Utc>) -> Result<RunSummary> {
        let _guard = self.locks.acquire(id).await;
        self.execute(id, now).await
    }

    /// Dry run against synthetic results: diff and notify, persist nothing.
    pub async fn test_alert(&self, id: u64) -> Result<RunSummary> {
        self.test_alert_at(id, Utc::now()).await
    }

    pub async fn test_alert_at(&self, id: u64, now: DateTime<Utc>) -> Result<RunSummary> {
        let _guard = self.locks.acquire(id).await;
        let search = self.store.get(id).await?;
        log::info!("Test alert for saved search {} '{}'", search.id, search.name);

        let clients: ClientMap = search
            .backends()
            .map(|backend| {
                let client: Arc<dyn BackendClient> = Arc::new(SyntheticClient::new(backend));
                (backend, client)
            })
            .collect::<HashMap<_, _>>();
        let synthetic = Aggregator::new(clients, self.aggregator.timeout());
        let response = synthetic.aggregate(&search.query).await;

        let seen = self.store.seen_keys(id).await?;
        let diff = calculate_diff(&seen, response.into_records());
        let would_be: Vec<SeenResult> = diff
            .added
            .into_iter()
            .map(|record| SeenResult {
                id: 0,
                saved_search_id: id,
                record,
                discovered_at: now,
                is_read: false,
            })
            .collect();

        self.notify(&search, &would_be).await;

        Ok(RunSummary {
            saved_search_id: id,
            name: search.name,
            success: true,
            new_result_count: would_be.len(),
            test_run: true,
            new_results: would_be,
            ..RunSummary::default()
        })
    }

    /// Active searches due at `now`, optionally restricted to one frequency.
    pub async fn due_searches(
        &self,
        now: DateTime<Utc>,
        frequency: Option<Frequency>,
    ) -> Result<Vec<SavedSearch>> {
        let searches = self.store.list().await?;
        Ok(searches
            .into_iter()
            .filter(|s| frequency.is_none_or(|f| s.frequency == f))
            .filter(|s| s.is_due(now))
            .collect())
    }

    pub async fn sweep(&self, frequency: Option<Frequency>) -> Result<SweepReport> {
        self.sweep_at(Utc::now(), frequency).await
    }

    /// Run every due search, at most `max_concurrent` at a time.
    pub async fn sweep_at(
        &self,
        now: DateTime<Utc>,
        frequency: Option<Frequency>,
    ) -> Result<SweepReport> {
        let due = self.due_searches(now, frequency).await?;
        log::info!("Sweep: {} saved search(es) due", due.len());

        let mut report = SweepReport {
            total_searches: due.len(),
            ..SweepReport::default()
        };

        let steps: Vec<SweepStep> = stream::iter(due)
            .map(|search| async move {
                let Some(_guard) = self.locks.try_acquire(search.id) else {
                    log::info!("Sweep: saved search {} already running, skipped", search.id);
                    return SweepStep::InFlight;
                };

                // Another run or a toggle may have landed since the due list was read.
                let result = match self.store.get(search.id).await {
                    Ok(current) if current.is_due(now) => self.execute_search(current, now).await,
                    Ok(_) | Err(AppError::NotFound { .. }) => {
                        log::info!("Sweep: saved search {} no longer due, skipped", search.id);
                        return SweepStep::NoLongerDue;
                    }
                    Err(e) => Err(e),
                };

                SweepStep::Ran(result.unwrap_or_else(|e| {
                    log::error!("Sweep: saved search {} failed: {}", search.id, e);
                    RunSummary {
                        saved_search_id: search.id,
                        name: search.name,
                        success: false,
                        error: Some(e.to_string()),
                        ..RunSummary::default()
                    }
                }))
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut summaries = Vec::new();
        for step in steps {
            match step {
                SweepStep::Ran(summary) => summaries.push(summary),
                SweepStep::InFlight => report.skipped_in_flight += 1,
                SweepStep::NoLongerDue => report.skipped_not_due += 1,
            }
        }
        summaries.sort_by_key(|s| s.saved_search_id);
        summaries.into_iter().for_each(|s| report.record(s));

        log::info!(
            "Sweep done: {} search(es) with new results, {} new result(s), {} failed",
            report.searches_with_new_results,
            report.total_new_results,
            report.failed_searches
        );
        Ok(report)
    }

    /// Sweep every poll interval until `shutdown` resolves.
    ///
    /// A sweep still running at shutdown is dropped; searches it had not
    /// finished keep their previous `last_checked_at` and run again next time.
    pub async fn watch<F>(
        &self,
        frequency: Option<Frequency>,
        shutdown: F,
        mut on_report: impl FnMut(&SweepReport),
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        log::info!("Watching saved searches every {:?}", self.poll_interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Watch stopped");
                    return Ok(());
                }
                _ = interval.tick() => {
                    tokio::select! {
                        _ = &mut shutdown => {
                            log::info!("Watch stopped during a sweep");
                            return Ok(());
                        }
                        result = self.sweep(frequency) => match result {
                            Ok(report) => on_report(&report),
                            Err(e) => log::error!("Sweep failed: {}", e),
                        },
                    }
                }
            }
        }
    }

    /// Caller must hold the lock for `id`.
    async fn execute(&self, id: u64, now: DateTime<Utc>) -> Result<RunSummary> {
        let search = self.store.get(id).await?;
        self.execute_search(search, now).await
    }

    /// Caller must hold the lock for `search.id`.
    async fn execute_search(&self, search: SavedSearch, now: DateTime<Utc>) -> Result<RunSummary> {
        log::info!("Running saved search {} '{}'", search.id, search.name);

        let since = self.since(&search);
        let response = self.aggregator.aggregate_since(&search.query, since).await;
        self.apply(&search, response, now).await
    }

    /// Lower bound on record dates for a run of `search`, if narrowing applies.
    fn since(&self, search: &SavedSearch) -> Option<NaiveDate> {
        if !self.since_last_check {
            return None;
        }
        search
            .last_checked_at
            .map(|last| (last - TimeDelta::days(1)).date_naive())
    }

    async fn apply(
        &self,
        search: &SavedSearch,
        response: AggregateResponse,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary {
            saved_search_id: search.id,
            name: search.name.clone(),
            per_backend_errors: response.failures(),
            ..RunSummary::default()
        };

        if response.all_failed() {
            log::warn!(
                "Saved search {}: {}, last check not advanced",
                search.id,
                ALL_BACKENDS_FAILED
            );
            summary.error = Some(ALL_BACKENDS_FAILED.to_string());
            return Ok(summary);
        }

        let seen = self.store.seen_keys(search.id).await?;
        let diff = calculate_diff(&seen, response.into_records());
        log::debug!(
            "Saved search {}: {} new, {} already seen",
            search.id,
            diff.added_count(),
            diff.already_seen
        );

        let inserted = self.store.insert_seen(search.id, diff.added, now).await?;
        self.store.update_last_checked(search.id, now).await?;

        self.notify(search, &inserted).await;

        summary.success = true;
        summary.new_result_count = inserted.len();
        summary.new_results = inserted;
        Ok(summary)
    }

    async fn notify(&self, search: &SavedSearch, new_results: &[SeenResult]) {
        if new_results.is_empty() || search.owner_contact.is_none() {
            return;
        }
        if let Err(e) = self.notifier.notify(search, new_results).await {
            log::warn!("Notification for saved search {} failed: {}", search.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone};
    use tempfile::TempDir;

    use crate::backends::BackendError;
    use crate::backends::synthetic::SYNTHETIC_BATCH;
    use crate::models::{Backend, Field, NewSavedSearch, Query, ResultRecord};
    use crate::pipeline::aggregate::tests::{FakeClient, client_map};
    use crate::storage::{LocalStore, ResultFilter};

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<(u64, usize)>>,
    }

    impl RecordingNotifier {
        fn calls(&self) -> Vec<(u64, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, search: &SavedSearch, new_results: &[SeenResult]) -> Result<()> {
            self.calls.lock().unwrap().push((search.id, new_results.len()));
            Ok(())
        }
    }

    struct Harness {
        _tmp: TempDir,
        store: Arc<LocalStore>,
        notifier: Arc<RecordingNotifier>,
        scheduler: AlertScheduler,
    }

    fn harness(clients: Vec<FakeClient>) -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let notifier = Arc::new(RecordingNotifier::default());
        let aggregator = Aggregator::new(client_map(clients), Duration::from_millis(50));
        let scheduler = AlertScheduler::new(
            store.clone(),
            aggregator,
            notifier.clone(),
            &SchedulerConfig::default(),
        );
        Harness {
            _tmp: tmp,
            store,
            notifier,
            scheduler,
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 8, 0, 0).unwrap()
    }

    async fn save(
        store: &LocalStore,
        name: &str,
        backends: &[Backend],
        frequency: Frequency,
        contact: Option<&str>,
    ) -> SavedSearch {
        let query = Query::builder()
            .term("malaria", Field::Title)
            .backends(backends.iter().copied())
            .build()
            .unwrap();
        store
            .create(
                NewSavedSearch {
                    name: name.into(),
                    query,
                    frequency,
                    owner_contact: contact.map(str::to_string),
                },
                at(1),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_partial_failure_records_and_advances() {
        let h = harness(vec![
            FakeClient::records(Backend::Pubmed, &["a", "b"]),
            FakeClient::Hang(Backend::Arxiv),
        ]);
        let search = save(
            &h.store,
            "s",
            &[Backend::Pubmed, Backend::Arxiv],
            Frequency::Daily,
            Some("me@lab.org"),
        )
        .await;

        let summary = h.scheduler.run_at(search.id, at(2)).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.new_result_count, 2);
        assert_eq!(summary.per_backend_errors.len(), 1);
        assert_eq!(summary.per_backend_errors[0].backend, Backend::Arxiv);
        assert!(summary.error.is_none());

        let stored = h.store.get(search.id).await.unwrap();
        assert_eq!(stored.last_checked_at, Some(at(2)));
        let rows = h.store.list_results(&ResultFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.backend() == Backend::Pubmed));

        assert_eq!(h.notifier.calls(), vec![(search.id, 2)]);
    }

    #[tokio::test]
    async fn test_second_run_finds_nothing_new() {
        let h = harness(vec![FakeClient::records(Backend::Pubmed, &["a", "b"])]);
        let search = save(&h.store, "s", &[Backend::Pubmed], Frequency::Daily, Some("x@y")).await;

        let first = h.scheduler.run_at(search.id, at(2)).await.unwrap();
        let second = h.scheduler.run_at(search.id, at(3)).await.unwrap();

        assert_eq!(first.new_result_count, 2);
        assert!(second.success);
        assert_eq!(second.new_result_count, 0);
        assert!(second.error.is_none());
        assert_eq!(
            h.store.list_results(&ResultFilter::default()).await.unwrap().len(),
            2
        );
        assert_eq!(
            h.store.get(search.id).await.unwrap().last_checked_at,
            Some(at(3))
        );
        // Nothing new, no alert.
        assert_eq!(h.notifier.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_does_not_advance() {
        let h = harness(vec![
            FakeClient::Fail(Backend::Pubmed, 500),
            FakeClient::Hang(Backend::Gim),
        ]);
        let search = save(
            &h.store,
            "s",
            &[Backend::Pubmed, Backend::Gim],
            Frequency::Daily,
            None,
        )
        .await;

        let summary = h.scheduler.run_at(search.id, at(2)).await.unwrap();
        assert!(!summary.success);
        assert_eq!(summary.error.as_deref(), Some("all backends failed"));
        assert_eq!(summary.per_backend_errors.len(), 2);
        assert_eq!(summary.new_result_count, 0);
        assert!(h.store.get(search.id).await.unwrap().last_checked_at.is_none());
    }

    #[tokio::test]
    async fn test_no_contact_no_notification() {
        let h = harness(vec![FakeClient::records(Backend::Gim, &["g1"])]);
        let search = save(&h.store, "s", &[Backend::Gim], Frequency::Weekly, None).await;
        let summary = h.scheduler.run_at(search.id, at(2)).await.unwrap();
        assert_eq!(summary.new_result_count, 1);
        assert!(h.notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_missing_search() {
        let h = harness(vec![]);
        assert!(matches!(
            h.scheduler.run_at(99, at(2)).await,
            Err(AppError::NotFound { id: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_inactive_search_runs_on_demand() {
        let h = harness(vec![FakeClient::records(Backend::Pubmed, &["a"])]);
        let search = save(&h.store, "s", &[Backend::Pubmed], Frequency::Daily, None).await;
        h.store.set_active(search.id, false).await.unwrap();

        assert!(h.scheduler.due_searches(at(20), None).await.unwrap().is_empty());
        let summary = h.scheduler.run_at(search.id, at(20)).await.unwrap();
        assert_eq!(summary.new_result_count, 1);
    }

    #[tokio::test]
    async fn test_alert_persists_nothing() {
        let h = harness(vec![]);
        let search = save(
            &h.store,
            "s",
            &[Backend::Pubmed, Backend::Arxiv],
            Frequency::Daily,
            Some("me@lab.org"),
        )
        .await;

        let summary = h.scheduler.test_alert_at(search.id, at(2)).await.unwrap();
        assert!(summary.success);
        assert!(summary.test_run);
        assert_eq!(summary.new_result_count, 2 * SYNTHETIC_BATCH);
        assert_eq!(summary.new_results[0].external_id(), "test_pubmed_1");

        assert!(h.store.list_results(&ResultFilter::default()).await.unwrap().is_empty());
        assert!(h.store.get(search.id).await.unwrap().last_checked_at.is_none());
        assert_eq!(h.notifier.calls(), vec![(search.id, 2 * SYNTHETIC_BATCH)]);

        // Repeatable: nothing was recorded.
        let again = h.scheduler.test_alert_at(search.id, at(3)).await.unwrap();
        assert_eq!(again.new_result_count, 2 * SYNTHETIC_BATCH);
    }

    #[tokio::test]
    async fn test_alert_diffs_against_real_seen_set() {
        let h = harness(vec![]);
        let search = save(&h.store, "s", &[Backend::Gim], Frequency::Daily, None).await;
        let existing = SyntheticClient::new(Backend::Gim).records();
        h.store
            .insert_seen(search.id, existing[..2].to_vec(), at(2))
            .await
            .unwrap();

        let summary = h.scheduler.test_alert_at(search.id, at(3)).await.unwrap();
        assert_eq!(summary.new_result_count, SYNTHETIC_BATCH - 2);
    }

    #[tokio::test]
    async fn test_due_rule_and_frequency_filter() {
        let h = harness(vec![]);
        let daily = save(&h.store, "daily", &[Backend::Pubmed], Frequency::Daily, None).await;
        let weekly = save(&h.store, "weekly", &[Backend::Pubmed], Frequency::Weekly, None).await;
        let fresh = save(&h.store, "fresh", &[Backend::Pubmed], Frequency::Monthly, None).await;

        h.store.update_last_checked(daily.id, at(1)).await.unwrap();
        h.store.update_last_checked(weekly.id, at(1)).await.unwrap();

        // Exactly one day later: the daily search is due, the weekly is not.
        let now = at(1) + TimeDelta::days(1);
        let due: Vec<u64> = h
            .scheduler
            .due_searches(now, None)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(due, vec![daily.id, fresh.id]);

        let only_daily = h
            .scheduler
            .due_searches(now, Some(Frequency::Daily))
            .await
            .unwrap();
        assert_eq!(only_daily.len(), 1);
        assert_eq!(only_daily[0].id, daily.id);
    }

    #[tokio::test]
    async fn test_sweep_report() {
        let h = harness(vec![
            FakeClient::records(Backend::Pubmed, &["p1", "p2"]),
            FakeClient::Fail(Backend::Gim, 503),
        ]);
        save(&h.store, "a", &[Backend::Pubmed], Frequency::Daily, None).await;
        save(&h.store, "b", &[Backend::Gim], Frequency::Daily, None).await;
        let off = save(&h.store, "c", &[Backend::Pubmed], Frequency::Daily, None).await;
        h.store.set_active(off.id, false).await.unwrap();

        let report = h.scheduler.sweep_at(at(2), None).await.unwrap();
        assert_eq!(report.total_searches, 2);
        assert_eq!(report.searches_with_new_results, 1);
        assert_eq!(report.total_new_results, 2);
        assert_eq!(report.failed_searches, 1);
        assert_eq!(report.skipped_in_flight, 0);
        assert_eq!(report.details.len(), 2);
        assert_eq!(report.details[0].name, "a");

        // Everything just ran; nothing is due an hour later.
        let later = h
            .scheduler
            .sweep_at(at(2) + TimeDelta::hours(1), None)
            .await
            .unwrap();
        // The failed search was not advanced, so it is still due.
        assert_eq!(later.total_searches, 1);
        assert_eq!(later.details[0].name, "b");
    }

    #[tokio::test]
    async fn test_sweep_skips_in_flight() {
        let h = harness(vec![FakeClient::records(Backend::Pubmed, &["p1"])]);
        let busy = save(&h.store, "busy", &[Backend::Pubmed], Frequency::Daily, None).await;
        save(&h.store, "idle", &[Backend::Pubmed], Frequency::Daily, None).await;

        let _held = h.scheduler.locks().try_acquire(busy.id).unwrap();
        let report = h.scheduler.sweep_at(at(2), None).await.unwrap();

        assert_eq!(report.total_searches, 2);
        assert_eq!(report.skipped_in_flight, 1);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].name, "idle");
        assert!(h.store.get(busy.id).await.unwrap().last_checked_at.is_none());
    }

    #[tokio::test]
    async fn test_watch_sweeps_until_shutdown() {
        let h = harness(vec![FakeClient::records(Backend::Pubmed, &["p1"])]);
        save(&h.store, "s", &[Backend::Pubmed], Frequency::Daily, None).await;
        let scheduler = h.scheduler.with_poll_interval(Duration::from_millis(10));

        let mut reports = Vec::new();
        scheduler
            .watch(
                None,
                tokio::time::sleep(Duration::from_millis(60)),
                |report| reports.push(report.total_new_results),
            )
            .await
            .unwrap();

        assert!(!reports.is_empty());
        // Only the first sweep finds the search due.
        assert_eq!(reports[0], 1);
        assert!(reports[1..].iter().all(|n| *n == 0));
    }

    /// Records every native query it is sent.
    struct QueryLog {
        backend: Backend,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BackendClient for QueryLog {
        fn backend(&self) -> Backend {
            self.backend
        }

        async fn search(
            &self,
            native_query: &str,
            _max_results: u32,
        ) -> std::result::Result<Vec<ResultRecord>, BackendError> {
            self.queries.lock().unwrap().push(native_query.to_string());
            Ok(Vec::new())
        }
    }

    /// Deactivates another saved search while "searching".
    struct Deactivating {
        store: Arc<LocalStore>,
        target: u64,
    }

    #[async_trait]
    impl BackendClient for Deactivating {
        fn backend(&self) -> Backend {
            Backend::Pubmed
        }

        async fn search(
            &self,
            _native_query: &str,
            _max_results: u32,
        ) -> std::result::Result<Vec<ResultRecord>, BackendError> {
            self.store
                .set_active(self.target, false)
                .await
                .map_err(|e| BackendError::malformed(e.to_string()))?;
            Ok(Vec::new())
        }
    }

    fn scheduler_with(
        store: Arc<LocalStore>,
        clients: ClientMap,
        timeout: Duration,
        config: &SchedulerConfig,
    ) -> AlertScheduler {
        AlertScheduler::new(
            store,
            Aggregator::new(clients, timeout),
            Arc::new(RecordingNotifier::default()),
            config,
        )
    }

    #[tokio::test]
    async fn test_rerun_narrowed_to_since_last_check() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let log = Arc::new(QueryLog {
            backend: Backend::Pubmed,
            queries: Mutex::new(Vec::new()),
        });
        let mut clients: ClientMap = HashMap::new();
        clients.insert(Backend::Pubmed, log.clone());
        let scheduler = scheduler_with(
            store.clone(),
            clients,
            Duration::from_secs(1),
            &SchedulerConfig::default(),
        );
        let search = save(&store, "s", &[Backend::Pubmed], Frequency::Daily, None).await;

        scheduler.run_at(search.id, at(2)).await.unwrap();
        scheduler.run_at(search.id, at(9)).await.unwrap();

        let queries = log.queries.lock().unwrap().clone();
        assert_eq!(queries[0], "(malaria[Title])");
        // Last check on the 2nd, one day of overlap.
        assert_eq!(queries[1], "((malaria[Title])) AND 2024/03/01:3000[edat]");
    }

    #[tokio::test]
    async fn test_rerun_unnarrowed_when_disabled() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let log = Arc::new(QueryLog {
            backend: Backend::Pubmed,
            queries: Mutex::new(Vec::new()),
        });
        let mut clients: ClientMap = HashMap::new();
        clients.insert(Backend::Pubmed, log.clone());
        let config = SchedulerConfig {
            since_last_check: false,
            ..SchedulerConfig::default()
        };
        let scheduler = scheduler_with(store.clone(), clients, Duration::from_secs(1), &config);
        let search = save(&store, "s", &[Backend::Pubmed], Frequency::Daily, None).await;

        scheduler.run_at(search.id, at(2)).await.unwrap();
        scheduler.run_at(search.id, at(9)).await.unwrap();

        let queries = log.queries.lock().unwrap().clone();
        assert_eq!(queries, vec!["(malaria[Title])", "(malaria[Title])"]);
    }

    #[tokio::test]
    async fn test_sweep_rechecks_under_lock() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let first = save(&store, "first", &[Backend::Pubmed], Frequency::Daily, None).await;
        let second = save(&store, "second", &[Backend::Arxiv], Frequency::Daily, None).await;

        let mut clients = client_map(vec![FakeClient::records(Backend::Arxiv, &["a1"])]);
        clients.insert(
            Backend::Pubmed,
            Arc::new(Deactivating {
                store: store.clone(),
                target: second.id,
            }),
        );
        // One at a time, in id order: the first run turns the second search off.
        let config = SchedulerConfig {
            max_concurrent: 1,
            ..SchedulerConfig::default()
        };
        let scheduler = scheduler_with(store.clone(), clients, Duration::from_secs(1), &config);

        let report = scheduler.sweep_at(at(2), None).await.unwrap();
        assert_eq!(report.total_searches, 2);
        assert_eq!(report.skipped_not_due, 1);
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].saved_search_id, first.id);

        let second = store.get(second.id).await.unwrap();
        assert!(!second.active);
        assert!(second.last_checked_at.is_none());
        assert!(store.list_results(&ResultFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watch_stops_during_sweep() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let search = save(&store, "slow", &[Backend::Gim], Frequency::Daily, None).await;
        let scheduler = scheduler_with(
            store.clone(),
            client_map(vec![FakeClient::Hang(Backend::Gim)]),
            Duration::from_secs(3600),
            &SchedulerConfig::default(),
        )
        .with_poll_interval(Duration::from_millis(10));

        let mut reports = 0;
        let stopped = tokio::time::timeout(
            Duration::from_secs(5),
            scheduler.watch(None, tokio::time::sleep(Duration::from_millis(50)), |_| {
                reports += 1
            }),
        )
        .await;

        assert!(matches!(stopped, Ok(Ok(()))));
        assert_eq!(reports, 0);
        assert!(store.get(search.id).await.unwrap().last_checked_at.is_none());
        assert!(!scheduler.locks().is_locked(search.id));
    }
}
