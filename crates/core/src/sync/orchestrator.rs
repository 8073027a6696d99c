//! Sync orchestrator: per-user and global syncs plus the tracking-row actions
//! that carry notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{DetectorConfig, SyncConfig};
use crate::detector::{apply_scrape, CheckOutcome, ChangeDetector};
use crate::feed::{FeedQuery, FeedSource};
use crate::matching::same_work;
use crate::metrics;
use crate::notify::{notify_user, Notifier, PushMessage};
use crate::store::{
    settings, NewWork, StoreError, TrackingFilter, TrackingRow, TrackingStore, TrackingUpdate, WorkStatus,
    WorkUpdate,
};
use crate::thread_page::ThreadScraper;

use super::schedule::ScheduleInterval;
use super::types::{IngestReport, PendingUpdate, ScheduledRun, SearchHit, SearchResults, SyncError, SyncReport};

/// Rows returned from each half of a search.
const SEARCH_LIMIT: u32 = 50;

pub struct SyncOrchestrator {
    store: Arc<dyn TrackingStore>,
    detector: Arc<ChangeDetector>,
    feed: Arc<dyn FeedSource>,
    scraper: Arc<dyn ThreadScraper>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    debounce: Duration,
    shutting_down: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        detector: Arc<ChangeDetector>,
        feed: Arc<dyn FeedSource>,
        scraper: Arc<dyn ThreadScraper>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
        detector_config: &DetectorConfig,
    ) -> Self {
        Self {
            store,
            detector,
            feed,
            scraper,
            notifier,
            config,
            debounce: Duration::days(detector_config.debounce_days),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn TrackingStore> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Stop running syncs after the work in progress.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    async fn notify_if(&self, user_id: i64, toggle: &str, default: bool, message: PushMessage) {
        match settings::get_flag(self.store.as_ref(), user_id, toggle, default) {
            Ok(true) => {
                notify_user(self.store.as_ref(), self.notifier.as_ref(), user_id, &message).await;
            }
            Ok(false) => debug!(user_id, toggle, "Notification toggle off"),
            Err(e) => warn!(user_id, toggle, error = %e, "Failed to read notification toggle"),
        }
    }

    // =========================================================================
    // Syncs
    // =========================================================================

    /// Check every notifiable, non-terminal work of one user.
    ///
    /// A failing work is logged and counted; it never stops the traversal.
    pub async fn sync_all_for_user(&self, user_id: i64, force_scrape: bool) -> Result<SyncReport, SyncError> {
        let candidates = self.store.list_sync_candidates(user_id)?;
        let mut report = SyncReport {
            total: candidates.len(),
            ..Default::default()
        };
        info!(user_id, total = report.total, force_scrape, "Syncing user");

        for row in candidates {
            if self.is_shutting_down() {
                info!(user_id, processed = report.processed, "Sync interrupted by shutdown");
                break;
            }
            match self.detector.check_one(user_id, row.id, force_scrape).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(user_id, tracking_id = row.id, name = %row.work.name, error = %e, "Work check failed");
                }
            }
        }

        info!(
            user_id,
            processed = report.processed,
            failed = report.failed,
            total = report.total,
            "User sync finished"
        );
        Ok(report)
    }

    /// Sync every user. A failing user is logged and skipped.
    pub async fn sync_all_for_all_users(&self) -> Result<SyncReport, SyncError> {
        let users = self.store.list_users()?;
        let mut combined = SyncReport::default();
        for user in users {
            if self.is_shutting_down() {
                break;
            }
            match self.sync_all_for_user(user.id, false).await {
                Ok(report) => combined.absorb(&report),
                Err(e) => error!(user_id = user.id, error = %e, "User sync failed"),
            }
        }
        Ok(combined)
    }

    /// Interval currently configured by the primary admin.
    pub fn schedule_interval(&self) -> Result<ScheduleInterval, SyncError> {
        let Some(admin) = self.store.primary_admin()? else {
            return Ok(ScheduleInterval::default());
        };
        let raw = self.store.get_setting(admin.id, settings::UPDATE_SCHEDULE_HOURS)?;
        Ok(ScheduleInterval::parse(raw.as_deref()))
    }

    fn last_scheduled_run(&self, admin_id: Option<i64>) -> Result<Option<DateTime<Utc>>, SyncError> {
        let Some(admin_id) = admin_id else {
            return Ok(None);
        };
        let raw = self.store.get_setting(admin_id, settings::LAST_SCHEDULED_SYNC_AT)?;
        Ok(raw.and_then(|r| DateTime::parse_from_rfc3339(r.trim()).ok().map(|d| d.with_timezone(&Utc))))
    }

    /// Scheduled trigger: honours the disabled sentinel and the re-run
    /// tolerance, then syncs everyone and records the completion time.
    pub async fn run_scheduled(&self, now: DateTime<Utc>) -> Result<ScheduledRun, SyncError> {
        let interval = self.schedule_interval()?;
        if interval == ScheduleInterval::Disabled {
            debug!("Scheduled sync disabled");
            return Ok(ScheduledRun::Disabled);
        }

        let admin_id = self.store.primary_admin()?.map(|a| a.id);
        let last = self.last_scheduled_run(admin_id)?;
        if !interval.is_due(last, now) {
            let next_due = last.and_then(|l| interval.next_due(l)).unwrap_or(now);
            info!(last = ?last, next_due = %next_due, "Scheduled sync skipped, last run too recent");
            metrics::SYNC_RUNS.with_label_values(&["skipped"]).inc();
            return Ok(ScheduledRun::Skipped { next_due });
        }

        metrics::SYNC_RUNS.with_label_values(&["scheduled"]).inc();
        let report = self.sync_all_for_all_users().await?;
        if self.is_shutting_down() {
            warn!(processed = report.processed, total = report.total, "Scheduled sync interrupted by shutdown");
            return Ok(ScheduledRun::Interrupted { report });
        }

        let finished = Utc::now();
        match admin_id {
            Some(admin_id) => {
                self.store
                    .set_setting(admin_id, settings::LAST_SCHEDULED_SYNC_AT, &finished.to_rfc3339())?;
            }
            None => warn!("No admin user, last scheduled sync time not recorded"),
        }
        let next_due = interval.next_due(finished).unwrap_or(finished);
        info!(processed = report.processed, total = report.total, next_due = %next_due, "Scheduled sync finished");
        Ok(ScheduledRun::Completed { report, next_due })
    }

    /// Run a user's sync in the background and report when done.
    pub fn spawn_manual_sync(self: &Arc<Self>, user_id: i64) -> JoinHandle<Result<SyncReport, SyncError>> {
        let this = Arc::clone(self);
        metrics::SYNC_RUNS.with_label_values(&["manual"]).inc();
        tokio::spawn(async move {
            let force = settings::get_flag(this.store.as_ref(), user_id, settings::FORCE_SCRAPE_ON_MANUAL_SYNC, false)?;
            let report = this.sync_all_for_user(user_id, force).await?;
            this.notify_if(
                user_id,
                settings::NOTIFY_ON_SYNC_COMPLETE,
                true,
                PushMessage::manual_sync_complete(report.processed, report.total),
            )
            .await;
            Ok(report)
        })
    }

    /// Force-check one row in the background.
    ///
    /// Fails immediately when the row does not exist.
    pub fn spawn_single_sync(
        self: &Arc<Self>,
        user_id: i64,
        tracking_id: i64,
    ) -> Result<JoinHandle<Result<CheckOutcome, SyncError>>, SyncError> {
        if self.store.get_tracking(user_id, tracking_id)?.is_none() {
            return Err(SyncError::NotFound(format!("tracking row {tracking_id}")));
        }
        metrics::SYNC_RUNS.with_label_values(&["single"]).inc();

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome = this.detector.check_one(user_id, tracking_id, true).await?;
            this.notify_if(
                user_id,
                settings::NOTIFY_ON_SYNC_COMPLETE,
                true,
                PushMessage::single_sync_complete(),
            )
            .await;
            Ok(outcome)
        }))
    }

    // =========================================================================
    // Tracking rows
    // =========================================================================

    /// Track a work, creating it when first seen. A forced check of the new
    /// row starts in the background.
    pub async fn add_work(
        self: &Arc<Self>,
        user_id: i64,
        work: NewWork,
    ) -> Result<(TrackingRow, JoinHandle<Option<CheckOutcome>>), SyncError> {
        let url = work.url.trim().to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SyncError::InvalidInput(format!("not a thread URL: {url:?}")));
        }
        let work = NewWork { url, ..work };

        let now = Utc::now();
        let (stored, created) = self.store.upsert_work_by_url(&work, now)?;
        let row = self.store.add_tracking(user_id, stored.id, now)?;
        info!(user_id, work_id = stored.id, created, name = %stored.name, "Work added to list");

        self.notify_if(
            user_id,
            settings::NOTIFY_ON_GAME_ADD,
            false,
            PushMessage::game_added(&stored.name, &stored.url),
        )
        .await;

        let detector = Arc::clone(&self.detector);
        let tracking_id = row.id;
        let check = tokio::spawn(async move {
            match detector.check_one(user_id, tracking_id, true).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(user_id, tracking_id, error = %e, "Initial check of added work failed");
                    None
                }
            }
        });

        Ok((row, check))
    }

    pub async fn remove_work(&self, user_id: i64, tracking_id: i64) -> Result<(), SyncError> {
        let row = self
            .store
            .get_tracking(user_id, tracking_id)?
            .ok_or_else(|| SyncError::NotFound(format!("tracking row {tracking_id}")))?;
        if !self.store.delete_tracking(user_id, tracking_id)? {
            return Err(SyncError::NotFound(format!("tracking row {tracking_id}")));
        }
        info!(user_id, tracking_id, name = %row.work.name, "Work removed from list");

        self.notify_if(
            user_id,
            settings::NOTIFY_ON_GAME_DELETE,
            false,
            PushMessage::game_removed(&row.work.name, &row.work.url),
        )
        .await;
        Ok(())
    }

    pub fn update_tracking(
        &self,
        user_id: i64,
        tracking_id: i64,
        update: &TrackingUpdate,
    ) -> Result<TrackingRow, SyncError> {
        self.store
            .update_tracking(user_id, tracking_id, update)?
            .ok_or_else(|| SyncError::NotFound(format!("tracking row {tracking_id}")))
    }

    pub fn acknowledge(&self, user_id: i64, tracking_id: i64) -> Result<TrackingRow, SyncError> {
        self.store
            .acknowledge(user_id, tracking_id)?
            .ok_or_else(|| SyncError::NotFound(format!("tracking row {tracking_id}")))
    }

    /// Rows whose observed state differs from what the user acknowledged.
    pub fn pending_updates(&self, user_id: i64) -> Result<Vec<PendingUpdate>, SyncError> {
        let rows = self.store.list_tracking(user_id, &TrackingFilter::new())?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let reasons = row.pending_reasons();
                (!reasons.is_empty()).then_some(PendingUpdate { row, reasons })
            })
            .collect())
    }

    // =========================================================================
    // Search and ingestion
    // =========================================================================

    /// Local works matching `term`, then live feed results not already shown.
    pub async fn search_works(&self, user_id: i64, term: &str) -> Result<SearchResults, SyncError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(SearchResults::default());
        }

        let tracked: Vec<i64> = self
            .store
            .list_tracking(user_id, &TrackingFilter::new())?
            .into_iter()
            .map(|row| row.work.id)
            .collect();

        let local = self.store.search_works(term, SEARCH_LIMIT)?;
        let mut results = SearchResults::default();
        for work in &local {
            results.hits.push(SearchHit::local(work, tracked.contains(&work.id)));
        }

        let query = FeedQuery::latest(SEARCH_LIMIT).with_search(term);
        match self.feed.fetch_feed(&query).await {
            Ok(entries) => {
                for entry in entries {
                    if local.iter().any(|w| same_work(&w.url, &entry.url)) {
                        continue;
                    }
                    let known = self.store.find_work_by_url(&entry.url)?;
                    let already_tracked = known.as_ref().is_some_and(|w| tracked.contains(&w.id));
                    results.hits.push(SearchHit::feed(&entry, known.map(|w| w.id), already_tracked));
                }
            }
            Err(e) => {
                warn!(term, error = %e, "Feed search failed, returning local results only");
                results.feed_error = Some(e.to_string());
            }
        }

        debug!(term, hits = results.hits.len(), "Search finished");
        Ok(results)
    }

    /// Pull the unfiltered latest feed into the works table, scraping new or
    /// stale works when forum credentials are configured.
    pub async fn ingest_latest(&self) -> Result<IngestReport, SyncError> {
        let entries = self
            .feed
            .fetch_feed(&FeedQuery::latest(self.config.ingest_limit))
            .await
            .map_err(|e| SyncError::Feed(e.to_string()))?;
        let credentials = settings::forum_credentials(self.store.as_ref())?;
        let mut report = IngestReport {
            seen: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            if self.is_shutting_down() {
                break;
            }
            let now = Utc::now();
            let (work, created) = match self.store.upsert_work_by_url(&NewWork::from_feed(&entry), now) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(url = %entry.url, error = %e, "Failed to store feed entry");
                    continue;
                }
            };
            if created {
                report.created += 1;
            }

            let stale = work.last_scraped.is_none_or(|at| now - at > self.debounce);
            if !(created || stale) {
                continue;
            }
            let Some(credentials) = credentials.as_ref() else {
                metrics::SCRAPES.with_label_values(&["skipped_no_credentials"]).inc();
                continue;
            };

            match self.scraper.scrape(&work.url, Some(credentials)).await {
                Ok(record) => {
                    let mut update = WorkUpdate::default();
                    apply_scrape(&work, &record, &mut update);
                    let status = record.work_status();
                    if status != WorkStatus::Unknown && status != work.status {
                        update.status = Some(status);
                    }
                    update.scraped_at = Some(now);
                    match self.store.apply_work_update(work.id, &update, now) {
                        Ok(_) => report.scraped += 1,
                        Err(e) => warn!(work_id = work.id, error = %e, "Failed to store scraped details"),
                    }
                }
                Err(e) => warn!(url = %work.url, error = %e, "Ingest scrape failed"),
            }
        }

        info!(
            seen = report.seen,
            created = report.created,
            scraped = report.scraped,
            "Feed ingestion finished"
        );
        Ok(report)
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => SyncError::NotFound(what),
            other => SyncError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::feed::{FeedError, StatusFilter};
    use crate::notify::NotificationKind;
    use crate::store::{PendingReason, SqliteTrackingStore, WorkUpdate};
    use crate::sync::HitSource;
    use crate::testing::{fixtures, MockFeedSource, MockImageCache, MockNotifier, MockScraper};

    const ETERNUM: &str = "https://forum.example/threads/eternum.4242/";
    const LUST: &str = "https://forum.example/threads/lust-theory.5151/";

    struct Harness {
        store: Arc<SqliteTrackingStore>,
        feed: Arc<MockFeedSource>,
        scraper: Arc<MockScraper>,
        notifier: Arc<MockNotifier>,
        orchestrator: Arc<SyncOrchestrator>,
        admin_id: i64,
    }

    fn harness() -> Harness {
        let store = Arc::new(SqliteTrackingStore::in_memory().unwrap());
        let admin = store.create_user("admin", "hash", true).unwrap();
        store.set_setting(admin.id, settings::PUSHOVER_USER_KEY, "ukey").unwrap();
        store.set_setting(admin.id, settings::PUSHOVER_API_TOKEN, "token").unwrap();

        let feed = Arc::new(MockFeedSource::new());
        let scraper = Arc::new(MockScraper::new());
        let notifier = Arc::new(MockNotifier::new());
        let detector_config = DetectorConfig::default();
        let detector = Arc::new(ChangeDetector::new(
            store.clone(),
            feed.clone(),
            scraper.clone(),
            Arc::new(MockImageCache::new()),
            notifier.clone(),
            detector_config.clone(),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            detector,
            feed.clone(),
            scraper.clone(),
            notifier.clone(),
            SyncConfig::default(),
            &detector_config,
        ));

        Harness {
            store,
            feed,
            scraper,
            notifier,
            orchestrator,
            admin_id: admin.id,
        }
    }

    impl Harness {
        fn credentials(&self) {
            self.store.set_setting(self.admin_id, settings::FORUM_USERNAME, "reader").unwrap();
            self.store.set_setting(self.admin_id, settings::FORUM_PASSWORD, "secret").unwrap();
        }

        fn track(&self, url: &str, name: &str, status: WorkStatus) -> TrackingRow {
            let (work, _) = self
                .store
                .upsert_work_by_url(
                    &NewWork {
                        url: url.to_string(),
                        name: Some(name.to_string()),
                        version: Some("v1.0".to_string()),
                        author: Some("Dev".to_string()),
                        ..Default::default()
                    },
                    Utc::now(),
                )
                .unwrap();
            self.store
                .apply_work_update(
                    work.id,
                    &WorkUpdate {
                        status: Some(status),
                        ..Default::default()
                    },
                    Utc::now(),
                )
                .unwrap();
            let row = self.store.add_tracking(self.admin_id, work.id, Utc::now()).unwrap();
            self.store.acknowledge(self.admin_id, row.id).unwrap().unwrap()
        }

        async fn titles(&self) -> Vec<String> {
            self.notifier
                .sent()
                .await
                .into_iter()
                .map(|s| s.message.title)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_sync_skips_terminal_and_muted_rows() {
        let h = harness();
        h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);
        h.track(LUST, "Lust Theory", WorkStatus::Completed);
        let muted = h.track("https://forum.example/threads/muted.7/", "Muted", WorkStatus::OnHold);
        h.orchestrator
            .update_tracking(
                h.admin_id,
                muted.id,
                &TrackingUpdate {
                    notify: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        let report = h.orchestrator.sync_all_for_user(h.admin_id, false).await.unwrap();
        assert_eq!(report, SyncReport { processed: 1, failed: 0, total: 1 });
    }

    #[tokio::test]
    async fn test_sync_stops_after_shutdown() {
        let h = harness();
        h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);
        h.track(LUST, "Lust Theory", WorkStatus::Ongoing);

        h.orchestrator.shutdown();
        let report = h.orchestrator.sync_all_for_user(h.admin_id, false).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.processed, 0);
    }

    #[tokio::test]
    async fn test_run_scheduled_respects_tolerance() {
        let h = harness();
        h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);
        h.store.set_setting(h.admin_id, settings::UPDATE_SCHEDULE_HOURS, "10").unwrap();

        let now = Utc::now();
        let recent = now - Duration::hours(8);
        h.store
            .set_setting(h.admin_id, settings::LAST_SCHEDULED_SYNC_AT, &recent.to_rfc3339())
            .unwrap();
        match h.orchestrator.run_scheduled(now).await.unwrap() {
            ScheduledRun::Skipped { next_due } => assert_eq!(next_due, recent + Duration::hours(9)),
            other => panic!("expected skip, got {other:?}"),
        }

        let old = now - Duration::hours(9) - Duration::minutes(1);
        h.store
            .set_setting(h.admin_id, settings::LAST_SCHEDULED_SYNC_AT, &old.to_rfc3339())
            .unwrap();
        match h.orchestrator.run_scheduled(now).await.unwrap() {
            ScheduledRun::Completed { report, .. } => assert_eq!(report.processed, 1),
            other => panic!("expected a run, got {other:?}"),
        }

        let stored = h
            .store
            .get_setting(h.admin_id, settings::LAST_SCHEDULED_SYNC_AT)
            .unwrap()
            .unwrap();
        let stored = DateTime::parse_from_rfc3339(&stored).unwrap().with_timezone(&Utc);
        assert!(stored >= now);
    }

    #[tokio::test]
    async fn test_run_scheduled_after_shutdown_keeps_last_run() {
        let h = harness();
        h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);

        h.orchestrator.shutdown();
        match h.orchestrator.run_scheduled(Utc::now()).await.unwrap() {
            ScheduledRun::Interrupted { report } => assert_eq!(report.processed, 0),
            other => panic!("expected an interrupted run, got {other:?}"),
        }
        assert!(h
            .store
            .get_setting(h.admin_id, settings::LAST_SCHEDULED_SYNC_AT)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_run_scheduled_disabled() {
        let h = harness();
        h.store.set_setting(h.admin_id, settings::UPDATE_SCHEDULE_HOURS, "-1").unwrap();
        assert_eq!(h.orchestrator.run_scheduled(Utc::now()).await.unwrap(), ScheduledRun::Disabled);
        assert!(h
            .store
            .get_setting(h.admin_id, settings::LAST_SCHEDULED_SYNC_AT)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_add_work_notifies_and_checks() {
        let h = harness();
        settings::set_flag(h.store.as_ref(), h.admin_id, settings::NOTIFY_ON_GAME_ADD, true).unwrap();

        let (row, check) = h
            .orchestrator
            .add_work(h.admin_id, NewWork::placeholder(format!("  {ETERNUM}  ")))
            .await
            .unwrap();
        assert_eq!(row.work.url, ETERNUM);
        assert_eq!(row.acknowledged, row.observed());

        let outcome = check.await.unwrap().unwrap();
        assert_eq!(outcome.tracking_id, row.id);
        assert_eq!(h.titles().await, vec!["Game Added: Unknown".to_string()]);

        let duplicate = h.orchestrator.add_work(h.admin_id, NewWork::placeholder(ETERNUM)).await;
        assert!(matches!(duplicate, Err(SyncError::Store(StoreError::AlreadyTracked))));

        let invalid = h.orchestrator.add_work(h.admin_id, NewWork::placeholder("eternum")).await;
        assert!(matches!(invalid, Err(SyncError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_remove_work() {
        let h = harness();
        let row = h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);

        // Toggle off by default
        h.orchestrator.remove_work(h.admin_id, row.id).await.unwrap();
        assert!(h.notifier.sent().await.is_empty());
        assert!(h.store.get_tracking(h.admin_id, row.id).unwrap().is_none());

        assert!(matches!(
            h.orchestrator.remove_work(h.admin_id, row.id).await,
            Err(SyncError::NotFound(_))
        ));

        settings::set_flag(h.store.as_ref(), h.admin_id, settings::NOTIFY_ON_GAME_DELETE, true).unwrap();
        let row = h.track(LUST, "Lust Theory", WorkStatus::Ongoing);
        h.orchestrator.remove_work(h.admin_id, row.id).await.unwrap();
        assert_eq!(h.titles().await, vec!["Game Removed: Lust Theory".to_string()]);
    }

    #[tokio::test]
    async fn test_pending_updates_and_acknowledge() {
        let h = harness();
        let row = h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);
        h.track(LUST, "Lust Theory", WorkStatus::Ongoing);
        assert!(h.orchestrator.pending_updates(h.admin_id).unwrap().is_empty());

        h.store
            .apply_work_update(
                row.work.id,
                &WorkUpdate {
                    version: Some("v1.1".to_string()),
                    status: Some(WorkStatus::Completed),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();

        let pending = h.orchestrator.pending_updates(h.admin_id).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].row.id, row.id);
        assert_eq!(pending[0].reasons, vec![PendingReason::Version, PendingReason::Status]);

        h.orchestrator.acknowledge(h.admin_id, row.id).unwrap();
        assert!(h.orchestrator.pending_updates(h.admin_id).unwrap().is_empty());
        assert!(matches!(
            h.orchestrator.acknowledge(h.admin_id, 999),
            Err(SyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_sync_reports_by_default() {
        let h = harness();
        h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);
        h.track(LUST, "Lust Theory", WorkStatus::Abandoned);

        let report = h.orchestrator.spawn_manual_sync(h.admin_id).await.unwrap().unwrap();
        assert_eq!(report.total, 1);

        let sent = h.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.kind, NotificationKind::SyncComplete);
        assert_eq!(sent[0].message.title, "Manual Sync Complete");
        assert_eq!(sent[0].message.body, "Checked 1/1 games for updates.");
    }

    #[tokio::test]
    async fn test_manual_sync_forces_scrape_when_configured() {
        let h = harness();
        h.credentials();
        let row = h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);
        h.store
            .apply_work_update(
                row.work.id,
                &WorkUpdate {
                    description: Some("Known".to_string()),
                    engine: Some("Ren'Py".to_string()),
                    tags: Some(vec!["3dcg".to_string()]),
                    download_links: fixtures::thread_record(ETERNUM).download_links.into(),
                    scraped_at: Some(Utc::now()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        settings::set_flag(h.store.as_ref(), h.admin_id, settings::NOTIFY_ON_SYNC_COMPLETE, false).unwrap();

        h.orchestrator.spawn_manual_sync(h.admin_id).await.unwrap().unwrap();
        assert!(h.scraper.calls().await.is_empty());

        settings::set_flag(h.store.as_ref(), h.admin_id, settings::FORCE_SCRAPE_ON_MANUAL_SYNC, true).unwrap();
        h.orchestrator.spawn_manual_sync(h.admin_id).await.unwrap().unwrap();
        assert_eq!(h.scraper.calls().await.len(), 1);
        assert!(h.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_single_sync() {
        let h = harness();
        let row = h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);

        assert!(matches!(
            h.orchestrator.spawn_single_sync(h.admin_id, 999),
            Err(SyncError::NotFound(_))
        ));

        let outcome = h
            .orchestrator
            .spawn_single_sync(h.admin_id, row.id)
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.tracking_id, row.id);
        assert_eq!(h.titles().await, vec!["Game Sync Complete".to_string()]);
    }

    #[tokio::test]
    async fn test_search_merges_local_and_feed() {
        let h = harness();
        h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);
        h.feed
            .add_entry(None, fixtures::feed_entry("Eternum", "v0.7", "https://forum.example/threads/4242/"))
            .await;
        h.feed
            .add_entry(None, fixtures::feed_entry("Eternal Summer", "v2", "https://forum.example/threads/summer.99/"))
            .await;

        let results = h.orchestrator.search_works(h.admin_id, "Etern").await.unwrap();
        assert!(results.feed_error.is_none());
        assert_eq!(results.hits.len(), 2);
        assert_eq!(results.hits[0].source, HitSource::Local);
        assert!(results.hits[0].already_tracked);
        assert_eq!(results.hits[1].source, HitSource::Feed);
        assert_eq!(results.hits[1].name, "Eternal Summer");
        assert!(!results.hits[1].already_tracked);

        let query = h.feed.queries().await.pop().unwrap();
        assert_eq!(query.search.as_deref(), Some("Etern"));
    }

    #[tokio::test]
    async fn test_search_survives_feed_failure() {
        let h = harness();
        h.track(ETERNUM, "Eternum", WorkStatus::Ongoing);
        h.feed.fail_next(FeedError::Unreachable("down".to_string())).await;

        let results = h.orchestrator.search_works(h.admin_id, "eternum").await.unwrap();
        assert_eq!(results.hits.len(), 1);
        assert!(results.feed_error.is_some());

        assert!(h.orchestrator.search_works(h.admin_id, "  ").await.unwrap().hits.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_creates_and_scrapes() {
        let h = harness();
        let mut entry = fixtures::feed_entry("Eternum", "v0.7", ETERNUM);
        entry.pub_date = Some(Utc.with_ymd_and_hms(2024, 5, 18, 0, 0, 0).unwrap());
        h.feed.add_entry(None, entry).await;
        h.feed
            .add_entry(Some(StatusFilter::Completed), fixtures::feed_entry("Other", "v1", LUST))
            .await;

        // Without credentials works are stored but not scraped
        let report = h.orchestrator.ingest_latest().await.unwrap();
        assert_eq!(report, IngestReport { seen: 1, created: 1, scraped: 0 });
        assert!(h.scraper.calls().await.is_empty());

        h.credentials();
        h.scraper.set_record(ETERNUM, fixtures::thread_record(ETERNUM)).await;
        let report = h.orchestrator.ingest_latest().await.unwrap();
        assert_eq!(report, IngestReport { seen: 1, created: 0, scraped: 1 });

        let work = h.store.find_work_by_url(ETERNUM).unwrap().unwrap();
        assert_eq!(work.engine.as_deref(), Some("Ren'Py"));
        assert_eq!(work.version, "v0.7");
        assert!(work.last_seen_on_feed.is_some());

        // Freshly scraped works are left alone
        let report = h.orchestrator.ingest_latest().await.unwrap();
        assert_eq!(report.scraped, 0);
    }

    #[tokio::test]
    async fn test_ingest_fails_when_feed_unreachable() {
        let h = harness();
        h.feed.set_unreachable(true).await;
        assert!(matches!(h.orchestrator.ingest_latest().await, Err(SyncError::Feed(_))));
    }
}
