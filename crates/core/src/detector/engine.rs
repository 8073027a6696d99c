//! Per-work change detection.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::feed::{FeedEntry, FeedQuery, FeedSource, StatusFilter};
use crate::image_cache::ImageCacher;
use crate::matching::{generate_strategies, same_work};
use crate::metrics;
use crate::notify::{notify_user, Delivery, Notifier, PushMessage};
use crate::store::{settings, TrackingRow, TrackingStore, Work, WorkStatus, WorkUpdate};
use crate::thread_page::{ThreadRecord, ThreadScraper};

use super::reconcile::{apply_feed_entry, apply_scrape, scrape_reasons};
use super::{CheckOutcome, DetectError};

/// Feed lookup order when the ongoing feed has no match.
const TERMINAL_LOOKUPS: [StatusFilter; 3] = [StatusFilter::Completed, StatusFilter::Abandoned, StatusFilter::OnHold];

/// Lookup order used to confirm an unresolved scraped status.
const CONFIRM_LOOKUPS: [StatusFilter; 4] = [
    StatusFilter::Ongoing,
    StatusFilter::Completed,
    StatusFilter::OnHold,
    StatusFilter::Abandoned,
];

/// Status-filtered lookup results for one check.
type LookupCache = HashMap<StatusFilter, Option<FeedEntry>>;

pub struct ChangeDetector {
    store: Arc<dyn TrackingStore>,
    feed: Arc<dyn FeedSource>,
    scraper: Arc<dyn ThreadScraper>,
    images: Arc<dyn ImageCacher>,
    notifier: Arc<dyn Notifier>,
    config: DetectorConfig,
}

impl ChangeDetector {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        feed: Arc<dyn FeedSource>,
        scraper: Arc<dyn ThreadScraper>,
        images: Arc<dyn ImageCacher>,
        notifier: Arc<dyn Notifier>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            store,
            feed,
            scraper,
            images,
            notifier,
            config,
        }
    }

    /// Check one tracked work against the feed and, when needed, its thread page.
    pub async fn check_one(&self, user_id: i64, tracking_id: i64, force_scrape: bool) -> Result<CheckOutcome, DetectError> {
        let result = self.check_one_at(user_id, tracking_id, force_scrape, Utc::now()).await;
        let label = if result.is_ok() { "ok" } else { "failed" };
        metrics::WORKS_CHECKED.with_label_values(&[label]).inc();
        result
    }

    async fn check_one_at(
        &self,
        user_id: i64,
        tracking_id: i64,
        force_scrape: bool,
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome, DetectError> {
        let row = self
            .store
            .get_tracking(user_id, tracking_id)?
            .ok_or(DetectError::NotTracked { user_id, tracking_id })?;
        let work = &row.work;
        debug!(user_id, tracking_id, work_id = work.id, name = %work.name, "Checking work");

        let mut lookups = LookupCache::new();
        let mut update = WorkUpdate::default();
        let mut new_status = work.status;

        let mut matched_feed = None;
        let mut matched_entry = None;
        if let Some(entry) = self.lookup(work, StatusFilter::Ongoing, &mut lookups).await {
            matched_feed = Some(StatusFilter::Ongoing);
            matched_entry = Some(entry);
            // The ongoing feed excludes every terminal prefix
            new_status = WorkStatus::Ongoing;
        } else {
            for filter in TERMINAL_LOOKUPS {
                if let Some(entry) = self.lookup(work, filter, &mut lookups).await {
                    matched_feed = Some(filter);
                    matched_entry = Some(entry);
                    new_status = filter.work_status();
                    break;
                }
            }
            if matched_feed.is_none() && work.status == WorkStatus::Unknown {
                new_status = WorkStatus::Ongoing;
            }
        }

        let mut version_changed = false;
        if let Some(entry) = &matched_entry {
            version_changed = apply_feed_entry(work, entry, &mut update);
            if let Some(remote) = &entry.image {
                let image = self.resolve_image(remote).await;
                if work.image.as_deref() != Some(image.as_str()) {
                    update.image = Some(image);
                }
            }
        }

        let reasons = scrape_reasons(
            work,
            force_scrape,
            version_changed,
            Duration::days(self.config.debounce_days),
            now,
        );
        let image_scrape = self.settle_image(work, &mut update).await;

        let mut scraped = false;
        if !reasons.is_empty() || image_scrape {
            if let Some(record) = self.scrape(work).await? {
                scraped = true;
                debug!(work_id = work.id, ?reasons, image_scrape, "Reconciling scraped thread");
                apply_scrape(work, &record, &mut update);
                update.scraped_at = Some(now);

                let current_image = update.image.as_ref().or(work.image.as_ref());
                if image_scrape || current_image.is_none() {
                    if let Some(cover) = &record.cover_image {
                        let image = self.resolve_image(cover).await;
                        if work.image.as_deref() != Some(image.as_str()) {
                            update.image = Some(image);
                        }
                    }
                }

                new_status = match record.work_status() {
                    WorkStatus::Unknown | WorkStatus::Ongoing => self.confirm_status(work, &mut lookups).await,
                    terminal => terminal,
                };
            }
        }

        if new_status != work.status {
            update.status = Some(new_status);
        }
        update.checked_at = Some(now);
        let updated = self.store.apply_work_update(work.id, &update, now)?;
        if update.has_changes() {
            info!(
                work_id = updated.id,
                name = %updated.name,
                version = %updated.version,
                status = %updated.status,
                "Work updated"
            );
        }

        let notified = self.emit_notifications(&row, &updated).await?;

        Ok(CheckOutcome {
            tracking_id,
            previous_status: work.status,
            matched_feed,
            scraped,
            notified,
            work: updated,
        })
    }

    /// First entry of a status-filtered feed that is this work, cached per filter.
    async fn lookup(&self, work: &Work, filter: StatusFilter, lookups: &mut LookupCache) -> Option<FeedEntry> {
        if let Some(cached) = lookups.get(&filter) {
            return cached.clone();
        }

        let mut found = None;
        for strategy in generate_strategies(&work.name, &work.author) {
            let query = FeedQuery::for_strategy(&strategy, Some(filter), self.config.feed_limit).without_image_cache();
            match self.feed.fetch_feed(&query).await {
                Ok(entries) => {
                    if let Some(entry) = entries.into_iter().find(|e| same_work(&e.url, &work.url)) {
                        debug!(work_id = work.id, filter = filter.as_str(), ?strategy, "Feed match");
                        found = Some(entry);
                        break;
                    }
                }
                Err(e) => warn!(work_id = work.id, filter = filter.as_str(), error = %e, "Feed lookup failed"),
            }
        }

        lookups.insert(filter, found.clone());
        found
    }

    /// Confirm a scraped status that is unresolved or merely "Ongoing".
    async fn confirm_status(&self, work: &Work, lookups: &mut LookupCache) -> WorkStatus {
        for filter in CONFIRM_LOOKUPS {
            if self.lookup(work, filter, lookups).await.is_some() {
                return filter.work_status();
            }
        }
        WorkStatus::Ongoing
    }

    /// Cache path for a remote image, or the remote URL when caching failed.
    async fn resolve_image(&self, reference: &str) -> String {
        if self.images.is_local_reference(reference) {
            return reference.to_string();
        }
        self.images
            .cache(reference)
            .await
            .unwrap_or_else(|| reference.to_string())
    }

    /// Re-resolve the stored image where possible. Returns whether the
    /// thread page is needed to recover it.
    async fn settle_image(&self, work: &Work, update: &mut WorkUpdate) -> bool {
        let Some(current) = update.image.clone().or_else(|| work.image.clone()) else {
            return false;
        };
        if self.images.is_local_reference(&current) {
            return !self.images.local_file_exists(&current);
        }
        match self.images.cache(&current).await {
            Some(local) => {
                update.image = Some(local);
                false
            }
            None => true,
        }
    }

    async fn scrape(&self, work: &Work) -> Result<Option<ThreadRecord>, DetectError> {
        let Some(credentials) = settings::forum_credentials(self.store.as_ref())? else {
            debug!(work_id = work.id, "No forum credentials, scrape skipped");
            metrics::SCRAPES.with_label_values(&["skipped_no_credentials"]).inc();
            return Ok(None);
        };
        match self.scraper.scrape(&work.url, Some(&credentials)).await {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(work_id = work.id, url = %work.url, error = %e, "Scrape failed, keeping feed data");
                Ok(None)
            }
        }
    }

    /// Notify about differences from the last-notified triple.
    async fn emit_notifications(&self, row: &TrackingRow, updated: &Work) -> Result<Vec<PushMessage>, DetectError> {
        let observed = updated.observed();
        let last = &row.last_notified;
        if observed == *last {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        if observed.version != last.version || observed.rss_date != last.rss_date {
            events.push((
                settings::NOTIFY_ON_GAME_UPDATE,
                PushMessage::update(&updated.name, &updated.version, &updated.url),
            ));
        }
        if observed.status != last.status {
            let toggle = match updated.status {
                WorkStatus::Completed => Some(settings::NOTIFY_ON_STATUS_CHANGE_COMPLETED),
                WorkStatus::Abandoned => Some(settings::NOTIFY_ON_STATUS_CHANGE_ABANDONED),
                WorkStatus::OnHold => Some(settings::NOTIFY_ON_STATUS_CHANGE_ON_HOLD),
                // Only a revival from a terminal or paused state
                WorkStatus::Ongoing if last.status.is_some_and(|s| s.is_inactive()) => {
                    Some(settings::NOTIFY_ON_GAME_UPDATE)
                }
                WorkStatus::Ongoing => None,
                WorkStatus::Unknown => None,
            };
            if let Some(toggle) = toggle {
                events.push((
                    toggle,
                    PushMessage::status_change(&updated.name, updated.status, &updated.url),
                ));
            }
        }

        let mut sent = Vec::new();
        for (toggle, message) in events {
            if !settings::get_flag(self.store.as_ref(), row.user_id, toggle, false)? {
                debug!(user_id = row.user_id, toggle, "Notification toggle off");
                continue;
            }
            let delivery = notify_user(self.store.as_ref(), self.notifier.as_ref(), row.user_id, &message).await;
            if delivery != Delivery::Sent {
                debug!(user_id = row.user_id, ?delivery, title = %message.title, "Notification not delivered");
            }
            sent.push(message);
        }

        if !sent.is_empty() {
            self.store.update_last_notified(row.user_id, row.id, &observed)?;
        }
        Ok(sent)
    }
}
