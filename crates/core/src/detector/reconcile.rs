//! Pure reconciliation rules between stored works and upstream observations.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::feed::FeedEntry;
use crate::store::{Work, WorkUpdate};
use crate::thread_page::{os_list, resolved, ThreadRecord};

/// Values that mean "not known yet".
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v.eq_ignore_ascii_case("unknown") || v.eq_ignore_ascii_case("n/a") || v == crate::thread_page::NOT_FOUND
}

/// Why a work gets scraped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeReason {
    Forced,
    VersionChanged,
    NeverScraped,
    StaleDetails,
    TagsMissing,
    LinksMissing,
    NoPlatformLink,
}

/// Fold a matching feed entry into `update`. Returns whether the version moved.
///
/// The entry's image is left to the caller since it needs the image cache.
pub fn apply_feed_entry(work: &Work, entry: &FeedEntry, update: &mut WorkUpdate) -> bool {
    if !is_placeholder(&entry.name) && entry.name != work.name {
        update.name = Some(entry.name.clone());
    }

    let version_changed = !is_placeholder(&entry.version) && entry.version != work.version;
    if version_changed {
        update.version = Some(entry.version.clone());
    }

    if !is_placeholder(&entry.author) && entry.author != work.author {
        update.author = Some(entry.author.clone());
    }

    if let Some(date) = entry.pub_date {
        if work.rss_pub_date.is_none_or(|stored| date > stored) {
            update.rss_pub_date = Some(date);
        }
    }

    version_changed
}

/// Reasons a check must scrape the thread page.
pub fn scrape_reasons(
    work: &Work,
    force: bool,
    version_changed: bool,
    debounce: Duration,
    now: DateTime<Utc>,
) -> Vec<ScrapeReason> {
    let mut reasons = Vec::new();
    if force {
        reasons.push(ScrapeReason::Forced);
    }
    if version_changed {
        reasons.push(ScrapeReason::VersionChanged);
    }
    match work.last_scraped {
        None => reasons.push(ScrapeReason::NeverScraped),
        Some(at) if now - at > debounce && work.has_missing_details() => {
            reasons.push(ScrapeReason::StaleDetails)
        }
        Some(_) => {}
    }
    if work.tags_missing() {
        reasons.push(ScrapeReason::TagsMissing);
    }
    if work.links_missing() {
        reasons.push(ScrapeReason::LinksMissing);
    } else if !work.has_platform_link() {
        reasons.push(ScrapeReason::NoPlatformLink);
    }
    reasons
}

fn fill_if_placeholder(current: &str, scraped: &str, slot: &mut Option<String>) {
    if slot.as_deref().is_some_and(|v| !is_placeholder(v)) {
        return;
    }
    if is_placeholder(current) {
        if let Some(value) = resolved(scraped).filter(|v| !is_placeholder(v)) {
            *slot = Some(value.to_string());
        }
    }
}

/// Fold a scraped record into `update`.
///
/// Name, version and author are only filled where neither the stored work nor
/// a feed match already supplied a real value. Detail fields are overwritten.
pub fn apply_scrape(work: &Work, record: &ThreadRecord, update: &mut WorkUpdate) {
    fill_if_placeholder(&work.name, &record.name, &mut update.name);
    fill_if_placeholder(&work.version, &record.version, &mut update.version);
    fill_if_placeholder(&work.author, &record.author, &mut update.author);

    update.description = Some(record.description.clone());
    update.changelog = Some(record.changelog.clone());
    update.engine = Some(record.engine.clone());
    update.language = Some(record.language.clone());
    update.censorship = Some(record.censorship.clone());
    update.tags = Some(record.tags.clone());
    update.download_links = Some(record.download_links.clone());
    update.download_raw_html = Some(record.download_raw_html.clone());
    update.release_date = Some(record.release_date.clone());
    update.thread_updated = Some(record.thread_updated.clone());

    let os_list = if resolved(&record.os_list).is_some() {
        record.os_list.clone()
    } else {
        let found = os_list(&record.download_links);
        if found.is_empty() {
            record.os_list.clone()
        } else {
            found.iter().map(|os| os.as_str()).collect::<Vec<_>>().join(", ")
        }
    };
    update.os_list = Some(os_list);
}
