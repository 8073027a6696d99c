//! Testing utilities and mock implementations.
//!
//! Every outbound seam (HTTP transport, feed, browser, scraper, image cache,
//! push service) has a mock here, so the detector and orchestrator can be
//! exercised end to end against a real SQLite store.
//!
//! # Example
//!
//! ```rust,ignore
//! use threadwatch_core::testing::{fixtures, MockFeedSource, MockScraper};
//!
//! let feed = MockFeedSource::new();
//! feed.add_entry(Some(StatusFilter::Ongoing), fixtures::feed_entry("Eternum", "v0.7", url)).await;
//!
//! let scraper = MockScraper::new();
//! scraper.set_record(url, fixtures::thread_record(url)).await;
//! ```

mod mock_browser;
mod mock_feed;
mod mock_image_cache;
mod mock_notifier;
mod mock_scraper;
mod mock_transport;

pub use mock_browser::{BrowserLog, MockBrowser};
pub use mock_feed::MockFeedSource;
pub use mock_image_cache::MockImageCache;
pub use mock_notifier::{MockNotifier, SentNotification};
pub use mock_scraper::{MockScraper, RecordedScrape};
pub use mock_transport::{MockTransport, RecordedCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{TimeZone, Utc};

    use crate::feed::FeedEntry;
    use crate::store::{Work, WorkStatus};
    use crate::thread_page::{DownloadLink, LinkOs, ThreadRecord};

    fn xml_escape(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    }

    /// One `<item>` as the forum feed renders it.
    pub fn rss_item(title: &str, link: &str, author: &str, pub_date: &str, image: Option<&str>) -> String {
        let description = match image {
            Some(src) => format!("<![CDATA[<img src=\"{src}\"> Latest update]]>"),
            None => "Latest update".to_string(),
        };
        format!(
            "<item>\n  <title>{}</title>\n  <link>{}</link>\n  <dc:creator>{}</dc:creator>\n  <pubDate>{}</pubDate>\n  <description>{}</description>\n</item>",
            xml_escape(title),
            xml_escape(link),
            xml_escape(author),
            pub_date,
            description
        )
    }

    /// A complete RSS document around `items`.
    pub fn rss_document(items: &[String]) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n<channel>\n<title>Latest Updates</title>\n{}\n</channel>\n</rss>",
            items.join("\n")
        )
    }

    /// Rendered thread page with spoilers expanded.
    pub fn thread_page_html() -> String {
        r#"<!DOCTYPE html>
<html>
<head><title>Eternum [v0.7 Public] [Caribdis] | F95zone</title></head>
<body>
<div class="p-title">
  <h1 class="p-title-value"><a class="labelLink" href="/forums/games.2/?prefix_id=7"><span class="label">Ren'Py</span></a><span class="label-append">&nbsp;</span>Eternum [v0.7 Public] [Caribdis]</h1>
  <div class="tagGroup"><a class="tagItem" href="/tags/3dcg/">3dcg</a><a class="tagItem" href="/tags/male-protagonist/">male protagonist</a></div>
</div>
<article class="message message--post">
  <div class="message-user"><a class="username" href="/members/caribdis.1/">Caribdis</a></div>
  <div class="message-content">
    <div class="bbWrapper"><img src="data:image/gif;base64,R0lGODlhAQABAAAAACw=" data-src="https://attachments.forum.example/cover.png" alt="cover"><br>
<b>Overview:</b><br>You wake up in a world that is not yours.<br>Find your way home.<br><br>
<b>Thread Updated</b>: 2024-05-18<br>
<b>Release Date</b>: 2024-05-18<br>
<b>Developer</b>: Caribdis - <a href="https://www.patreon.com/caribdis">Patreon</a><br>
<b>Censored</b>: None<br>
<b>Version</b>: 0.7<br>
<b>OS</b>: Windows, Linux, Mac, Android<br>
<b>Language</b>: English<br>
<b>Status</b>: Ongoing<br>
<div class="bbCodeSpoiler"><button class="bbCodeSpoiler-button" type="button">Genre</button><div class="bbCodeSpoiler-content">3dcg, Male protagonist, Romance</div></div>
<br>
<b>DOWNLOAD</b><br>
<b>Win</b>: <a href="https://mega.nz/file/win">MEGA</a><br>
<b>Linux</b>: <a href="https://mega.nz/file/linux">MEGA</a><br>
<b>Mac</b>: <a href="https://mega.nz/file/mac">MEGA</a><br>
<b>Extras</b>: <a href="https://gofile.io/d/mod">Walkthrough Mod</a><br>
<div class="bbCodeSpoiler"><button class="bbCodeSpoiler-button" type="button">Changelog</button><div class="bbCodeSpoiler-content">v0.7: New chapter<br>v0.6: Fixes</div></div>
</div>
  </div>
</article>
</body>
</html>"#
            .to_string()
    }

    /// A stored work with feed fields set and nothing scraped yet.
    pub fn work(id: i64, url: &str) -> Work {
        Work {
            id,
            url: url.to_string(),
            thread_id: crate::matching::extract_thread_id(url),
            name: "Eternum".to_string(),
            version: "v0.6".to_string(),
            author: "Caribdis".to_string(),
            image: None,
            rss_pub_date: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            status: WorkStatus::Ongoing,
            description: None,
            changelog: None,
            engine: None,
            language: None,
            censorship: None,
            tags: Vec::new(),
            download_links: Vec::new(),
            download_raw_html: None,
            os_list: None,
            release_date: None,
            thread_updated: None,
            first_added: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
            last_seen_on_feed: None,
            last_updated: None,
            last_checked: None,
            last_scraped: None,
        }
    }

    pub fn feed_entry(name: &str, version: &str, url: &str) -> FeedEntry {
        FeedEntry {
            name: name.to_string(),
            version: version.to_string(),
            author: "Caribdis".to_string(),
            url: url.to_string(),
            pub_date: Some(Utc.with_ymd_and_hms(2024, 5, 18, 10, 0, 0).unwrap()),
            image: None,
        }
    }

    /// What a logged-in scrape of [`thread_page_html`] roughly yields.
    pub fn thread_record(url: &str) -> ThreadRecord {
        ThreadRecord {
            url: url.to_string(),
            title: "Eternum [v0.7 Public] [Caribdis]".to_string(),
            name: "Eternum".to_string(),
            version: "v0.7 Public".to_string(),
            author: "Caribdis".to_string(),
            tags: vec!["3dcg".to_string(), "Male protagonist".to_string()],
            description: "You wake up in a world that is not yours.".to_string(),
            changelog: "v0.7: New chapter".to_string(),
            download_links: vec![
                DownloadLink::new("MEGA", "https://mega.nz/file/win", LinkOs::Win),
                DownloadLink::new("MEGA", "https://mega.nz/file/linux", LinkOs::Linux),
            ],
            engine: "Ren'Py".to_string(),
            language: "English".to_string(),
            status: "Ongoing".to_string(),
            censorship: "None".to_string(),
            release_date: "2024-05-18".to_string(),
            thread_updated: "2024-05-18".to_string(),
            os_list: "Windows, Linux".to_string(),
            download_raw_html: "<b>DOWNLOAD</b><br><b>Win</b>: <a href=\"https://mega.nz/file/win\">MEGA</a>".to_string(),
            cover_image: Some("https://attachments.forum.example/cover.png".to_string()),
        }
    }
}
