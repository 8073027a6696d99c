//! RSS body and title parsing.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex_lite::Regex;
use tracing::warn;

static PRIMARY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(?:UPDATE|NEW|GAME)\]\s+(.*)$").expect("valid title pattern"));

static ANY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[^\]]+\]\s*(.*)$").expect("valid title pattern"));

static VERSION_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\d|^(v|ver|ep|ch|final|public|beta|alpha)\b").expect("valid version pattern")
});

static DEFINITE_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^v(?:er)?\.?\s*\d").expect("valid version pattern"));

static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).expect("valid image pattern")
});

static ANGLE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*<[^>]*@[^>]*>\s*").expect("valid author pattern"));

static PAREN_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^)]*@[^)]*\)\s*").expect("valid author pattern"));

static EMAIL_WITH_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+@\S+\s*\(([^)]+)\)$").expect("valid author pattern"));

/// Name, version and optional author split out of a feed title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub name: String,
    pub version: String,
    pub author: Option<String>,
}

/// Split trailing `[...]` groups off `text`, rightmost first, up to `max`.
fn trailing_groups(text: &str, max: usize) -> (String, Vec<String>) {
    let mut rest = text.trim_end().to_string();
    let mut groups = Vec::new();
    while groups.len() < max && rest.ends_with(']') {
        let Some(open) = rest.rfind('[') else {
            break;
        };
        let inner = rest[open + 1..rest.len() - 1].trim().to_string();
        rest = rest[..open].trim_end().to_string();
        if inner.is_empty() {
            continue;
        }
        groups.push(inner);
    }
    (rest, groups)
}

fn is_author_group(last: &str, before: &str) -> bool {
    if DEFINITE_VERSION.is_match(last) {
        return false;
    }
    VERSION_HINT.is_match(before) || !VERSION_HINT.is_match(last)
}

/// Parse `[UPDATE|NEW|GAME] Name [Version] [Author]`.
///
/// A lone trailing group is the version. With two groups the rightmost is the
/// author, unless it is plainly a version (`v1.2`) or the group before it does
/// not look like one. Other leading tags are stripped and the version defaults
/// to "Unknown".
pub fn parse_feed_title(title: &str) -> ParsedTitle {
    let title = title.trim();

    if let Some(body) = PRIMARY_TAG.captures(title).and_then(|c| c.get(1)) {
        let (rest, groups) = trailing_groups(body.as_str(), 2);
        let (name, version, author) = match groups.as_slice() {
            [last, before] if is_author_group(last, before) => {
                (rest, before.clone(), Some(last.clone()))
            }
            [last, before] => (format!("{rest} [{before}]"), last.clone(), None),
            [only] => (rest, only.clone(), None),
            _ => (rest, "Unknown".to_string(), None),
        };
        if !name.trim().is_empty() {
            return ParsedTitle {
                name: name.trim().to_string(),
                version,
                author,
            };
        }
    }

    let name = ANY_TAG
        .captures(title)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| title.to_string());

    ParsedTitle {
        name,
        version: "Unknown".to_string(),
        author: None,
    }
}

/// Remove feed decorations from an author string. Empty results become "N/A".
pub fn clean_author(raw: &str) -> String {
    let raw = raw.trim();
    let cleaned = if let Some(name) = EMAIL_WITH_NAME.captures(raw).and_then(|c| c.get(1)) {
        name.as_str().trim().to_string()
    } else {
        let without_angle = ANGLE_MARKER.replace_all(raw, " ");
        PAREN_MARKER
            .replace_all(&without_angle, " ")
            .trim()
            .to_string()
    };

    if cleaned.is_empty() {
        "N/A".to_string()
    } else {
        cleaned
    }
}

/// First `<img src>` in an HTML fragment.
pub fn extract_image_url(html: &str) -> Option<String> {
    IMG_SRC
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Fields of an `<item>` before title parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub author: String,
    pub pub_date: Option<DateTime<Utc>>,
    pub description: String,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Author,
    PubDate,
    Description,
}

fn field_for(local_name: &[u8]) -> Option<Field> {
    match local_name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"author" | b"creator" => Some(Field::Author),
        b"pubDate" | b"published" => Some(Field::PubDate),
        b"description" => Some(Field::Description),
        _ => None,
    }
}

/// Collect `<item>` elements from an RSS document.
///
/// Malformed XML stops parsing; items completed before the error are kept.
pub fn parse_rss(xml: &str) -> Vec<RawItem> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<RawItem> = None;
    let mut field: Option<Field> = None;
    let mut pub_date_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    current = Some(RawItem::default());
                    pub_date_text.clear();
                } else if current.is_some() {
                    field = field_for(name.as_ref());
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    if let Some(mut item) = current.take() {
                        item.pub_date = parse_pub_date(&pub_date_text);
                        items.push(item);
                    }
                }
                field = None;
            }
            Ok(Event::Text(t)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    match t.unescape() {
                        Ok(text) => append(item, &mut pub_date_text, f, &text),
                        Err(e) => warn!(error = %e, "Undecodable feed text"),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let text = String::from_utf8_lossy(&c);
                    append(item, &mut pub_date_text, f, &text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(
                    position = reader.buffer_position(),
                    error = %e,
                    parsed = items.len(),
                    "Malformed feed XML"
                );
                break;
            }
        }
    }

    items
}

fn append(item: &mut RawItem, pub_date: &mut String, field: Field, text: &str) {
    let target = match field {
        Field::Title => &mut item.title,
        Field::Link => &mut item.link,
        Field::Author => &mut item.author,
        Field::PubDate => pub_date,
        Field::Description => &mut item.description,
    };
    target.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_title_with_version_and_author() {
        let parsed = parse_feed_title("[UPDATE] Eternum [v0.7 Public] [Caribdis]");
        assert_eq!(parsed.name, "Eternum");
        assert_eq!(parsed.version, "v0.7 Public");
        assert_eq!(parsed.author.as_deref(), Some("Caribdis"));
    }

    #[test]
    fn test_title_author_with_digits() {
        let parsed = parse_feed_title("[UPDATE] Foo Bar [v0.2] [Dev2]");
        assert_eq!(parsed.name, "Foo Bar");
        assert_eq!(parsed.version, "v0.2");
        assert_eq!(parsed.author.as_deref(), Some("Dev2"));

        let parsed = parse_feed_title("[NEW] Night Shift [Ep. 3] [Studio 42]");
        assert_eq!(parsed.name, "Night Shift");
        assert_eq!(parsed.version, "Ep. 3");
        assert_eq!(parsed.author.as_deref(), Some("Studio 42"));
    }

    #[test]
    fn test_title_with_version_only() {
        let parsed = parse_feed_title("[NEW] Another Game [0.5b]");
        assert_eq!(parsed.name, "Another Game");
        assert_eq!(parsed.version, "0.5b");
        assert_eq!(parsed.author, None);
    }

    #[test]
    fn test_title_with_bracket_in_name() {
        let parsed = parse_feed_title("[GAME] Summer Days [Remake] [v1.2]");
        assert_eq!(parsed.name, "Summer Days [Remake]");
        assert_eq!(parsed.version, "v1.2");
        assert_eq!(parsed.author, None);
    }

    #[test]
    fn test_title_fallback_strips_other_tag() {
        let parsed = parse_feed_title("[HOT] Some Title");
        assert_eq!(parsed.name, "Some Title");
        assert_eq!(parsed.version, "Unknown");

        let parsed = parse_feed_title("[UPDATE] Bare Name");
        assert_eq!(parsed.name, "Bare Name");
        assert_eq!(parsed.version, "Unknown");
    }

    #[test]
    fn test_title_without_tag() {
        let parsed = parse_feed_title("Plain title");
        assert_eq!(parsed.name, "Plain title");
        assert_eq!(parsed.version, "Unknown");
    }

    #[test]
    fn test_clean_author() {
        assert_eq!(clean_author("Caribdis <rss@f95>"), "Caribdis");
        assert_eq!(clean_author("Caribdis <RSS@F95>"), "Caribdis");
        assert_eq!(clean_author("rss@f95 (Caribdis)"), "Caribdis");
        assert_eq!(clean_author("M&K (noreply@forum.example)"), "M&K");
        assert_eq!(clean_author("<rss@f95>"), "N/A");
        assert_eq!(clean_author(""), "N/A");
    }

    #[test]
    fn test_extract_image_url() {
        let html = r#"<p>Cover</p><IMG class="x" SRC='https://attachments.example/cover.jpg' />"#;
        assert_eq!(
            extract_image_url(html).as_deref(),
            Some("https://attachments.example/cover.jpg")
        );
        assert_eq!(extract_image_url("<p>no image</p>"), None);
    }

    #[test]
    fn test_parse_rss_items() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
  <title>Latest</title>
  <item>
    <title>[UPDATE] Eternum [v0.7 Public] [Caribdis]</title>
    <link>https://forum.example/threads/eternum.4242/</link>
    <dc:creator>Caribdis &lt;rss@f95&gt;</dc:creator>
    <pubDate>Sat, 18 May 2024 10:00:00 GMT</pubDate>
    <description><![CDATA[<img src="https://attachments.example/eternum.png"> text]]></description>
  </item>
  <item>
    <title>[NEW] M&amp;K Tales</title>
    <link>https://forum.example/threads/tales.99/</link>
  </item>
</channel>
</rss>"#;
        let items = parse_rss(xml);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "[UPDATE] Eternum [v0.7 Public] [Caribdis]");
        assert_eq!(items[0].link, "https://forum.example/threads/eternum.4242/");
        assert_eq!(items[0].author, "Caribdis <rss@f95>");
        assert_eq!(
            items[0].pub_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 18, 10, 0, 0).unwrap())
        );
        assert!(items[0].description.contains("eternum.png"));
        assert_eq!(items[1].title, "[NEW] M&K Tales");
        assert_eq!(items[1].pub_date, None);
    }

    #[test]
    fn test_parse_rss_garbage_yields_empty() {
        assert!(parse_rss("this is not xml <<<").is_empty());
    }
}
