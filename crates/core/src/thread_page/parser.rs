//! Thread page HTML to [`ThreadRecord`].
//!
//! Works on the rendered page after spoilers were expanded. Every lookup is
//! best-effort: missing structure leaves the field at [`NOT_FOUND`].

use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Node, Selector};

use crate::store::WorkStatus;

use super::links::{extract_download_links, os_list, prioritise_links};
use super::title::parse_thread_title;
use super::types::resolved;
use super::{ThreadRecord, NOT_FOUND};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static HEADING: Lazy<Selector> = Lazy::new(|| selector("h1.p-title-value"));
static DOC_TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static FIRST_POST: Lazy<Selector> = Lazy::new(|| selector("article.message--post"));
static POST_BODY: Lazy<Selector> = Lazy::new(|| selector("div.bbWrapper"));
static USERNAME: Lazy<Selector> = Lazy::new(|| selector("a.username"));
static SPOILER: Lazy<Selector> = Lazy::new(|| selector("div.bbCodeSpoiler"));
static SPOILER_BUTTON: Lazy<Selector> = Lazy::new(|| selector("button.bbCodeSpoiler-button"));
static SPOILER_CONTENT: Lazy<Selector> = Lazy::new(|| selector("div.bbCodeSpoiler-content"));
static TAG_ITEMS: Lazy<Selector> = Lazy::new(|| selector("div.tagGroup a.tagItem"));
static INFO_LISTS: Lazy<Selector> =
    Lazy::new(|| selector("dl.pairs--columns, dl.block-body-infoPairs, dl.pairs--justified"));
static ALL_DT: Lazy<Selector> = Lazy::new(|| selector("dt"));
static ANCHORS: Lazy<Selector> = Lazy::new(|| selector("a"));
static IMAGES: Lazy<Selector> = Lazy::new(|| selector("img"));
static HEADERS: Lazy<Selector> = Lazy::new(|| selector("b, strong, h2, h3, h4"));

static LABEL_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z /]{1,30}?)\s*:\s*(.+?)\s*$").expect("valid regex"));

static ENGINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(ren'?py|unity|rpgm|rpg maker(?: ?m[vz])?|html|unreal engine|unreal|tyranobuilder|wolf rpg|qsp|rags|godot|flash|webgl|adrift)\b",
    )
    .expect("valid regex")
});

static STATUS_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(completed|ongoing|on[ -]?hold|abandoned|hiatus)\b").expect("valid regex")
});

static CENSORSHIP_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(uncensored|censored)\b").expect("valid regex"));

const CHANGELOG_KEYWORDS: &[&str] = &["changelog", "what's new", "update notes", "version history"];

const SECTION_KEYWORDS: &[&str] = &[
    "download",
    "changelog",
    "what's new",
    "updates",
    "version",
    "language",
    "status",
    "engine",
    "developer",
    "release date",
    "thread updated",
    "censored",
    "installation",
];

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "form", "noscript"];

const BLOCK_ELEMENTS: &[&str] = &[
    "br", "p", "div", "li", "ul", "ol", "dl", "dt", "dd", "h1", "h2", "h3", "h4", "h5", "h6", "tr",
    "blockquote",
];

/// Longest text still treated as a section header.
const MAX_HEADER_CHARS: usize = 60;

/// Element text with whitespace collapsed.
pub(super) fn text_of(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Element text split into trimmed lines at block boundaries.
fn lines_of(el: ElementRef) -> Vec<String> {
    let mut raw = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(text) => {
                let skipped = node
                    .parent()
                    .and_then(|p| p.value().as_element().map(|e| SKIPPED_ELEMENTS.contains(&e.name())))
                    .unwrap_or(false);
                if !skipped {
                    raw.push_str(text);
                }
            }
            Node::Element(e) if BLOCK_ELEMENTS.contains(&e.name()) => raw.push('\n'),
            _ => {}
        }
    }
    raw.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect()
}

fn multiline_text(el: ElementRef) -> String {
    lines_of(el).join("\n")
}

fn lowered_contains_any(text: &str, keywords: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    keywords.iter().any(|k| lowered.contains(k))
}

fn is_spoiler(el: &ElementRef) -> bool {
    el.value().name() == "div" && el.value().classes().any(|c| c == "bbCodeSpoiler")
}

fn is_section_header(el: &ElementRef) -> bool {
    let name = el.value().name();
    let header_like = matches!(name, "b" | "strong" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
        || el.select(&HEADERS).next().is_some();
    if !header_like {
        return false;
    }
    let text = text_of(*el);
    text.chars().count() <= MAX_HEADER_CHARS && lowered_contains_any(&text, SECTION_KEYWORDS)
}

/// Heading text without prefix labels, plus the full heading.
fn heading(doc: &Html) -> Option<(String, String)> {
    if let Some(h1) = doc.select(&HEADING).next() {
        let mut own = String::new();
        for child in h1.children() {
            match child.value() {
                Node::Text(text) => own.push_str(text),
                Node::Element(e) if e.classes().any(|c| c.starts_with("label")) => {}
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        own.push_str(&el.text().collect::<String>());
                    }
                }
                _ => {}
            }
        }
        let own = own.split_whitespace().collect::<Vec<_>>().join(" ");
        return Some((own, text_of(h1)));
    }

    doc.select(&DOC_TITLE).next().map(|t| {
        let title = text_of(t).replace(" | F95zone", "");
        (title.clone(), title)
    })
}

/// `Key: value` lines of the first post.
#[derive(Debug, Default)]
struct PostLabels {
    developer: Option<String>,
    version: Option<String>,
    release_date: Option<String>,
    thread_updated: Option<String>,
    os: Option<String>,
    language: Option<String>,
    censorship: Option<String>,
    engine: Option<String>,
    status: Option<String>,
}

fn first_segment(value: &str) -> String {
    value
        .split(" - ")
        .next()
        .unwrap_or(value)
        .split(" | ")
        .next()
        .unwrap_or(value)
        .trim()
        .to_string()
}

fn post_labels(lines: &[String]) -> PostLabels {
    let mut labels = PostLabels::default();
    for line in lines {
        let Some(caps) = LABEL_LINE.captures(line) else {
            continue;
        };
        let key = caps[1].trim().to_lowercase();
        let value = caps[2].trim().to_string();
        let slot = match key.as_str() {
            "developer" | "developer/publisher" | "author" => &mut labels.developer,
            "version" => &mut labels.version,
            "release date" => &mut labels.release_date,
            "thread updated" => &mut labels.thread_updated,
            "os" | "platform" | "platforms" => &mut labels.os,
            "language" | "languages" => &mut labels.language,
            "censored" | "censorship" => &mut labels.censorship,
            "engine" => &mut labels.engine,
            "status" => &mut labels.status,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(first_segment(&value)).filter(|v| !v.is_empty());
        }
    }
    labels
}

/// Structured `<dt>/<dd>` pairs.
#[derive(Debug, Default)]
struct InfoList {
    author: Option<String>,
    version: Option<String>,
    engine: Option<String>,
    language: Option<String>,
    status: Option<String>,
    censorship: Option<String>,
    os: Option<String>,
}

fn next_dd(dt: ElementRef) -> Option<ElementRef> {
    dt.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "dd")
}

fn info_list(doc: &Html) -> InfoList {
    let mut info = InfoList::default();
    for dl in doc.select(&INFO_LISTS) {
        for dt in dl.select(&ALL_DT) {
            let Some(dd) = next_dd(dt) else {
                continue;
            };
            let key = text_of(dt).to_lowercase();
            let value = text_of(dd);
            if value.is_empty() {
                continue;
            }
            let slot = if key.contains("developer") || key.contains("author") {
                &mut info.author
            } else if key.contains("version") {
                &mut info.version
            } else if key.contains("engine") {
                &mut info.engine
            } else if key.contains("language") {
                &mut info.language
            } else if key.contains("status") {
                &mut info.status
            } else if key.contains("censorship") {
                &mut info.censorship
            } else if key.contains("os") || key.contains("platform") {
                &mut info.os
            } else {
                continue;
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
    }
    info
}

fn split_tags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in text.split([',', '\n']) {
        let tag = tag.trim().trim_end_matches('.').trim();
        if !tag.is_empty() && !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn tags(doc: &Html, body: Option<ElementRef>) -> Vec<String> {
    if let Some(body) = body {
        for spoiler in body.select(&SPOILER) {
            let is_genre = spoiler
                .select(&SPOILER_BUTTON)
                .next()
                .map(|b| text_of(b).to_lowercase().contains("genre"))
                .unwrap_or(false);
            if !is_genre {
                continue;
            }
            if let Some(content) = spoiler.select(&SPOILER_CONTENT).next() {
                let found = split_tags(&multiline_text(content));
                if !found.is_empty() {
                    return found;
                }
            }
        }
    }

    let grouped: Vec<String> = doc.select(&TAG_ITEMS).map(text_of).filter(|t| !t.is_empty()).collect();
    if !grouped.is_empty() {
        return grouped;
    }

    for dt in doc.select(&ALL_DT) {
        if text_of(dt).to_lowercase().contains("tags") {
            if let Some(dd) = next_dd(dt) {
                return dd.select(&ANCHORS).map(text_of).filter(|t| !t.is_empty()).collect();
            }
        }
    }
    Vec::new()
}

fn changelog(body: ElementRef) -> Option<String> {
    let mut parts = Vec::new();
    for spoiler in body.select(&SPOILER) {
        let button = spoiler.select(&SPOILER_BUTTON).next();
        let content = spoiler.select(&SPOILER_CONTENT).next();
        if let (Some(button), Some(content)) = (button, content) {
            if lowered_contains_any(&text_of(button), CHANGELOG_KEYWORDS) {
                parts.push(multiline_text(content));
            }
        }
    }
    if !parts.is_empty() {
        return Some(parts.join("\n---\n"));
    }

    // Header followed by plain content
    let header = body
        .select(&HEADERS)
        .find(|h| lowered_contains_any(&text_of(*h), CHANGELOG_KEYWORDS))?;
    let mut text = Vec::new();
    for sibling in header.next_siblings() {
        match sibling.value() {
            Node::Text(t) => {
                let t = t.trim();
                if !t.is_empty() {
                    text.push(t.to_string());
                }
            }
            Node::Element(_) => {
                let Some(el) = ElementRef::wrap(sibling) else {
                    continue;
                };
                if is_spoiler(&el) || el.value().name().starts_with('h') || is_section_header(&el) {
                    break;
                }
                let t = multiline_text(el);
                if !t.is_empty() {
                    text.push(t);
                }
            }
            _ => {}
        }
    }
    let joined = text.join("\n").trim().to_string();
    Some(joined).filter(|t| !t.is_empty())
}

fn description(body: ElementRef) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for child in body.children() {
        match child.value() {
            Node::Text(t) => {
                let t = t.trim();
                if !t.is_empty() {
                    parts.push(t.to_string());
                }
            }
            Node::Element(e) => {
                if SKIPPED_ELEMENTS.contains(&e.name()) {
                    continue;
                }
                let Some(el) = ElementRef::wrap(child) else {
                    continue;
                };
                if e.name() == "dl" || is_spoiler(&el) || is_section_header(&el) {
                    break;
                }
                let t = multiline_text(el);
                if !t.is_empty() {
                    parts.push(t);
                }
            }
            _ => {}
        }
    }

    let mut text = parts.join("\n");
    for prefix in ["Overview:", "Overview"] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.to_string();
            break;
        }
    }
    let text = text.trim().to_string();
    if text.is_empty() {
        Some(multiline_text(body)).filter(|t| !t.is_empty())
    } else {
        Some(text)
    }
}

/// Markup from the first download header to the next spoiler.
fn download_section_html(body: ElementRef) -> String {
    let mut html = String::new();
    let mut inside = false;
    for child in body.children() {
        match child.value() {
            Node::Text(t) if inside => html.push_str(t),
            Node::Element(_) => {
                let Some(el) = ElementRef::wrap(child) else {
                    continue;
                };
                if !inside {
                    let text = text_of(el);
                    inside = text.chars().count() <= MAX_HEADER_CHARS
                        && text.to_lowercase().contains("download");
                } else if is_spoiler(&el) {
                    break;
                }
                if inside {
                    html.push_str(&el.html());
                }
            }
            _ => {}
        }
    }
    html.trim().to_string()
}

fn cover_image(body: ElementRef, base: Option<&Url>) -> Option<String> {
    body.select(&IMAGES).find_map(|img| {
        let src = img
            .value()
            .attr("data-src")
            .or_else(|| img.value().attr("src"))?
            .trim();
        if src.is_empty() || src.starts_with("data:") {
            return None;
        }
        match base {
            Some(base) => base.join(src).ok().map(|u| u.to_string()),
            None => Some(src.to_string()),
        }
    })
}

fn canonical_engine(found: &str) -> String {
    let lowered = found.to_lowercase();
    match lowered.as_str() {
        "renpy" | "ren'py" => "Ren'Py".to_string(),
        "unity" => "Unity".to_string(),
        "html" => "HTML".to_string(),
        "unreal" | "unreal engine" => "Unreal Engine".to_string(),
        "tyranobuilder" => "TyranoBuilder".to_string(),
        "wolf rpg" => "Wolf RPG".to_string(),
        "qsp" => "QSP".to_string(),
        "rags" => "RAGS".to_string(),
        "godot" => "Godot".to_string(),
        "flash" => "Flash".to_string(),
        "webgl" => "WebGL".to_string(),
        "adrift" => "ADRIFT".to_string(),
        l if l.starts_with("rpg") => "RPGM".to_string(),
        _ => found.to_string(),
    }
}

fn engine_in(text: &str) -> Option<String> {
    ENGINE.find(text).map(|m| canonical_engine(m.as_str()))
}

fn status_in(text: &str) -> Option<String> {
    STATUS_WORD
        .find(text)
        .map(|m| WorkStatus::parse(m.as_str()).label().to_string())
}

fn or_not_found(value: Option<String>) -> String {
    value
        .filter(|v| resolved(v).is_some())
        .unwrap_or_else(|| NOT_FOUND.to_string())
}

/// Parse a rendered thread page.
pub fn parse_thread_page(html: &str, url: &str) -> ThreadRecord {
    let doc = Html::parse_document(html);
    let base = Url::parse(url).ok();
    let mut record = ThreadRecord::empty(url);

    let (title, raw_heading) = heading(&doc).unwrap_or_default();
    let parsed = parse_thread_title(&title);
    if !title.is_empty() {
        record.title = title.clone();
    }

    let first_post = doc.select(&FIRST_POST).next();
    let body = first_post
        .and_then(|post| post.select(&POST_BODY).next())
        .or_else(|| doc.select(&POST_BODY).next());
    let starter = first_post
        .and_then(|post| post.select(&USERNAME).next())
        .map(text_of)
        .filter(|s| !s.is_empty());

    let lines = body.map(lines_of).unwrap_or_default();
    let labels = post_labels(&lines);
    let info = info_list(&doc);

    record.name = or_not_found(Some(parsed.name.clone()));
    record.author = or_not_found(
        labels
            .developer
            .clone()
            .or(info.author.clone())
            .or(parsed.author.clone())
            .or(starter),
    );
    record.version = or_not_found(
        parsed
            .version
            .clone()
            .or(labels.version.clone())
            .or(info.version.clone()),
    );

    record.tags = tags(&doc, body);

    if let Some(body) = body {
        record.description = or_not_found(description(body));
        record.changelog = or_not_found(changelog(body));
        record.download_links = prioritise_links(extract_download_links(body, base.as_ref()));
        record.download_raw_html = download_section_html(body);
        record.cover_image = cover_image(body, base.as_ref());
    }

    record.engine = or_not_found(
        labels
            .engine
            .clone()
            .or(info.engine.clone())
            .or_else(|| record.tags.iter().find_map(|t| engine_in(t)))
            .or_else(|| engine_in(&raw_heading)),
    );
    record.status = or_not_found(
        labels
            .status
            .clone()
            .or(info.status.clone())
            .and_then(|s| status_in(&s).or(Some(s)))
            .or_else(|| status_in(&raw_heading).filter(|_| raw_heading != title))
            .or_else(|| record.tags.iter().find_map(|t| status_in(t))),
    );
    record.language = or_not_found(labels.language.clone().or(info.language.clone()));
    record.censorship = or_not_found(
        labels
            .censorship
            .clone()
            .or(info.censorship.clone())
            .or_else(|| {
                record
                    .tags
                    .iter()
                    .find(|t| CENSORSHIP_WORD.is_match(t))
                    .cloned()
            }),
    );
    record.release_date = or_not_found(labels.release_date.clone());
    record.thread_updated = or_not_found(labels.thread_updated.clone());

    let link_platforms = os_list(&record.download_links)
        .iter()
        .map(|os| os.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    record.os_list = or_not_found(
        labels
            .os
            .clone()
            .or(info.os.clone())
            .or(Some(link_platforms)),
    );

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use crate::thread_page::LinkOs;

    const URL: &str = "https://forum.example/threads/eternum.4242/";

    #[test]
    fn test_full_thread_page() {
        let record = parse_thread_page(&fixtures::thread_page_html(), URL);

        assert_eq!(record.title, "Eternum [v0.7 Public] [Caribdis]");
        assert_eq!(record.name, "Eternum");
        assert_eq!(record.version, "v0.7 Public");
        assert_eq!(record.author, "Caribdis");
        assert_eq!(record.engine, "Ren'Py");
        assert_eq!(record.status, "Ongoing");
        assert_eq!(record.language, "English");
        assert_eq!(record.censorship, "None");
        assert_eq!(record.release_date, "2024-05-18");
        assert_eq!(record.thread_updated, "2024-05-18");
        assert_eq!(record.os_list, "Windows, Linux, Mac, Android");
        assert_eq!(record.tags, vec!["3dcg", "Male protagonist", "Romance"]);
        assert!(record.description.starts_with("You wake up in a world"));
        assert!(!record.description.contains("Thread Updated"));
        assert_eq!(record.changelog, "v0.7: New chapter\nv0.6: Fixes");
        assert_eq!(
            record.cover_image.as_deref(),
            Some("https://attachments.forum.example/cover.png")
        );

        let got: Vec<(LinkOs, &str)> = record
            .download_links
            .iter()
            .map(|l| (l.os, l.url.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (LinkOs::Win, "https://mega.nz/file/win"),
                (LinkOs::Linux, "https://mega.nz/file/linux"),
                (LinkOs::Extras, "https://gofile.io/d/mod"),
            ]
        );
        assert!(record.download_raw_html.contains("https://mega.nz/file/mac"));
        assert_eq!(record.work_status(), WorkStatus::Ongoing);
    }

    #[test]
    fn test_heading_labels_feed_engine_and_status() {
        let html = r#"<html><head><title>ignored</title></head><body>
            <h1 class="p-title-value"><a class="labelLink"><span class="label">Unity</span></a>
            <a class="labelLink"><span class="label">Completed</span></a>Space Tales [Final] [Nova]</h1>
            <article class="message--post"><a class="username">starter</a>
              <div class="bbWrapper">A short story.</div></article>
            </body></html>"#;
        let record = parse_thread_page(html, URL);
        assert_eq!(record.title, "Space Tales [Final] [Nova]");
        assert_eq!(record.version, "Final");
        assert_eq!(record.author, "Nova");
        assert_eq!(record.engine, "Unity");
        assert_eq!(record.status, "Completed");
        assert_eq!(record.description, "A short story.");
    }

    #[test]
    fn test_document_title_fallback_and_starter_author() {
        let html = r#"<html><head><title>Quiet Town | F95zone</title></head><body>
            <article class="message--post"><a class="username">TownDev</a>
              <div class="bbWrapper">Slice of life.</div></article></body></html>"#;
        let record = parse_thread_page(html, URL);
        assert_eq!(record.name, "Quiet Town");
        assert_eq!(record.author, "TownDev");
        assert_eq!(record.version, NOT_FOUND);
        assert_eq!(record.engine, NOT_FOUND);
    }

    #[test]
    fn test_info_list_and_tag_fallbacks() {
        let html = r#"<html><body>
            <h1 class="p-title-value">Night Shift</h1>
            <dl class="pairs--justified"><dt>Developer</dt><dd>Moon Studio</dd></dl>
            <dl class="pairs--justified"><dt>Version</dt><dd>0.3</dd></dl>
            <dl class="pairs--justified"><dt>Tags</dt><dd><a>rpgm</a><a>abandoned</a><a>uncensored</a></dd></dl>
            <article class="message--post"><div class="bbWrapper">Text</div></article>
            </body></html>"#;
        let record = parse_thread_page(html, URL);
        assert_eq!(record.author, "Moon Studio");
        assert_eq!(record.version, "0.3");
        assert_eq!(record.tags, vec!["rpgm", "abandoned", "uncensored"]);
        assert_eq!(record.engine, "RPGM");
        assert_eq!(record.status, "Abandoned");
        assert_eq!(record.censorship, "uncensored");
    }

    #[test]
    fn test_unparseable_page_is_all_not_found() {
        let record = parse_thread_page("<html><body><p>nothing</p></body></html>", URL);
        assert_eq!(record.title, NOT_FOUND);
        assert_eq!(record.description, NOT_FOUND);
        assert!(record.tags.is_empty());
        assert!(record.download_links.is_empty());
        assert_eq!(record.work_status(), WorkStatus::Unknown);
    }
}
