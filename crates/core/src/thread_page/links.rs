//! Download link extraction and classification.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::Url;
use scraper::ElementRef;

use super::parser::text_of;
use super::{DownloadLink, LinkOs};

static ONCLICK_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:window\.open\s*\(|location\.href\s*=)\s*['"]([^'"]+)['"]"#)
        .expect("valid regex")
});

const SUPPORT_DOMAINS: &[&str] = &[
    "patreon",
    "subscribestar",
    "discord",
    "itch.io",
    "ko-fi",
    "kofi",
    "buymeacoffee",
    "steampowered",
    "steamcommunity",
    "paypal",
];

const SKIPPED_PATHS: &[&str] = &["/account/", "/members/", "/login", "/register", "/attachments/"];

const EXTRAS_WORDS: &[&str] = &[
    "patch",
    "mod",
    "mods",
    "dlc",
    "bonus",
    "guide",
    "walkthrough",
    "cheat",
    "cheats",
    "translation",
    "fix",
    "gallery",
    "save",
    "saves",
    "ost",
    "soundtrack",
];

const FORUM_LINK_WORDS: &[&str] = &["mod", "mods", "patch", "translation", "fix"];

/// Longest bold text still treated as a section header.
const MAX_HEADER_CHARS: usize = 50;

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_word(words: &[String], candidates: &[&str]) -> bool {
    words.iter().any(|w| candidates.contains(&w.as_str()))
}

/// First platform named in `text`, by position.
fn platform_in(text: &str) -> Option<LinkOs> {
    words(text).iter().find_map(|w| match w.as_str() {
        "win" | "windows" | "pc" | "win64" | "win32" => Some(LinkOs::Win),
        "linux" => Some(LinkOs::Linux),
        "mac" | "macos" | "osx" => Some(LinkOs::Mac),
        "android" | "apk" => Some(LinkOs::Android),
        _ => None,
    })
}

fn platform_from_extension(href: &str) -> Option<LinkOs> {
    let path = href.split(['?', '#']).next().unwrap_or(href).to_lowercase();
    if path.ends_with(".exe") {
        Some(LinkOs::Win)
    } else if path.ends_with(".dmg") {
        Some(LinkOs::Mac)
    } else if path.ends_with(".sh") {
        Some(LinkOs::Linux)
    } else if path.ends_with(".apk") {
        Some(LinkOs::Android)
    } else {
        None
    }
}

/// Bucket for a kept link.
pub fn classify_link(text: &str, href: &str, section: Option<LinkOs>) -> LinkOs {
    let text_words = words(text);
    if has_word(&text_words, EXTRAS_WORDS) {
        return LinkOs::Extras;
    }
    let lowered = text.to_lowercase();
    if lowered.contains("source code") || href.contains("github.com") || href.contains("gitgud.io") {
        return LinkOs::SourceCode;
    }
    if text_words.iter().any(|w| w == "monitor") {
        return LinkOs::Monitor;
    }
    if let Some(os) = section {
        return os;
    }
    platform_from_extension(href)
        .or_else(|| platform_in(text))
        .unwrap_or(LinkOs::Unknown)
}

fn is_forum_url(url: &Url, forum_host: Option<&str>) -> bool {
    match (url.host_str(), forum_host) {
        (Some(host), Some(forum)) => host == forum || host.ends_with(&format!(".{forum}")),
        _ => false,
    }
}

/// Resolve `href` and decide whether it is a download candidate.
fn accept(href: &str, text: &str, base: Option<&Url>) -> Option<(String, Option<LinkOs>)> {
    let href = href.trim();
    let lowered = href.to_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lowered.starts_with("mailto:")
        || lowered.starts_with("javascript:")
    {
        return None;
    }

    let url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str().unwrap_or_default().to_lowercase();
    if SUPPORT_DOMAINS.iter().any(|d| host.contains(d)) {
        return None;
    }
    if host.starts_with("attachments.") {
        return None;
    }

    let forum_host = base.and_then(|b| b.host_str());
    if is_forum_url(&url, forum_host) {
        let path = url.path().to_lowercase();
        if SKIPPED_PATHS.iter().any(|p| path.starts_with(p)) {
            return None;
        }
        // Same-forum threads only count as add-ons
        if path.starts_with("/threads/") && has_word(&words(text), FORUM_LINK_WORDS) {
            return Some((url.to_string(), Some(LinkOs::Extras)));
        }
        return None;
    }

    Some((url.to_string(), None))
}

fn is_header(el: &ElementRef) -> bool {
    matches!(el.value().name(), "b" | "strong" | "h2" | "h3" | "h4")
}

fn contains_anchor(el: &ElementRef) -> bool {
    el.descendants()
        .filter_map(ElementRef::wrap)
        .any(|e| e.value().name() == "a")
}

/// Walk `body` in document order collecting download links.
pub fn extract_download_links(body: ElementRef, base: Option<&Url>) -> Vec<DownloadLink> {
    let mut section: Option<LinkOs> = None;
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut links = Vec::new();

    for node in body.descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };

        let candidate = match el.value().name() {
            _ if is_header(&el) && !contains_anchor(&el) => {
                let text = text_of(el);
                if text.chars().count() <= MAX_HEADER_CHARS {
                    if let Some(os) = platform_in(&text) {
                        section = Some(os);
                    }
                }
                None
            }
            "a" => el.value().attr("href").map(|href| (href.to_string(), text_of(el))),
            "button" => el
                .value()
                .attr("onclick")
                .and_then(|onclick| ONCLICK_URL.captures(onclick))
                .and_then(|caps| caps.get(1))
                .map(|m| (m.as_str().to_string(), text_of(el))),
            _ => None,
        };

        let Some((href, text)) = candidate else {
            continue;
        };
        let Some((url, forced)) = accept(&href, &text, base) else {
            continue;
        };
        if !seen.insert((url.clone(), text.clone())) {
            continue;
        }

        let os = forced.unwrap_or_else(|| classify_link(&text, &url, section));
        links.push(DownloadLink { text, url, os });
    }

    links
}

/// Keep only Windows, Linux and extras when any Windows or Linux build exists.
pub fn prioritise_links(links: Vec<DownloadLink>) -> Vec<DownloadLink> {
    let has_desktop = links
        .iter()
        .any(|l| matches!(l.os, LinkOs::Win | LinkOs::Linux));
    if !has_desktop {
        return links;
    }
    links
        .into_iter()
        .filter(|l| matches!(l.os, LinkOs::Win | LinkOs::Linux | LinkOs::Extras))
        .collect()
}

/// Distinct platforms among `links`, in first-seen order.
pub fn os_list(links: &[DownloadLink]) -> Vec<LinkOs> {
    let mut seen = Vec::new();
    for link in links {
        if link.os.is_platform() && !seen.contains(&link.os) {
            seen.push(link.os);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn extract(html: &str) -> Vec<DownloadLink> {
        let doc = Html::parse_fragment(html);
        let selector = Selector::parse("div.bbWrapper").unwrap();
        let body = doc.select(&selector).next().unwrap();
        let base = Url::parse("https://forum.example/threads/eternum.4242/").unwrap();
        extract_download_links(body, Some(&base))
    }

    fn link(os: LinkOs, url: &str) -> DownloadLink {
        DownloadLink::new(url.to_uppercase(), url, os)
    }

    #[test]
    fn test_prioritisation_keeps_desktop_and_extras() {
        let links = vec![
            link(LinkOs::Win, "a"),
            link(LinkOs::Linux, "b"),
            link(LinkOs::Android, "c"),
            link(LinkOs::Extras, "d"),
            link(LinkOs::Mac, "e"),
        ];
        let kept = prioritise_links(links);
        assert_eq!(
            kept.iter().map(|l| l.url.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "d"]
        );
        assert_eq!(prioritise_links(kept.clone()), kept);
    }

    #[test]
    fn test_prioritisation_without_desktop_is_untouched() {
        let links = vec![link(LinkOs::Android, "c"), link(LinkOs::Mac, "e"), link(LinkOs::Unknown, "f")];
        assert_eq!(prioritise_links(links.clone()), links);
    }

    #[test]
    fn test_section_context_and_filters() {
        let links = extract(
            r#"<div class="bbWrapper">
                <b>Overview</b> Support me on <a href="https://www.patreon.com/dev">Patreon</a>
                <b>DOWNLOAD</b><br>
                <b>Windows</b>: <a href="https://mega.nz/file/a">MEGA</a> - <a href="https://pixeldrain.com/u/b">PIXELDRAIN</a><br>
                <b>Linux</b>: <a href="https://mega.nz/file/c">MEGA</a><br>
                <b>Android</b>: <a href="https://mega.nz/file/d">MEGA</a><br>
                <a href="https://gofile.io/e">Walkthrough Mod</a>
                <a href="/threads/eternum-mod.999/">Eternum Walkthrough Mod</a>
                <a href="/threads/other-game.555/">Other game</a>
                <a href="/members/dev.1/">dev</a>
                <a href="https://attachments.forum.example/x.png">img</a>
                <a href="mailto:dev@example.com">mail</a>
                <a href="https://mega.nz/file/a">MEGA</a>
            </div>"#,
        );

        let got: Vec<(LinkOs, &str)> = links.iter().map(|l| (l.os, l.url.as_str())).collect();
        assert_eq!(
            got,
            vec![
                (LinkOs::Win, "https://mega.nz/file/a"),
                (LinkOs::Win, "https://pixeldrain.com/u/b"),
                (LinkOs::Linux, "https://mega.nz/file/c"),
                (LinkOs::Android, "https://mega.nz/file/d"),
                (LinkOs::Extras, "https://gofile.io/e"),
                (LinkOs::Extras, "https://forum.example/threads/eternum-mod.999/"),
            ]
        );
    }

    #[test]
    fn test_heuristics_without_section() {
        let links = extract(
            r#"<div class="bbWrapper">
                <a href="https://host.example/game-setup.exe">Setup</a>
                <a href="https://host.example/game.zip">[Android] Build</a>
                <a href="https://github.com/dev/game">Repository</a>
                <button onclick="window.open('https://host.example/direct.zip')">Direct</button>
            </div>"#,
        );
        let got: Vec<LinkOs> = links.iter().map(|l| l.os).collect();
        assert_eq!(got, vec![LinkOs::Win, LinkOs::Android, LinkOs::SourceCode, LinkOs::Unknown]);
        assert_eq!(links[3].url, "https://host.example/direct.zip");
    }

    #[test]
    fn test_os_list() {
        let links = vec![
            link(LinkOs::Win, "a"),
            link(LinkOs::Extras, "b"),
            link(LinkOs::Win, "c"),
            link(LinkOs::Linux, "d"),
        ];
        assert_eq!(os_list(&links), vec![LinkOs::Win, LinkOs::Linux]);
    }
}
