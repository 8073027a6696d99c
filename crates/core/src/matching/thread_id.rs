//! Thread URL canonicalisation and identity.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\.(\d+)/?$",
        r"threads/(\d+)(?:/|$)",
        r"threads/.*?\.(\d+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Scheme, host and path of `url`, without query, fragment or trailing slash.
///
/// Unparseable input is cut at the first `?` or `#` instead.
pub fn normalise_url(url: &str) -> String {
    let trimmed = url.trim();
    match reqwest::Url::parse(trimmed) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
            let authority = match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            };
            let path = parsed.path().trim_end_matches('/');
            format!("{}://{}{}", parsed.scheme(), authority, path)
        }
        Err(_) => trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string(),
    }
}

fn first_match(text: &str) -> Option<u64> {
    ID_PATTERNS.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

/// Numeric thread ID, trying the patterns in order on the normalised URL and
/// then on the raw input.
pub fn extract_thread_id(url: &str) -> Option<u64> {
    first_match(&normalise_url(url)).or_else(|| first_match(url.trim()))
}

/// Identity rule: equal thread IDs when both are present, otherwise equal
/// normalised URLs.
pub fn same_work(a: &str, b: &str) -> bool {
    match (extract_thread_id(a), extract_thread_id(b)) {
        (Some(x), Some(y)) => x == y,
        _ => normalise_url(a) == normalise_url(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_strips_query_fragment_and_slash() {
        assert_eq!(
            normalise_url("https://Forum.Example/threads/some-slug.12345/?page=3#post-9"),
            "https://forum.example/threads/some-slug.12345"
        );
        assert_eq!(
            normalise_url("  https://forum.example/threads/x.1/  "),
            "https://forum.example/threads/x.1"
        );
    }

    #[test]
    fn test_normalise_unparseable_input() {
        assert_eq!(normalise_url("threads/x.9/?a=b"), "threads/x.9");
    }

    #[test]
    fn test_extract_from_slug() {
        assert_eq!(
            extract_thread_id("https://forum.example/threads/some-slug.12345/"),
            Some(12345)
        );
    }

    #[test]
    fn test_extract_bare_id() {
        assert_eq!(extract_thread_id("https://forum.example/threads/777/"), Some(777));
    }

    #[test]
    fn test_extract_with_trailing_page() {
        assert_eq!(
            extract_thread_id("https://forum.example/threads/eternum.4242/page-12"),
            Some(4242)
        );
    }

    #[test]
    fn test_extract_none() {
        assert_eq!(extract_thread_id("https://forum.example/forums/games/"), None);
    }

    #[test]
    fn test_extract_stable_under_normalisation() {
        let urls = [
            "https://forum.example/threads/some-slug.12345/",
            "https://forum.example/threads/some-other-slug.12345/?page=3",
            "https://forum.example/threads/777",
            "https://forum.example/threads/a.b.c.99/#top",
            "https://forum.example/members/someone.5/",
        ];
        for url in urls {
            assert_eq!(
                extract_thread_id(&normalise_url(url)),
                extract_thread_id(url),
                "{url}"
            );
        }
    }

    #[test]
    fn test_same_work_by_id() {
        assert!(same_work(
            "https://forum.example/threads/some-slug.12345/",
            "https://forum.example/threads/some-other-slug.12345/?page=3"
        ));
        assert!(!same_work(
            "https://forum.example/threads/a.1/",
            "https://forum.example/threads/a.2/"
        ));
    }

    #[test]
    fn test_same_work_falls_back_to_normalised_url() {
        assert!(same_work(
            "https://forum.example/games/custom-page/",
            "https://forum.example/games/custom-page?ref=rss"
        ));
    }
}
