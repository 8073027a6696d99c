//! Thread heading parsing: `Name [Version] [Author]`.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static VERSION_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:v|ver|ep|ch|final|public|beta|alpha|demo)\b|\d").expect("valid regex")
});

static DEFINITE_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^v(?:er)?\.?\s*\d").expect("valid regex"));

/// Parts of a thread heading.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadTitle {
    pub name: String,
    pub version: Option<String>,
    pub author: Option<String>,
}

fn looks_like_version(group: &str) -> bool {
    VERSION_LIKE.is_match(group)
}

fn looks_like_author(group: &str) -> bool {
    group.chars().any(char::is_alphabetic) || group.chars().count() > 12
}

/// Split trailing `[..]` / `(..)` groups off `title`, rightmost first.
fn trailing_groups(title: &str, max: usize) -> (String, Vec<String>) {
    let mut rest = title.trim_end();
    let mut groups = Vec::new();

    while groups.len() < max {
        let open = match rest.chars().last() {
            Some(']') => '[',
            Some(')') => '(',
            _ => break,
        };
        let Some(start) = rest.rfind(open) else {
            break;
        };
        let inner = rest[start + 1..rest.len() - 1].trim();
        rest = rest[..start].trim_end();
        if !inner.is_empty() {
            groups.push(inner.to_string());
        }
    }

    (rest.to_string(), groups)
}

fn clean_name(name: &str) -> String {
    name.trim()
        .trim_end_matches(|c: char| matches!(c, '-' | ':' | '|' | ',' | '–') || c.is_whitespace())
        .trim()
        .to_string()
}

/// Parse a thread heading. Ambiguous single groups lean towards version.
pub fn parse_thread_title(title: &str) -> ThreadTitle {
    let (mut name, mut groups) = trailing_groups(title, 3);
    if groups.is_empty() {
        return ThreadTitle {
            name: clean_name(&name),
            ..Default::default()
        };
    }

    let mut version = None;
    let mut author = None;

    let rightmost = groups.remove(0);
    let next_is_version = groups.first().map(|g| looks_like_version(g)).unwrap_or(false);

    if DEFINITE_VERSION.is_match(&rightmost)
        || (looks_like_version(&rightmost) && !next_is_version)
        || !looks_like_author(&rightmost)
    {
        version = Some(rightmost);
    } else {
        author = Some(rightmost);
        if next_is_version {
            version = Some(groups.remove(0));
        }
    }

    // Unused groups belong to the name
    for group in groups.into_iter().rev() {
        name = format!("{name} [{group}]");
    }

    ThreadTitle {
        name: clean_name(&name),
        version,
        author,
    }
}
