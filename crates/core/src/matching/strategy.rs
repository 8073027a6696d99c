//! Feed search strategies, most specific first.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Serialize;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "should", "can", "could", "may", "might", "must", "and",
    "but", "or", "nor", "for", "so", "yet", "of", "in", "on", "at", "by", "from", "to", "with",
    "about", "above", "after", "again", "against", "all", "am", "as", "because", "before",
    "below", "between", "both", "during", "each", "few", "further", "here", "how", "if", "into",
    "it", "its", "itself", "just", "me", "more", "most", "my", "myself", "no", "not", "now",
    "once", "only", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "he", "him", "her", "some", "still", "such", "than", "that", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "too", "under",
    "until", "up", "very", "we", "what", "when", "where", "which", "while", "who", "whom", "why",
    "won", "you", "your", "yours", "yourself", "yourselves",
    // chapter and release keywords
    "chapter", "episode", "book", "part", "vol", "edition", "remake", "remaster", "update",
    "new", "game", "mod",
];

static STOP_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOP_WORDS.iter().copied().collect());

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").expect("valid bracket pattern"));

static POSSESSIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)['’]s\b").expect("valid possessive pattern"));

static VERSION_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(v|ver|ch|ep|s)?\d+([.\-_]\d+)*[a-z]?$").expect("valid version pattern")
});

/// One feed query: a search term, a creator filter, or both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SearchStrategy {
    pub query: Option<String>,
    pub creator: Option<String>,
}

impl SearchStrategy {
    pub fn query(q: impl Into<String>) -> Self {
        Self {
            query: Some(q.into()),
            creator: None,
        }
    }

    pub fn creator(c: impl Into<String>) -> Self {
        Self {
            query: None,
            creator: Some(c.into()),
        }
    }

    fn key(&self) -> (String, String) {
        (
            self.query.clone().unwrap_or_default(),
            self.creator.clone().unwrap_or_default(),
        )
    }
}

pub fn is_stop_word(word: &str) -> bool {
    STOP_SET.contains(word.to_lowercase().as_str())
}

fn is_significant(token: &str) -> bool {
    token.chars().count() > 2 && !is_stop_word(token) && !VERSION_LIKE.is_match(token)
}

fn strip_bracketed(name: &str) -> String {
    BRACKETED.replace_all(name, " ").into_owned()
}

/// Keep word characters and hyphens, drop edge hyphens.
fn clean_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Name with possessives removed and punctuation squashed to spaces.
fn depossess(name: &str) -> String {
    let without = POSSESSIVE.replace_all(name, "");
    let squashed: String = without
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    collapse_whitespace(&squashed)
}

/// First token of `name` useful as a narrow search term.
///
/// Bracketed groups are ignored. Tokens carrying an apostrophe are skipped,
/// since the feed search treats them inconsistently. Falls back to the first
/// token longer than one character.
pub fn first_significant_word(name: &str) -> Option<String> {
    let stripped = strip_bracketed(name);
    let tokens: Vec<&str> = stripped.split_whitespace().collect();

    for raw in &tokens {
        if raw.contains('\'') || raw.contains('’') {
            continue;
        }
        let cleaned = clean_token(raw);
        if is_significant(&cleaned) {
            return Some(cleaned);
        }
    }

    tokens
        .first()
        .map(|raw| clean_token(&POSSESSIVE.replace_all(raw, "")))
        .filter(|w| w.chars().count() > 1)
}

fn significant_words_only(name: &str) -> String {
    depossess(&strip_bracketed(name))
        .split_whitespace()
        .filter(|w| is_significant(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn alphanumeric_without_stop_words(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| !w.is_empty() && !is_stop_word(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn usable_author(author: &str) -> Option<&str> {
    let trimmed = author.trim();
    let lower = trimmed.to_ascii_lowercase();
    if trimmed.is_empty() || lower == "n/a" || lower == "unknown" || lower == "not found" {
        None
    } else {
        Some(trimmed)
    }
}

/// Ordered, de-duplicated strategies for locating `name` by `author` in the feed.
pub fn generate_strategies(name: &str, author: &str) -> Vec<SearchStrategy> {
    let name = name.trim();
    let author = usable_author(author);
    let mut candidates = Vec::with_capacity(6);

    if !name.is_empty() {
        candidates.push(SearchStrategy::query(name));
    }

    if let (Some(author), Some(word)) = (author, first_significant_word(name)) {
        candidates.push(SearchStrategy::query(format!("{author} {word}")));
    }

    candidates.push(SearchStrategy::query(depossess(name)));
    candidates.push(SearchStrategy::query(significant_words_only(name)));

    if let Some(author) = author {
        candidates.push(SearchStrategy::creator(author));
    }

    candidates.push(SearchStrategy::query(alphanumeric_without_stop_words(name)));

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|s| {
            let key = s.key();
            !(key.0.is_empty() && key.1.is_empty()) && seen.insert(key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_three_strategies_for_possessive_name() {
        let strategies = generate_strategies("Hero's Harem Guild", "M&K");
        assert_eq!(strategies[0], SearchStrategy::query("Hero's Harem Guild"));
        assert_eq!(strategies[1], SearchStrategy::query("M&K Harem"));
        assert_eq!(strategies[2], SearchStrategy::query("Hero Harem Guild"));
    }

    #[test]
    fn test_full_strategy_list() {
        let strategies = generate_strategies("Hero's Harem Guild", "M&K");
        assert_eq!(
            strategies,
            vec![
                SearchStrategy::query("Hero's Harem Guild"),
                SearchStrategy::query("M&K Harem"),
                SearchStrategy::query("Hero Harem Guild"),
                SearchStrategy::creator("M&K"),
                SearchStrategy::query("Heros Harem Guild"),
            ]
        );
    }

    #[test]
    fn test_strategies_without_author() {
        let strategies = generate_strategies("The Lust Hunter", "N/A");
        assert!(strategies.iter().all(|s| s.creator.is_none()));
        assert_eq!(strategies[0], SearchStrategy::query("The Lust Hunter"));
        assert!(strategies.contains(&SearchStrategy::query("Lust Hunter")));
    }

    #[test]
    fn test_strategies_are_unique() {
        let strategies = generate_strategies("Eternum", "Caribdis");
        let keys: HashSet<_> = strategies.iter().map(|s| s.key()).collect();
        assert_eq!(keys.len(), strategies.len());
        assert_eq!(
            strategies,
            vec![
                SearchStrategy::query("Eternum"),
                SearchStrategy::query("Caribdis Eternum"),
                SearchStrategy::creator("Caribdis"),
            ]
        );
    }

    #[test]
    fn test_empty_name_with_author() {
        let strategies = generate_strategies("", "Caribdis");
        assert_eq!(strategies, vec![SearchStrategy::creator("Caribdis")]);
    }

    #[test]
    fn test_first_significant_word_skips_noise() {
        assert_eq!(
            first_significant_word("[Ren'Py] The New Game Ch.2 Lust Academy").as_deref(),
            Some("Lust")
        );
        assert_eq!(first_significant_word("My Summer (Remake)").as_deref(), Some("Summer"));
        assert_eq!(first_significant_word("Episode v0.7 Harem").as_deref(), Some("Harem"));
    }

    #[test]
    fn test_first_significant_word_fallback() {
        assert_eq!(first_significant_word("It is").as_deref(), Some("It"));
        assert_eq!(first_significant_word("A").as_deref(), None);
        assert_eq!(first_significant_word("").as_deref(), None);
    }

    #[test]
    fn test_stop_words_are_case_insensitive() {
        assert!(is_stop_word("THE"));
        assert!(is_stop_word("Chapter"));
        assert!(!is_stop_word("Harem"));
    }
}
