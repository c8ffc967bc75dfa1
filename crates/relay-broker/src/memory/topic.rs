//! Topic exchange pattern matching.

/// Word separator in routing keys
const SEPARATOR: char = '.';
/// Matches exactly one word
const ONE_WORD: &str = "*";
/// Matches zero or more words
const ANY_WORDS: &str = "#";

/// Check whether a routing key matches a binding pattern
///
/// Keys and patterns are dot-separated words. A pattern without wildcards
/// only matches the identical key.
#[must_use]
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split(SEPARATOR).collect();
    let key: Vec<&str> = routing_key.split(SEPARATOR).collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&ANY_WORDS, rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&first, key_rest)) => (word == ONE_WORD || word == first) && matches_words(rest, key_rest),
            None => false,
        },
    }
}
