//! Tokenization, light Turkish suffix stripping, and bigram generation.

use crate::config::MIN_STEM_LEN;
use crate::normalize;
use regex::Regex;
use std::sync::OnceLock;

/// Common Turkish case/possessive suffixes, longest variants first so the
/// most specific ending wins.
const TR_SUFFIXES: &[&str] = &[
    "lari", "leri", "lar", "ler", "nin", "nın", "nun", "nün", "si", "sı", "su", "sü", "i", "ı",
    "u", "ü",
];

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9%]+").expect("valid token pattern"))
}

/// Strip at most one suffix, and only when the stem stays long enough.
/// Conservative on purpose: a wrong stem is worse than a missed one.
pub fn stem(token: &str) -> String {
    for suffix in TR_SUFFIXES {
        if let Some(remainder) = token.strip_suffix(suffix) {
            let stem_len = remainder.chars().count();
            if stem_len > MIN_STEM_LEN - 1 && token.chars().count() > suffix.chars().count() + 1 {
                return remainder.to_string();
            }
        }
    }
    token.to_string()
}

/// Fold, split on the token alphabet, stem. The folding step means callers
/// may pass raw or already-normalized text interchangeably.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded = normalize::fold(text);
    token_regex()
        .find_iter(&folded)
        .map(|m| stem(m.as_str()))
        .collect()
}

/// Adjacent-token pairs, in order.
pub fn bigrams(tokens: &[String]) -> Vec<String> {
    tokens
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect()
}
