//! Query understanding: normalization, synonym expansion, fuzzy variants,
//! and intent detection.
//!
//! Every stage is pure and order-preserving. Expansions are always added
//! next to the original tokens, never substituted, so exact matches keep
//! their full weight. The synonym and intent tables are seed data for the
//! student-affairs domain; extend them in one place here.

use crate::config::{FUZZY_CUTOFF, FUZZY_MAX_VARIANTS, SHORT_QUERY_MAX_TOKENS};
use crate::index::IndexSnapshot;
use crate::normalize;
use crate::token;

/// Domain synonym table: folded phrase -> folded expansion phrases.
pub const SYNONYMS: &[(&str, &[&str])] = &[
    (
        "gecme notu",
        &[
            "basari notu",
            "gecme baraji",
            "not hesabi",
            "dersi gecme",
            "ortalama",
            "gecer not",
            "baraj",
        ],
    ),
    ("gecer not", &["gecme notu", "baraj", "basari notu"]),
    (
        "devamsizlik",
        &["devam", "yoklama", "devamsizlik hakki", "devam durumu"],
    ),
    ("vize", &["ara sinav", "yariyil ici", "orta sinav"]),
    ("final", &["genel sinav", "donem sonu", "bitirme sinavi"]),
    (
        "butunleme",
        &["butunleme sinavi", "telafi sinavi", "but", "butun"],
    ),
    ("but", &["butunleme", "butunleme sinavi"]),
    (
        "not",
        &["gecme notu", "not ortalamasi", "not hesabi", "puan", "basari notu"],
    ),
    (
        "kayit",
        &["kayit yenileme", "yeniden kayit", "ders kaydi", "harc odeme"],
    ),
    (
        "danisman",
        &["akademik danisman", "danisman hoca", "danismanlik"],
    ),
    (
        "itiraz",
        &["not itiraz", "puan itiraz", "dilekce", "sonuca itiraz"],
    ),
    ("ders programi", &["program", "takvim", "ders saati"]),
    ("program", &["ders programi", "ders saati", "takvim"]),
    (
        "transkript",
        &["not belgesi", "ogrenci transkript", "trans", "transkript belgesi"],
    ),
    (
        "obs",
        &["ogrenci otomasyon", "ogrenci bilgi sistemi", "otomasyon", "obs giris"],
    ),
];

/// Direct alias map for very short single-token queries.
pub const SHORT_ALIASES: &[(&str, &str)] = &[
    ("but", "butunleme"),
    ("butun", "butunleme"),
    ("trans", "transkript"),
    ("transkriptim", "transkript"),
    ("obs", "obs"),
];

/// Terms appended to the query when pass-grade intent is detected.
const PASS_GRADE_ENRICHMENT: &str = "final vize yuzde % oran 50 puan baraj ortalama gecme gecer";

const PASS_GRADE_TOKENS: &[&str] = &["gecme", "gecer", "baraj", "not", "ortalama"];
const PASS_GRADE_PHRASES: &[&str] = &[
    "gecme notu",
    "gecer not",
    "not ortalamasi",
    "not hesabi",
];
const APPEAL_TOKENS: &[&str] = &["itiraz", "dilekce", "sonuca"];

/// Intent flags are a set, not exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentFlags {
    pub pass_grade: bool,
    pub appeal: bool,
}

/// One fully-understood query, discarded after answering.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub raw: String,
    pub normalized: String,
    /// Tokens of the raw query alone; the overlap gate measures these.
    pub base_tokens: Vec<String>,
    /// Base tokens plus aliases, synonyms, and intent enrichment.
    pub expanded_tokens: Vec<String>,
    /// Edit-distance variants for out-of-vocabulary tokens.
    pub fuzzy_tokens: Vec<String>,
    pub intents: IntentFlags,
}

impl QueryContext {
    /// Run the full understanding pipeline against a snapshot's vocabulary.
    pub fn build(raw: &str, snapshot: &IndexSnapshot) -> Self {
        let normalized = normalize::fold(raw);
        let base_tokens = token::tokenize(raw);
        let intents = detect_intents(&normalized, &base_tokens);

        let mut expanded_tokens = base_tokens.clone();
        expanded_tokens.extend(alias_expansion(&base_tokens));
        expanded_tokens.extend(synonym_expansion(&normalized, &base_tokens));
        if intents.pass_grade {
            expanded_tokens.extend(token::tokenize(PASS_GRADE_ENRICHMENT));
        }
        // First occurrence wins; duplicate expansions must not double-count
        // in term-frequency scoring.
        let mut seen = std::collections::HashSet::new();
        expanded_tokens.retain(|t| seen.insert(t.clone()));

        let fuzzy_tokens: Vec<String> = fuzzy_variants(&base_tokens, snapshot)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        Self {
            raw: raw.to_string(),
            normalized,
            base_tokens,
            expanded_tokens,
            fuzzy_tokens,
            intents,
        }
    }

    /// Every term the ranker should consider, expansion included.
    pub fn all_terms(&self) -> Vec<String> {
        let mut terms = self.expanded_tokens.clone();
        terms.extend(self.fuzzy_tokens.iter().cloned());
        terms
    }

    /// Bigrams over the expanded token sequence.
    pub fn bigrams(&self) -> Vec<String> {
        token::bigrams(&self.expanded_tokens)
    }

    /// The alias-mapped form of a single-token query, for prefix matching.
    pub fn prefix_term(&self) -> Option<&str> {
        if self.base_tokens.len() != SHORT_QUERY_MAX_TOKENS {
            return None;
        }
        let key = self.base_tokens[0].as_str();
        Some(
            SHORT_ALIASES
                .iter()
                .find(|(alias, _)| *alias == key)
                .map(|(_, target)| *target)
                .unwrap_or(key),
        )
    }
}

fn detect_intents(normalized: &str, tokens: &[String]) -> IntentFlags {
    let has_token = |set: &[&str]| tokens.iter().any(|t| set.contains(&t.as_str()));

    IntentFlags {
        pass_grade: has_token(PASS_GRADE_TOKENS)
            || PASS_GRADE_PHRASES
                .iter()
                .any(|p| contains_phrase(normalized, p)),
        appeal: has_token(APPEAL_TOKENS)
            || APPEAL_TOKENS.iter().any(|t| contains_phrase(normalized, t)),
    }
}

/// Whole-word phrase containment over folded text. Plain `str::contains`
/// would let a short base like "but" fire inside unrelated words.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let words: Vec<&str> = haystack
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '%'))
        .filter(|w| !w.is_empty())
        .collect();
    let needle: Vec<&str> = phrase.split(' ').collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words.windows(needle.len()).any(|w| w == needle.as_slice())
}

fn alias_expansion(base_tokens: &[String]) -> Vec<String> {
    if base_tokens.len() != 1 {
        return Vec::new();
    }
    let key = base_tokens[0].as_str();
    let mut out = Vec::new();

    if let Some((_, target)) = SHORT_ALIASES.iter().find(|(alias, _)| *alias == key) {
        out.extend(token::tokenize(target));
    }
    // A single-token query also pulls in every synonym family whose base
    // phrase contains the token.
    for (base, alternatives) in SYNONYMS {
        if key == *base || base.split(' ').any(|part| part == key) {
            for alt in *alternatives {
                out.extend(token::tokenize(alt));
            }
        }
    }
    out
}

fn synonym_expansion(normalized: &str, _base_tokens: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for (base, alternatives) in SYNONYMS {
        if contains_phrase(normalized, base) {
            for alt in *alternatives {
                out.extend(token::tokenize(alt));
            }
        }
    }
    out
}

/// Edit-distance variants for tokens the index has never seen, to absorb
/// typos. In-vocabulary tokens are left alone.
fn fuzzy_variants(base_tokens: &[String], snapshot: &IndexSnapshot) -> Vec<String> {
    let mut out = Vec::new();
    for tok in base_tokens {
        if tok.chars().count() < 3 || snapshot.contains_term(tok) {
            continue;
        }

        let mut candidates: Vec<(f64, &String)> = snapshot
            .vocabulary()
            .iter()
            .filter_map(|term| {
                let similarity = strsim::normalized_levenshtein(tok, term);
                (similarity >= FUZZY_CUTOFF).then_some((similarity, term))
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(b.1))
        });
        out.extend(
            candidates
                .into_iter()
                .take(FUZZY_MAX_VARIANTS)
                .map(|(_, term)| term.clone()),
        );
    }
    out
}
