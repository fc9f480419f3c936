use std::path::PathBuf;
use std::time::Duration;

// ---- Field weights (title > keywords > body) ----
pub const W_TITLE: f32 = 1.35;
pub const W_KEYWORDS: f32 = 1.20;
pub const W_BODY: f32 = 1.00;

// ---- BM25 parameters ----
pub const BM25_K1: f32 = 1.5;
pub const BM25_B: f32 = 0.75;

// ---- Bigram bonus: base factor plus a small increment per hit, capped ----
pub const BIGRAM_BASE_FACTOR: f32 = 0.15;
pub const BIGRAM_PER_HIT: f32 = 0.02;
pub const BIGRAM_HIT_CAP: usize = 3;

// ---- Prefix bonus for truncated single-token queries ----
pub const PREFIX_BOOST: f32 = 0.15;
pub const SHORT_QUERY_MAX_TOKENS: usize = 1;
pub const PREFIX_MIN_LEN: usize = 2;
/// Raw tokens longer than this are full words, not truncations.
pub const PREFIX_MAX_LEN: usize = 4;

// ---- Intent-based score adjustment ----
pub const EXAM_TERM_BOOST: f32 = 1.20;
pub const NUMERIC_BOOST: f32 = 1.08;
pub const PERCENT_BOOST: f32 = 1.06;
pub const APPEAL_MISMATCH_PENALTY: f32 = 0.55;
pub const HEADING_BOOST: f32 = 1.05;
pub const PHRASE_BOOST: f32 = 1.15;
pub const INTERSECT_BASE_BOOST: f32 = 1.05;
pub const INTERSECT_PER_HIT: f32 = 0.02;
pub const INTERSECT_HIT_CAP: usize = 3;

// ---- Layout extraction heuristics ----
/// Fraction of page height treated as header band (and, mirrored, footer band).
pub const HEADER_BAND_RATIO: f32 = 0.08;
pub const FOOTER_BAND_RATIO: f32 = 0.08;
/// Fraction of page width left blank around the column gutter.
pub const COLUMN_GUTTER_RATIO: f32 = 0.06;
/// A band line survives the margin filter only when it is long and mostly letters.
pub const BAND_KEEP_MIN_ALPHA: usize = 30;
pub const BAND_KEEP_ALPHA_DENSITY: f32 = 0.6;
/// Minimum normalized character counts to accept a strategy's output.
pub const MIN_SINGLE_COLUMN_CHARS: usize = 60;
pub const MIN_TWO_COLUMN_CHARS: usize = 60;
pub const MIN_WORD_ASSEMBLY_CHARS: usize = 40;
/// A page must produce at least this many words and lines to count as extracted.
pub const MIN_PAGE_WORDS: usize = 8;
/// Vertical gap (points) above which word boxes start a new line cluster.
pub const LINE_CLUSTER_GAP: f32 = 3.0;

// ---- Block building ----
pub const MIN_BODY_LEN: usize = 25;
pub const WINDOW_SENTENCES: usize = 2;
pub const MAX_KEYWORDS_PER_BLOCK: usize = 12;
pub const MAX_WINDOW_TITLE_CHARS: usize = 80;

// ---- Tokenization ----
pub const MIN_STEM_LEN: usize = 2;

// ---- Query understanding ----
pub const FUZZY_CUTOFF: f64 = 0.82;
pub const FUZZY_MAX_VARIANTS: usize = 3;

// ---- Safety gate ----
/// Best-candidate scores below this are refused outright.
pub const MIN_ACCEPT_SCORE: f32 = 0.35;
/// Minimum fraction of base query tokens that must appear in the block.
pub const MIN_OVERLAP_RATIO: f32 = 0.25;
pub const REFUSAL_TEXT: &str = "Uygun bir yanit bulunamadi. Farkli kelimelerle deneyin.";

// ---- Retrieval / answer shaping ----
pub const TOP_K_RETURN: usize = 5;
pub const SNIPPET_CHARS: usize = 480;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Runtime configuration, resolved once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub docs_dir: PathBuf,
    pub index_ttl: Duration,
    pub top_k: usize,
    pub snippet_chars: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let ttl_secs: u64 = std::env::var("INDEX_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        Self {
            docs_dir: PathBuf::from(env_or("DOCS_DIR", "docs")),
            index_ttl: Duration::from_secs(ttl_secs),
            top_k: TOP_K_RETURN,
            snippet_chars: SNIPPET_CHARS,
        }
    }

    pub fn with_docs_dir(docs_dir: impl Into<PathBuf>) -> Self {
        Self {
            docs_dir: docs_dir.into(),
            index_ttl: Duration::from_secs(300),
            top_k: TOP_K_RETURN,
            snippet_chars: SNIPPET_CHARS,
        }
    }
}
