//! The no-hallucination decision boundary.
//!
//! A candidate answer is returned only when its score clears the minimum,
//! enough of the query's own tokens actually occur in the block, and any
//! detected intent is compatible with the block's content. Everything
//! else gets the fixed refusal payload with no source attribution.

use crate::config::{MIN_ACCEPT_SCORE, MIN_OVERLAP_RATIO, REFUSAL_TEXT};
use crate::index::{Field, IndexSnapshot, IndexedBlock};
use crate::query::QueryContext;
use crate::rank::ScoredCandidate;
use crate::token;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// The answer payload handed to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub error: Option<String>,
}

impl AskResponse {
    pub fn refusal() -> Self {
        Self {
            answer: REFUSAL_TEXT.to_string(),
            sources: Vec::new(),
            error: None,
        }
    }
}

/// Decide accept/refuse for the ranked candidates and assemble the answer.
pub fn decide(
    snapshot: &IndexSnapshot,
    ctx: &QueryContext,
    candidates: &[ScoredCandidate],
    snippet_chars: usize,
) -> AskResponse {
    let Some(best) = candidates.first() else {
        return AskResponse::refusal();
    };
    let Some(block) = snapshot.block(best.block) else {
        return AskResponse::refusal();
    };

    if best.score < MIN_ACCEPT_SCORE {
        tracing::debug!(score = best.score, "refusal: best score below threshold");
        return AskResponse::refusal();
    }

    if overlap_ratio(ctx, block) < MIN_OVERLAP_RATIO {
        tracing::debug!("refusal: insufficient term overlap");
        return AskResponse::refusal();
    }

    if !intents_compatible(ctx, block) {
        tracing::debug!("refusal: intent incompatible with candidate");
        return AskResponse::refusal();
    }

    let answer = best_snippet(&block.block.body, &ctx.base_tokens, snippet_chars);
    let source = snapshot
        .document_for(block)
        .map(|doc| format!("{} s:{}", doc.file, block.block.page))
        .into_iter()
        .collect();

    AskResponse {
        answer,
        sources: source,
        error: None,
    }
}

/// Fraction of base query tokens present anywhere in the block.
fn overlap_ratio(ctx: &QueryContext, block: &IndexedBlock) -> f32 {
    if ctx.base_tokens.is_empty() {
        return 0.0;
    }
    let qset: HashSet<&str> = ctx.base_tokens.iter().map(String::as_str).collect();
    let matched = qset
        .iter()
        .filter(|t| block.contains_token(t))
        .count();
    matched as f32 / qset.len() as f32
}

fn intents_compatible(ctx: &QueryContext, block: &IndexedBlock) -> bool {
    // Pass-grade questions need hard evidence in the body: both exam
    // terms, or a number, or a percentage.
    if ctx.intents.pass_grade {
        let body: HashSet<&str> = block
            .tokens(Field::Body)
            .iter()
            .map(String::as_str)
            .collect();
        let exam_pair = body.contains("final") && body.contains("vize");
        let numeric = block
            .tokens(Field::Body)
            .iter()
            .any(|t| t.chars().any(|c| c.is_ascii_digit()));
        let percent = block.tokens(Field::Body).iter().any(|t| t.contains('%'));
        if !(exam_pair || numeric || percent) {
            return false;
        }
    }

    // An appeal-flavored answer to a non-appeal question is a mismatch.
    if !ctx.intents.appeal && block.contains_token("itiraz") {
        return false;
    }

    true
}

fn keyword_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Anahtar\s*Kelimeler\s*[:\-].*").expect("valid keyword line pattern")
    })
}

/// Trim a block body to the snippet budget, anchored on the window with
/// the densest query-term overlap.
pub fn best_snippet(text: &str, query_tokens: &[String], max_chars: usize) -> String {
    let clean = keyword_line_regex().replace_all(text, "").trim().to_string();
    if clean.chars().count() <= max_chars {
        return clean;
    }

    let words: Vec<&str> = clean.split_whitespace().collect();
    if words.is_empty() {
        return clean.chars().take(max_chars).collect();
    }

    let qset: HashSet<String> = query_tokens.iter().cloned().collect();
    let window = (words.len() / 4).clamp(40, 120);
    let step = (window / 3).max(10);

    let mut best_start = 0usize;
    let mut best_hits = -1isize;
    let mut start = 0usize;
    while start < words.len() {
        let slice = &words[start..(start + window).min(words.len())];
        let hits = slice
            .iter()
            .flat_map(|w| token::tokenize(w))
            .filter(|t| qset.contains(t))
            .collect::<HashSet<_>>()
            .len() as isize;
        // Among equally dense windows, take the last so the hit sits
        // near the snippet start and survives the character clip.
        if hits > best_hits || (hits > 0 && hits == best_hits) {
            best_hits = hits;
            best_start = start;
        }
        start += step;
    }

    let snippet = words[best_start..(best_start + window).min(words.len())].join(" ");
    if snippet.chars().count() > max_chars {
        let clipped: String = snippet.chars().take(max_chars).collect();
        let trimmed = match clipped.rfind(' ') {
            Some(idx) => &clipped[..idx],
            None => clipped.as_str(),
        };
        format!("{trimmed}...")
    } else {
        snippet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockKind};
    use crate::config::SNIPPET_CHARS;
    use crate::index::DocumentInfo;
    use crate::rank;
    use chrono::Utc;

    fn snapshot(blocks: Vec<Block>) -> IndexSnapshot {
        let doc = DocumentInfo {
            file: "yonetmelik.pdf".to_string(),
            path: "docs/yonetmelik.pdf".to_string(),
            pages: 1,
            fingerprint: "x".to_string(),
            modified: Utc::now(),
        };
        IndexSnapshot::build(blocks, vec![doc])
    }

    fn block(kind: BlockKind, title: &str, body: &str) -> Block {
        Block {
            doc_id: 0,
            page: 4,
            kind,
            title: title.to_string(),
            body: body.to_string(),
            keywords: vec![],
        }
    }

    fn run(question: &str, snapshot: &IndexSnapshot) -> AskResponse {
        let ctx = QueryContext::build(question, snapshot);
        let ranked = rank::rank(snapshot, &ctx, 5);
        decide(snapshot, &ctx, &ranked, SNIPPET_CHARS)
    }

    #[test]
    fn accepts_strong_match_with_source() {
        let snap = snapshot(vec![block(
            BlockKind::Heading,
            "Bütünleme Sınavları",
            "Bütünleme sinavina final sinavinda basarisiz olan ogrenciler girebilir.",
        )]);
        let response = run("bütünleme sınavı var mı?", &snap);
        assert_ne!(response.answer, REFUSAL_TEXT);
        assert_eq!(response.sources, vec!["yonetmelik.pdf s:4"]);
        assert!(response.error.is_none());
    }

    #[test]
    fn refuses_out_of_vocabulary_query_with_empty_sources() {
        let snap = snapshot(vec![block(
            BlockKind::Heading,
            "Kayit",
            "Kayit yenileme islemleri yariyil basinda yapilir.",
        )]);
        let response = run("uzay gemisi hangarlari nerede", &snap);
        assert_eq!(response.answer, REFUSAL_TEXT);
        assert!(response.sources.is_empty());
    }

    #[test]
    fn pass_grade_intent_refuses_block_without_numeric_evidence() {
        let snap = snapshot(vec![block(
            BlockKind::Heading,
            "Gecme Notu",
            "Gecme notu ile ilgili esaslar senato tarafindan belirlenir.",
        )]);
        // Moderate overlap, but no digits, no %, no final+vize pair.
        let response = run("geçme notu nasıl hesaplanır?", &snap);
        assert_eq!(response.answer, REFUSAL_TEXT);
        assert!(response.sources.is_empty());
    }

    #[test]
    fn pass_grade_intent_accepts_block_with_percentage() {
        let snap = snapshot(vec![block(
            BlockKind::Heading,
            "Gecme Notu",
            "Gecme notu vize notunun %40 ve final notunun %60 toplanmasi ile hesaplanir.",
        )]);
        let response = run("geçme notu nasıl hesaplanır?", &snap);
        assert_ne!(response.answer, REFUSAL_TEXT);
        assert_eq!(response.sources.len(), 1);
    }

    #[test]
    fn appeal_block_refused_for_non_appeal_query() {
        let snap = snapshot(vec![block(
            BlockKind::Heading,
            "Sinav Sonuclari",
            "Sinav sonucuna itiraz yedi gun icinde dilekce ile yapilir.",
        )]);
        let response = run("sinav sonuclari ne zaman aciklanir", &snap);
        assert_eq!(response.answer, REFUSAL_TEXT);
    }

    #[test]
    fn snippet_strips_keyword_lines() {
        let out = best_snippet(
            "Cevap metni burada. Anahtar Kelimeler: butunleme, final",
            &[],
            480,
        );
        assert_eq!(out, "Cevap metni burada.");
    }

    #[test]
    fn long_bodies_are_trimmed_near_the_query_terms() {
        let filler = "genel hukumler burada yer alir ".repeat(40);
        let body = format!("{filler} butunleme sinavi final haftasindan sonra yapilir.");
        let out = best_snippet(&body, &["butunleme".to_string()], 120);
        assert!(out.chars().count() <= 124);
        assert!(out.contains("butunleme"));
    }

    #[test]
    fn empty_candidate_list_refuses() {
        let snap = snapshot(vec![]);
        let ctx = QueryContext::build("herhangi bir soru", &snap);
        let response = decide(&snap, &ctx, &[], SNIPPET_CHARS);
        assert_eq!(response.answer, REFUSAL_TEXT);
    }
}
