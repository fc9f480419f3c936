//! Field-weighted BM25 scoring over the index snapshot.
//!
//! The score of a candidate block is the weighted sum of per-field BM25
//! scores, plus a bigram bonus and a prefix bonus for truncated queries,
//! then shaped by intent-based boosts and penalties. Ties break by block
//! kind (Q/A first), then document recency, then block id, so rankings
//! are fully deterministic.

use crate::block::BlockKind;
use crate::config::{
    APPEAL_MISMATCH_PENALTY, BIGRAM_BASE_FACTOR, BIGRAM_HIT_CAP, BIGRAM_PER_HIT, BM25_B, BM25_K1,
    EXAM_TERM_BOOST, HEADING_BOOST, INTERSECT_BASE_BOOST, INTERSECT_HIT_CAP, INTERSECT_PER_HIT,
    NUMERIC_BOOST, PERCENT_BOOST, PHRASE_BOOST, PREFIX_BOOST, PREFIX_MAX_LEN, PREFIX_MIN_LEN,
};
use crate::index::{Field, IndexSnapshot, IndexedBlock, FIELDS};
use crate::query::QueryContext;
use std::collections::{HashMap, HashSet};

/// Per-signal score breakdown, kept for the safety gate and for
/// observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreBreakdown {
    /// Weighted sum of the three per-field BM25 scores.
    pub field: f32,
    pub bigram: f32,
    pub prefix: f32,
}

/// One ranked block reference.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub block: usize,
    pub score: f32,
    pub breakdown: ScoreBreakdown,
}

fn field_weight(field: Field) -> f32 {
    match field {
        Field::Title => crate::config::W_TITLE,
        Field::Keywords => crate::config::W_KEYWORDS,
        Field::Body => crate::config::W_BODY,
    }
}

fn idf(snapshot: &IndexSnapshot, field: Field, term: &str) -> f32 {
    let n = snapshot.block_count() as f32;
    if n == 0.0 {
        return 0.0;
    }
    let df = snapshot.field(field).df(term) as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// BM25 with standard saturation and length normalization for one field.
fn bm25_field(
    snapshot: &IndexSnapshot,
    field: Field,
    q_terms: &[String],
    block: &IndexedBlock,
) -> f32 {
    let doc_terms = block.tokens(field);
    if q_terms.is_empty() || doc_terms.is_empty() {
        return 0.0;
    }

    let dl = doc_terms.len() as f32;
    let avg_dl = snapshot.field(field).avg_len.max(1.0);

    let mut tf: HashMap<&str, f32> = HashMap::new();
    for t in doc_terms {
        *tf.entry(t.as_str()).or_insert(0.0) += 1.0;
    }

    let mut score = 0.0;
    for term in q_terms {
        let f = match tf.get(term.as_str()) {
            Some(f) => *f,
            None => continue,
        };
        let saturation = f * (BM25_K1 + 1.0) / (f + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avg_dl));
        score += idf(snapshot, field, term) * saturation;
    }
    score
}

fn capped_bonus(base: f32, per_hit: f32, cap: usize, hits: usize) -> f32 {
    base + per_hit * hits.min(cap) as f32
}

fn score_block(
    snapshot: &IndexSnapshot,
    ctx: &QueryContext,
    block_id: usize,
    block: &IndexedBlock,
    q_terms: &[String],
    q_bigrams: &[String],
) -> ScoredCandidate {
    let mut field_score = 0.0;
    for field in FIELDS {
        field_score += field_weight(field) * bm25_field(snapshot, field, q_terms, block);
    }

    // Bigram bonus, proportional to distinct query bigrams found anywhere
    // in the block.
    let mut bigram_bonus = 0.0;
    if !q_bigrams.is_empty() && field_score > 0.0 {
        let block_bigrams: HashSet<&str> = FIELDS
            .iter()
            .flat_map(|f| block.bigrams(*f))
            .map(String::as_str)
            .collect();
        let hits = q_bigrams
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|b| block_bigrams.contains(b.as_str()))
            .count();
        if hits > 0 {
            bigram_bonus =
                field_score * capped_bonus(BIGRAM_BASE_FACTOR, BIGRAM_PER_HIT, BIGRAM_HIT_CAP, hits);
        }
    }

    // Prefix bonus compensates truncated single-token queries ("but",
    // "trans") matched against title or keyword terms.
    let mut prefix_bonus = 0.0;
    if let Some(prefix) = ctx.prefix_term() {
        // Alias-mapped queries always qualify; otherwise the raw token
        // must be short enough to plausibly be a truncation.
        let raw = ctx.base_tokens[0].as_str();
        let raw_len = raw.chars().count();
        if prefix != raw || (PREFIX_MIN_LEN..=PREFIX_MAX_LEN).contains(&raw_len) {
            let hit = block
                .tokens(Field::Title)
                .iter()
                .chain(block.tokens(Field::Keywords))
                .any(|t| t.starts_with(prefix));
            if hit && field_score > 0.0 {
                prefix_bonus = field_score * PREFIX_BOOST;
            }
        }
    }

    let mut score = field_score + bigram_bonus + prefix_bonus;

    // Title and keyword intersections with the base query.
    let qset: HashSet<&str> = ctx.base_tokens.iter().map(String::as_str).collect();
    let title_hits = block
        .tokens(Field::Title)
        .iter()
        .filter(|t| qset.contains(t.as_str()))
        .collect::<HashSet<_>>()
        .len();
    let keyword_hits = block
        .tokens(Field::Keywords)
        .iter()
        .filter(|t| qset.contains(t.as_str()))
        .collect::<HashSet<_>>()
        .len();
    if title_hits > 0 {
        score *= capped_bonus(INTERSECT_BASE_BOOST, INTERSECT_PER_HIT, INTERSECT_HIT_CAP, title_hits);
    }
    if keyword_hits > 0 {
        score *= capped_bonus(
            INTERSECT_BASE_BOOST,
            INTERSECT_PER_HIT,
            INTERSECT_HIT_CAP,
            keyword_hits,
        );
    }

    // Exact-phrase bonus when the whole base query occurs verbatim.
    if ctx.base_tokens.len() > 1 {
        let phrase = ctx.base_tokens.join(" ");
        let title_joined = block.tokens(Field::Title).join(" ");
        let body_joined = block.tokens(Field::Body).join(" ");
        if title_joined.contains(&phrase) || body_joined.contains(&phrase) {
            score *= PHRASE_BOOST;
        }
    }

    // Intent-based shaping.
    if ctx.intents.pass_grade {
        let body: HashSet<&str> = block
            .tokens(Field::Body)
            .iter()
            .map(String::as_str)
            .collect();
        if body.contains("final") || body.contains("vize") {
            score *= EXAM_TERM_BOOST;
        }
        if block
            .tokens(Field::Body)
            .iter()
            .any(|t| t.chars().all(|c| c.is_ascii_digit()) && !t.is_empty())
        {
            score *= NUMERIC_BOOST;
        }
        if block.tokens(Field::Body).iter().any(|t| t.contains('%')) {
            score *= PERCENT_BOOST;
        }
    }
    if !ctx.intents.appeal && block.contains_token("itiraz") {
        score *= APPEAL_MISMATCH_PENALTY;
    }
    if block.block.kind == BlockKind::Heading {
        score *= HEADING_BOOST;
    }

    ScoredCandidate {
        block: block_id,
        score,
        breakdown: ScoreBreakdown {
            field: field_score,
            bigram: bigram_bonus,
            prefix: prefix_bonus,
        },
    }
}

/// Blocks whose postings intersect any query term in any field.
fn candidate_blocks(snapshot: &IndexSnapshot, terms: &[String]) -> Vec<usize> {
    let mut candidates: HashSet<usize> = HashSet::new();
    for term in terms {
        for field in FIELDS {
            if let Some(postings) = snapshot.field(field).postings(term) {
                candidates.extend(postings.iter().map(|p| p.block));
            }
        }
    }
    let mut out: Vec<usize> = candidates.into_iter().collect();
    out.sort_unstable();
    out
}

fn order_candidates(snapshot: &IndexSnapshot, scored: &mut Vec<ScoredCandidate>) {
    let kind_rank = |id: usize| match snapshot.block(id).map(|b| b.block.kind) {
        Some(BlockKind::QuestionAnswer) => 0u8,
        Some(BlockKind::Heading) => 1,
        _ => 2,
    };
    let recency = |id: usize| {
        snapshot
            .block(id)
            .and_then(|b| snapshot.document_for(b))
            .map(|d| d.modified)
    };

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| kind_rank(a.block).cmp(&kind_rank(b.block)))
            .then_with(|| recency(b.block).cmp(&recency(a.block)))
            .then_with(|| a.block.cmp(&b.block))
    });
}

/// Rank blocks for a query, returning the top-K scored candidates.
pub fn rank(snapshot: &IndexSnapshot, ctx: &QueryContext, top_k: usize) -> Vec<ScoredCandidate> {
    let q_terms = ctx.all_terms();
    let q_bigrams = ctx.bigrams();

    let mut scored: Vec<ScoredCandidate> = candidate_blocks(snapshot, &q_terms)
        .into_iter()
        .filter_map(|id| {
            let block = snapshot.block(id)?;
            let candidate = score_block(snapshot, ctx, id, block, &q_terms, &q_bigrams);
            (candidate.score > 0.0).then_some(candidate)
        })
        .collect();

    if scored.is_empty() {
        scored = keyword_fallback(snapshot, ctx, top_k);
    }

    order_candidates(snapshot, &mut scored);
    scored.truncate(top_k);
    scored
}

/// Weight of a fuzzy-matched term hit in the fallback counter.
const FUZZY_HIT_WEIGHT: f32 = 0.6;
const FALLBACK_HEADING_BONUS: f32 = 0.5;

/// Last-chance retrieval: count raw postings hits for the base tokens and
/// their fuzzy variants. Only used when BM25 ranking finds nothing.
fn keyword_fallback(
    snapshot: &IndexSnapshot,
    ctx: &QueryContext,
    limit: usize,
) -> Vec<ScoredCandidate> {
    let mut hits: HashMap<usize, f32> = HashMap::new();

    let mut tally = |terms: &[String], weight: f32| {
        for term in terms {
            for field in FIELDS {
                if let Some(postings) = snapshot.field(field).postings(term) {
                    for posting in postings {
                        *hits.entry(posting.block).or_insert(0.0) += weight;
                    }
                }
            }
        }
    };
    tally(&ctx.base_tokens, 1.0);
    tally(&ctx.fuzzy_tokens, FUZZY_HIT_WEIGHT);

    let mut scored: Vec<ScoredCandidate> = hits
        .into_iter()
        .filter_map(|(id, hit_score)| {
            let block = snapshot.block(id)?;
            let bonus = if block.block.kind == BlockKind::Heading {
                FALLBACK_HEADING_BONUS
            } else {
                0.0
            };
            Some(ScoredCandidate {
                block: id,
                score: hit_score + bonus,
                breakdown: ScoreBreakdown {
                    field: hit_score,
                    ..Default::default()
                },
            })
        })
        .collect();

    order_candidates(snapshot, &mut scored);
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockKind};
    use crate::index::DocumentInfo;
    use chrono::Utc;

    fn block(doc_id: usize, kind: BlockKind, title: &str, body: &str, kws: &[&str]) -> Block {
        Block {
            doc_id,
            page: 1,
            kind,
            title: title.to_string(),
            body: body.to_string(),
            keywords: kws.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn doc(file: &str) -> DocumentInfo {
        DocumentInfo {
            file: file.to_string(),
            path: format!("docs/{file}"),
            pages: 1,
            fingerprint: "x".to_string(),
            modified: Utc::now(),
        }
    }

    fn sample_snapshot() -> IndexSnapshot {
        let blocks = vec![
            block(
                0,
                BlockKind::Heading,
                "Butunleme Sinavlari",
                "Butunleme sinavina final sinavinda basarisiz olan ogrenciler girer.",
                &["butunleme", "but"],
            ),
            block(
                0,
                BlockKind::Window,
                "Kayit Yenileme",
                "Kayit yenileme islemleri her yariyil basinda danisman onayi ile yapilir.",
                &[],
            ),
            block(
                0,
                BlockKind::Heading,
                "Not Itirazlari",
                "Sinav sonucuna itiraz dilekce ile yapilir ve komisyon karar verir.",
                &["itiraz"],
            ),
        ];
        IndexSnapshot::build(blocks, vec![doc("yonetmelik.pdf")])
    }

    #[test]
    fn title_match_outranks_body_match() {
        let snapshot = sample_snapshot();
        let ctx = QueryContext::build("butunleme sinavi var mi", &snapshot);
        let ranked = rank(&snapshot, &ctx, 5);
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].block, 0);
        assert!(ranked[0].breakdown.field > 0.0);
    }

    #[test]
    fn overlap_monotonicity_holds() {
        let snapshot = sample_snapshot();
        let narrow = QueryContext::build("kayit", &snapshot);
        let wide = QueryContext::build("kayit yenileme islemleri", &snapshot);

        let target = 1usize;
        let narrow_score = rank(&snapshot, &narrow, 5)
            .into_iter()
            .find(|c| c.block == target)
            .map(|c| c.score)
            .unwrap_or(0.0);
        let wide_score = rank(&snapshot, &wide, 5)
            .into_iter()
            .find(|c| c.block == target)
            .map(|c| c.score)
            .unwrap_or(0.0);
        assert!(wide_score >= narrow_score);
    }

    #[test]
    fn appeal_blocks_are_penalized_without_appeal_intent() {
        let snapshot = sample_snapshot();
        let without = QueryContext::build("sinav sonucu komisyon", &snapshot);
        let with = QueryContext::build("sinav sonucuna itiraz", &snapshot);

        let target = 2usize;
        let score_without = rank(&snapshot, &without, 5)
            .into_iter()
            .find(|c| c.block == target)
            .map(|c| c.score)
            .unwrap_or(0.0);
        let score_with = rank(&snapshot, &with, 5)
            .into_iter()
            .find(|c| c.block == target)
            .map(|c| c.score)
            .unwrap_or(0.0);
        assert!(score_with > score_without);
    }

    #[test]
    fn prefix_bonus_finds_truncated_queries() {
        let snapshot = sample_snapshot();
        let ctx = QueryContext::build("but", &snapshot);
        let ranked = rank(&snapshot, &ctx, 5);
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].block, 0);
    }

    #[test]
    fn alias_queries_receive_the_prefix_bonus() {
        let blocks = vec![block(
            0,
            BlockKind::Heading,
            "Transkript Belgesi",
            "Transkript belgesi ogrenci isleri biriminden alinir.",
            &["transkript"],
        )];
        let snapshot = IndexSnapshot::build(blocks, vec![doc("kilavuz.pdf")]);
        // Alias keys longer than a bare truncation still get the bonus.
        for query in ["trans", "transkriptim"] {
            let ctx = QueryContext::build(query, &snapshot);
            let ranked = rank(&snapshot, &ctx, 5);
            assert!(!ranked.is_empty(), "no candidates for {query}");
            assert!(
                ranked[0].breakdown.prefix > 0.0,
                "no prefix bonus for {query}"
            );
        }
    }

    #[test]
    fn full_word_single_queries_get_no_prefix_bonus() {
        let snapshot = sample_snapshot();
        let ctx = QueryContext::build("butunleme", &snapshot);
        let ranked = rank(&snapshot, &ctx, 5);
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].breakdown.prefix, 0.0);
    }

    #[test]
    fn ranking_is_deterministic() {
        let snapshot = sample_snapshot();
        let ctx = QueryContext::build("sinav", &snapshot);
        let first: Vec<usize> = rank(&snapshot, &ctx, 5).iter().map(|c| c.block).collect();
        let second: Vec<usize> = rank(&snapshot, &ctx, 5).iter().map(|c| c.block).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_terms_rank_nothing() {
        let snapshot = sample_snapshot();
        let ctx = QueryContext::build("zzz qqq", &snapshot);
        assert!(rank(&snapshot, &ctx, 5).is_empty());
    }
}
