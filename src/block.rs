//! Grouping recovered page lines into indexable blocks.
//!
//! Segmentation runs in priority order per page: explicit Soru/Cevap
//! records, then question-mark Q/A pairing, then heading + paragraph,
//! then overlapping sentence windows as a last resort so every page with
//! text yields at least one block.

use crate::config::{MAX_KEYWORDS_PER_BLOCK, MAX_WINDOW_TITLE_CHARS, MIN_BODY_LEN, WINDOW_SENTENCES};
use crate::layout::PageText;
use crate::normalize;
use crate::token;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// How the block was segmented; Q/A blocks win ranking ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockKind {
    QuestionAnswer,
    Heading,
    Window,
}

/// Minimal indexable unit: a title, keyword, and body field with its
/// source location. Token views are derived at index build time.
#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub doc_id: usize,
    pub page: u32,
    pub kind: BlockKind,
    pub title: String,
    pub body: String,
    pub keywords: Vec<String>,
}

fn qa_record_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)Soru\s*[:\-]\s*(.+?)Cevap\s*[:\-]\s*(.+?)(?:Anahtar(?:\s*Kelimeler)?\s*[:\-]\s*(.+?))?(?:---|$)",
        )
        .expect("valid Q/A record pattern")
    })
}

fn madde_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^Madde\s+\d+").expect("valid madde pattern"))
}

/// Heading heuristic: all-caps lines, trailing colons, and numbered
/// regulation articles ("Madde 12").
pub fn is_heading(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.len() >= 6 && trimmed.chars().all(|c| !c.is_lowercase()) {
        let has_alpha = trimmed.chars().any(|c| c.is_alphabetic());
        if has_alpha {
            return true;
        }
    }
    if trimmed.ends_with(':') {
        return true;
    }
    madde_heading_regex().is_match(trimmed)
}

/// Split flattened text into sentences on `.`, `!`, `?` followed by
/// whitespace. Deliberately simple; regulation prose rarely abbreviates.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut after_terminator = false;

    for c in text.chars() {
        if after_terminator && c.is_whitespace() {
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
            after_terminator = false;
            continue;
        }
        after_terminator = matches!(c, '.' | '!' | '?');
        current.push(c);
    }

    let sentence = current.trim().to_string();
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
    sentences
}

/// Build blocks for the pages of one document.
pub fn build_blocks(doc_id: usize, pages: &[PageText]) -> Vec<Block> {
    let mut blocks = Vec::new();
    for page in pages {
        build_page_blocks(doc_id, page, &mut blocks);
    }
    for block in &mut blocks {
        enrich_keywords(block);
    }
    blocks
}

fn build_page_blocks(doc_id: usize, page: &PageText, out: &mut Vec<Block>) {
    let flat = page.flat_text();
    if flat.is_empty() {
        return;
    }

    let before = out.len();
    segment_qa_records(doc_id, page, &flat, out);
    if out.len() == before {
        segment_question_lines(doc_id, page, out);
    }
    if out.len() == before {
        segment_headings(doc_id, page, out);
    }
    if out.len() == before {
        segment_window(doc_id, page, &flat, out);
    }
}

/// Explicit "Soru: … Cevap: … [Anahtar Kelimeler: …]" records.
fn segment_qa_records(doc_id: usize, page: &PageText, flat: &str, out: &mut Vec<Block>) {
    // Trailing sentinel so the last record's non-greedy body terminates.
    let probe = format!("{flat} ---");
    for captures in qa_record_regex().captures_iter(&probe) {
        let question = captures
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let answer = captures
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        if question.is_empty() || answer.len() < MIN_BODY_LEN {
            continue;
        }

        let keywords = captures
            .get(3)
            .map(|m| {
                m.as_str()
                    .split([',', ';', '/', '|'])
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .take(MAX_KEYWORDS_PER_BLOCK)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        out.push(Block {
            doc_id,
            page: page.number,
            kind: BlockKind::QuestionAnswer,
            title: question,
            body: answer,
            keywords,
        });
    }
}

/// A line ending in '?' followed by non-empty answer lines.
fn segment_question_lines(doc_id: usize, page: &PageText, out: &mut Vec<Block>) {
    let mut question: Option<String> = None;
    let mut answer_lines: Vec<String> = Vec::new();

    let mut flush = |question: &mut Option<String>, answer_lines: &mut Vec<String>, out: &mut Vec<Block>| {
        if let Some(q) = question.take() {
            let answer = normalize::clean_extracted(&answer_lines.join(" "));
            if answer.len() >= MIN_BODY_LEN {
                out.push(Block {
                    doc_id,
                    page: page.number,
                    kind: BlockKind::QuestionAnswer,
                    title: q,
                    body: answer,
                    keywords: Vec::new(),
                });
            }
        }
        answer_lines.clear();
    };

    for line in &page.lines {
        let trimmed = line.trim();
        if trimmed.ends_with('?') {
            flush(&mut question, &mut answer_lines, out);
            question = Some(trimmed.to_string());
        } else if question.is_some() && !trimmed.is_empty() {
            answer_lines.push(trimmed.to_string());
        }
    }
    flush(&mut question, &mut answer_lines, out);
}

/// Short heading line followed by paragraph text.
fn segment_headings(doc_id: usize, page: &PageText, out: &mut Vec<Block>) {
    let mut chunks: Vec<Vec<String>> = Vec::new();
    let mut buf: Vec<String> = Vec::new();

    for line in &page.lines {
        let trimmed = line.trim().to_string();
        if is_heading(&trimmed) && !buf.is_empty() {
            chunks.push(std::mem::take(&mut buf));
            buf.push(trimmed);
        } else {
            buf.push(trimmed);
        }
    }
    if !buf.is_empty() {
        chunks.push(buf);
    }

    for chunk in chunks {
        let mut parts = chunk.iter().filter(|l| !l.trim().is_empty());
        let Some(head) = parts.next() else { continue };
        let body = normalize::clean_extracted(
            &parts.map(String::as_str).collect::<Vec<_>>().join(" "),
        );
        if is_heading(head) && body.len() >= MIN_BODY_LEN {
            out.push(Block {
                doc_id,
                page: page.number,
                kind: BlockKind::Heading,
                title: head.trim_end_matches(':').trim().to_string(),
                body,
                keywords: Vec::new(),
            });
        }
    }
}

/// Last resort: one sentence-window block so the page stays searchable.
fn segment_window(doc_id: usize, page: &PageText, flat: &str, out: &mut Vec<Block>) {
    let sentences = split_sentences(flat);
    let window = if sentences.is_empty() {
        flat.to_string()
    } else {
        sentences
            .iter()
            .take(WINDOW_SENTENCES)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    };
    let body = if window.len() < MIN_BODY_LEN {
        flat.to_string()
    } else {
        window
    };

    let head_source = body
        .split(['.', '!', '?'])
        .next()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or("Genel Hukum");
    let title = if head_source.chars().count() > MAX_WINDOW_TITLE_CHARS {
        let clipped: String = head_source.chars().take(MAX_WINDOW_TITLE_CHARS).collect();
        format!("{clipped}...")
    } else {
        head_source.to_string()
    };

    out.push(Block {
        doc_id,
        page: page.number,
        kind: BlockKind::Window,
        title,
        body: normalize::clean_extracted(&body),
        keywords: Vec::new(),
    });
}

/// Seed terms appended to the keywords of blocks mentioning a known alias
/// family, so truncated queries like "but" or "trans" can still land.
const ALIAS_KEYWORD_FAMILIES: &[(&[&str], &[&str])] = &[
    (
        &["butunleme", "telafi"],
        &["but", "butunleme", "butunleme sinavi", "butun"],
    ),
    (
        &["transkript", "not belgesi"],
        &["trans", "transkript", "not belgesi"],
    ),
    (
        &["obs", "ogrenci otomasyon"],
        &["obs", "ogrenci otomasyon", "ogrenci bilgi sistemi"],
    ),
];

/// Fill empty keyword fields from the body's most frequent tokens and
/// append alias seeds; everything deduplicated and capped.
fn enrich_keywords(block: &mut Block) {
    if block.keywords.is_empty() {
        let mut freq: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for tok in token::tokenize(&block.body) {
            if tok.chars().count() > 1 {
                if !freq.contains_key(&tok) {
                    order.push(tok.clone());
                }
                *freq.entry(tok).or_insert(0) += 1;
            }
        }
        // Stable ordering: frequency descending, first appearance as tie-break.
        order.sort_by(|a, b| freq[b].cmp(&freq[a]));
        block.keywords = order.into_iter().take(MAX_KEYWORDS_PER_BLOCK).collect();
    }

    let flat = normalize::fold(&format!("{} {}", block.title, block.body));
    let mut extra: Vec<String> = Vec::new();
    for (triggers, seeds) in ALIAS_KEYWORD_FAMILIES {
        if triggers.iter().any(|t| flat.contains(t)) {
            extra.extend(seeds.iter().map(|s| s.to_string()));
        }
    }

    let mut seen: Vec<String> = Vec::new();
    for kw in block.keywords.iter().cloned().chain(extra) {
        let folded = normalize::fold(&kw);
        if !folded.is_empty() && !seen.contains(&folded) {
            seen.push(folded);
        }
    }
    seen.truncate(MAX_KEYWORDS_PER_BLOCK);
    block.keywords = seen;
}
