//! The immutable index snapshot.
//!
//! A snapshot is a pure function of a block set: per-field inverted
//! postings with term frequencies, bigram postings, per-field length
//! statistics for BM25 normalization, and the vocabulary used for fuzzy
//! query expansion. It is built once per rebuild cycle and published
//! atomically; nothing in here mutates after construction.

use crate::block::Block;
use crate::token;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Keywords,
    Body,
}

pub const FIELDS: [Field; 3] = [Field::Title, Field::Keywords, Field::Body];

/// One document of the indexed corpus.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub file: String,
    pub path: String,
    pub pages: usize,
    /// SHA-256 of the file contents, for change detection across rebuilds.
    pub fingerprint: String,
    pub modified: DateTime<Utc>,
}

/// A block together with its per-field token and bigram views, computed
/// once at build time.
#[derive(Debug, Clone)]
pub struct IndexedBlock {
    pub block: Block,
    pub title_tokens: Vec<String>,
    pub keyword_tokens: Vec<String>,
    pub body_tokens: Vec<String>,
    pub title_bigrams: Vec<String>,
    pub keyword_bigrams: Vec<String>,
    pub body_bigrams: Vec<String>,
}

impl IndexedBlock {
    fn new(block: Block) -> Self {
        let title_tokens = token::tokenize(&block.title);
        let keyword_tokens = token::tokenize(&block.keywords.join(" "));
        let body_tokens = token::tokenize(&block.body);
        let title_bigrams = token::bigrams(&title_tokens);
        let keyword_bigrams = token::bigrams(&keyword_tokens);
        let body_bigrams = token::bigrams(&body_tokens);
        Self {
            block,
            title_tokens,
            keyword_tokens,
            body_tokens,
            title_bigrams,
            keyword_bigrams,
            body_bigrams,
        }
    }

    pub fn tokens(&self, field: Field) -> &[String] {
        match field {
            Field::Title => &self.title_tokens,
            Field::Keywords => &self.keyword_tokens,
            Field::Body => &self.body_tokens,
        }
    }

    pub fn bigrams(&self, field: Field) -> &[String] {
        match field {
            Field::Title => &self.title_bigrams,
            Field::Keywords => &self.keyword_bigrams,
            Field::Body => &self.body_bigrams,
        }
    }

    /// True when any field contains the term.
    pub fn contains_token(&self, term: &str) -> bool {
        FIELDS
            .iter()
            .any(|f| self.tokens(*f).iter().any(|t| t == term))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Posting {
    pub block: usize,
    pub tf: u32,
}

/// Postings and statistics for one field.
#[derive(Debug, Default)]
pub struct FieldIndex {
    postings: HashMap<String, Vec<Posting>>,
    bigram_postings: HashMap<String, Vec<Posting>>,
    pub avg_len: f32,
}

impl FieldIndex {
    pub fn postings(&self, term: &str) -> Option<&[Posting]> {
        self.postings.get(term).map(Vec::as_slice)
    }

    pub fn bigram_postings(&self, bigram: &str) -> Option<&[Posting]> {
        self.bigram_postings.get(bigram).map(Vec::as_slice)
    }

    /// Document frequency of a term within this field.
    pub fn df(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }
}

/// One complete, immutable index over a block set.
pub struct IndexSnapshot {
    blocks: Vec<IndexedBlock>,
    documents: Vec<DocumentInfo>,
    title: FieldIndex,
    keywords: FieldIndex,
    body: FieldIndex,
    /// Sorted union of all field terms; iterated for fuzzy matching.
    vocabulary: Vec<String>,
    pub built_at: Instant,
    pub built_at_utc: DateTime<Utc>,
}

impl IndexSnapshot {
    /// Build a snapshot from a block set. Deterministic: postings vectors
    /// follow block order and the vocabulary is sorted.
    pub fn build(blocks: Vec<Block>, documents: Vec<DocumentInfo>) -> Self {
        let blocks: Vec<IndexedBlock> = blocks.into_iter().map(IndexedBlock::new).collect();

        let mut snapshot = Self {
            title: build_field(&blocks, Field::Title),
            keywords: build_field(&blocks, Field::Keywords),
            body: build_field(&blocks, Field::Body),
            vocabulary: Vec::new(),
            blocks,
            documents,
            built_at: Instant::now(),
            built_at_utc: Utc::now(),
        };

        let mut vocab: Vec<String> = snapshot
            .title
            .postings
            .keys()
            .chain(snapshot.keywords.postings.keys())
            .chain(snapshot.body.postings.keys())
            .cloned()
            .collect();
        vocab.sort();
        vocab.dedup();
        snapshot.vocabulary = vocab;
        snapshot
    }

    pub fn empty() -> Self {
        Self::build(Vec::new(), Vec::new())
    }

    pub fn field(&self, field: Field) -> &FieldIndex {
        match field {
            Field::Title => &self.title,
            Field::Keywords => &self.keywords,
            Field::Body => &self.body,
        }
    }

    pub fn blocks(&self) -> &[IndexedBlock] {
        &self.blocks
    }

    pub fn block(&self, id: usize) -> Option<&IndexedBlock> {
        self.blocks.get(id)
    }

    pub fn documents(&self) -> &[DocumentInfo] {
        &self.documents
    }

    pub fn document_for(&self, block: &IndexedBlock) -> Option<&DocumentInfo> {
        self.documents.get(block.block.doc_id)
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn contains_term(&self, term: &str) -> bool {
        self.vocabulary.binary_search_by(|v| v.as_str().cmp(term)).is_ok()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

fn build_field(blocks: &[IndexedBlock], field: Field) -> FieldIndex {
    let mut index = FieldIndex::default();
    let mut total_len = 0usize;

    for (block_id, block) in blocks.iter().enumerate() {
        let tokens = block.tokens(field);
        total_len += tokens.len();

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for tok in tokens {
            *counts.entry(tok.as_str()).or_insert(0) += 1;
        }
        // Insert in sorted term order so repeated builds fill the maps
        // identically.
        let mut terms: Vec<(&str, u32)> = counts.into_iter().collect();
        terms.sort_unstable();
        for (term, tf) in terms {
            index
                .postings
                .entry(term.to_string())
                .or_default()
                .push(Posting { block: block_id, tf });
        }

        let mut bigram_counts: HashMap<&str, u32> = HashMap::new();
        for bigram in block.bigrams(field) {
            *bigram_counts.entry(bigram.as_str()).or_insert(0) += 1;
        }
        let mut bigram_terms: Vec<(&str, u32)> = bigram_counts.into_iter().collect();
        bigram_terms.sort_unstable();
        for (bigram, tf) in bigram_terms {
            index
                .bigram_postings
                .entry(bigram.to_string())
                .or_default()
                .push(Posting { block: block_id, tf });
        }
    }

    index.avg_len = if blocks.is_empty() {
        0.0
    } else {
        total_len as f32 / blocks.len() as f32
    };
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;

    pub(crate) fn sample_block(doc_id: usize, title: &str, body: &str, kws: &[&str]) -> Block {
        Block {
            doc_id,
            page: 1,
            kind: BlockKind::Heading,
            title: title.to_string(),
            body: body.to_string(),
            keywords: kws.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn sample_doc() -> DocumentInfo {
        DocumentInfo {
            file: "yonetmelik.pdf".to_string(),
            path: "docs/yonetmelik.pdf".to_string(),
            pages: 3,
            fingerprint: "abc".to_string(),
            modified: Utc::now(),
        }
    }

    #[test]
    fn postings_carry_term_frequencies() {
        let blocks = vec![
            sample_block(0, "Butunleme Sinavlari", "butunleme sinavi butunleme", &[]),
            sample_block(0, "Kayit", "kayit yenileme islemleri hakkinda", &[]),
        ];
        let snapshot = IndexSnapshot::build(blocks, vec![sample_doc()]);

        let postings = snapshot
            .field(Field::Body)
            .postings("butunleme")
            .expect("term indexed");
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].block, 0);
        assert_eq!(postings[0].tf, 2);
        assert_eq!(snapshot.field(Field::Body).df("butunleme"), 1);
    }

    #[test]
    fn field_statistics_describe_the_same_block_set() {
        let blocks = vec![
            sample_block(0, "Bir", "iki uc dort", &[]),
            sample_block(0, "Bes alti", "yedi sekiz", &[]),
        ];
        let snapshot = IndexSnapshot::build(blocks, vec![sample_doc()]);
        assert_eq!(snapshot.block_count(), 2);
        // Body lengths 3 and 2 -> average 2.5.
        assert!((snapshot.field(Field::Body).avg_len - 2.5).abs() < 1e-6);
    }

    #[test]
    fn bigrams_are_indexed_per_field() {
        let blocks = vec![sample_block(
            0,
            "Gecme Notu",
            "gecme notu nasil hesaplanir",
            &[],
        )];
        let snapshot = IndexSnapshot::build(blocks, vec![sample_doc()]);
        assert!(snapshot
            .field(Field::Title)
            .bigram_postings("gecme not")
            .is_some());
    }

    #[test]
    fn vocabulary_is_sorted_and_searchable() {
        let blocks = vec![sample_block(0, "Vize", "final sinavi", &["devamsizlik"])];
        let snapshot = IndexSnapshot::build(blocks, vec![sample_doc()]);
        assert!(snapshot.contains_term("final"));
        assert!(snapshot.contains_term("devamsizlik"));
        assert!(!snapshot.contains_term("yok"));
    }

    #[test]
    fn rebuilding_from_the_same_blocks_is_identical() {
        let make = || {
            vec![
                sample_block(0, "Butunleme", "butunleme sinavi icin kayit gerekir", &[]),
                sample_block(0, "Devam", "devam zorunlulugu yuzde yetmis", &[]),
            ]
        };
        let a = IndexSnapshot::build(make(), vec![sample_doc()]);
        let b = IndexSnapshot::build(make(), vec![sample_doc()]);

        assert_eq!(a.vocabulary(), b.vocabulary());
        for term in a.vocabulary() {
            for field in FIELDS {
                let pa: Vec<(usize, u32)> = a
                    .field(field)
                    .postings(term)
                    .unwrap_or(&[])
                    .iter()
                    .map(|p| (p.block, p.tf))
                    .collect();
                let pb: Vec<(usize, u32)> = b
                    .field(field)
                    .postings(term)
                    .unwrap_or(&[])
                    .iter()
                    .map(|p| (p.block, p.tf))
                    .collect();
                assert_eq!(pa, pb);
            }
        }
    }
}
