//! Index lifecycle and the three public operations: ask, reindex, health.
//!
//! The engine holds at most one live [`IndexSnapshot`] behind an async
//! RwLock. Rebuilds assemble a complete replacement off to the side and
//! swap it in atomically; queries arriving mid-rebuild keep reading the
//! previous snapshot. Concurrent rebuild requests collapse into the one
//! already running.

use crate::block;
use crate::config::Config;
use crate::gate::{self, AskResponse};
use crate::index::{DocumentInfo, IndexSnapshot};
use crate::layout;
use crate::pdf;
use crate::query::QueryContext;
use crate::rank;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use walkdir::WalkDir;

const BUILD_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_block_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub pdf_count: usize,
    pub indexed_block_count: usize,
    pub docs_dir: String,
    pub built_at: Option<DateTime<Utc>>,
    pub index_age_secs: Option<u64>,
    pub rebuild_in_progress: bool,
}

#[derive(Clone)]
pub struct QaEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: Config,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    building: AtomicBool,
}

impl QaEngine {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                snapshot: RwLock::new(None),
                building: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Answer a question against the current snapshot.
    ///
    /// Builds the first snapshot inline if none exists yet, or waits on
    /// the build already in flight. A stale snapshot is still served; a
    /// background rebuild is kicked off so the next caller sees fresh
    /// data.
    pub async fn ask(&self, question: &str) -> AskResponse {
        if question.trim().is_empty() {
            return AskResponse::refusal();
        }

        let snapshot = match self.current_snapshot().await {
            Some(snap) => snap,
            None => match self.rebuild().await {
                Ok(built) => {
                    // A collapsed request rode on someone else's build;
                    // wait for that build to publish before answering.
                    if !built {
                        self.wait_for_build().await;
                    }
                    match self.current_snapshot().await {
                        Some(snap) => snap,
                        None => return AskResponse::refusal(),
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "initial index build failed");
                    return AskResponse {
                        answer: String::new(),
                        sources: Vec::new(),
                        error: Some(format!("indeks olusturulamadi: {err:#}")),
                    };
                }
            },
        };

        if snapshot.built_at.elapsed() > self.inner.config.index_ttl {
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(err) = engine.rebuild().await {
                    tracing::warn!(error = %err, "background index refresh failed");
                }
            });
        }

        let ctx = QueryContext::build(question, &snapshot);
        if ctx.base_tokens.is_empty() {
            return AskResponse::refusal();
        }
        let ranked = rank::rank(&snapshot, &ctx, self.inner.config.top_k);
        gate::decide(&snapshot, &ctx, &ranked, self.inner.config.snippet_chars)
    }

    /// Force a rebuild. Reports `already_running` when another rebuild
    /// holds the build flag.
    pub async fn reindex(&self) -> ReindexResponse {
        match self.rebuild().await {
            Ok(true) => {
                let snap = self.current_snapshot().await;
                ReindexResponse {
                    status: "ok".to_string(),
                    pdf_count: snap.as_ref().map(|s| s.documents().len()),
                    indexed_block_count: snap.as_ref().map(|s| s.block_count()),
                    error: None,
                }
            }
            Ok(false) => ReindexResponse {
                status: "already_running".to_string(),
                pdf_count: None,
                indexed_block_count: None,
                error: None,
            },
            Err(err) => ReindexResponse {
                status: "error".to_string(),
                pdf_count: None,
                indexed_block_count: None,
                error: Some(format!("{err:#}")),
            },
        }
    }

    /// Read-only status; never triggers index work.
    pub async fn health(&self) -> HealthReport {
        let snap = self.current_snapshot().await;
        let status = match &snap {
            Some(_) => "ready",
            None if self.inner.building.load(Ordering::SeqCst) => "building",
            None => "empty",
        };
        HealthReport {
            status: status.to_string(),
            pdf_count: snap.as_ref().map(|s| s.documents().len()).unwrap_or(0),
            indexed_block_count: snap.as_ref().map(|s| s.block_count()).unwrap_or(0),
            docs_dir: self.inner.config.docs_dir.display().to_string(),
            built_at: snap.as_ref().map(|s| s.built_at_utc),
            index_age_secs: snap.as_ref().map(|s| s.built_at.elapsed().as_secs()),
            rebuild_in_progress: self.inner.building.load(Ordering::SeqCst),
        }
    }

    async fn current_snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.inner.snapshot.read().await.clone()
    }

    /// Park until the in-flight build clears the flag. The flag only
    /// drops after the new snapshot is published (or the build failed),
    /// so a snapshot read after this returns sees the result.
    async fn wait_for_build(&self) {
        while self.inner.building.load(Ordering::SeqCst) {
            tokio::time::sleep(BUILD_POLL_INTERVAL).await;
        }
    }

    /// Build a fresh snapshot and swap it in. Returns `Ok(false)` when a
    /// build was already running. A failed build leaves the previous
    /// snapshot in place.
    pub async fn rebuild(&self) -> Result<bool> {
        if self
            .inner
            .building
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("rebuild already in progress, collapsing request");
            return Ok(false);
        }

        let outcome = match self.build_snapshot().await {
            Ok(snapshot) => {
                tracing::info!(
                    pdf_count = snapshot.documents().len(),
                    block_count = snapshot.block_count(),
                    "index snapshot swapped in"
                );
                *self.inner.snapshot.write().await = Some(Arc::new(snapshot));
                Ok(true)
            }
            Err(err) => Err(err),
        };

        // Held across the swap so a later build cannot slip in between
        // this build finishing and its snapshot becoming visible.
        self.inner.building.store(false, Ordering::SeqCst);
        outcome
    }

    async fn build_snapshot(&self) -> Result<IndexSnapshot> {
        let docs_dir = self.inner.config.docs_dir.clone();
        if !docs_dir.is_dir() {
            bail!("dokuman dizini bulunamadi: {}", docs_dir.display());
        }

        let pdf_paths = collect_pdf_paths(&docs_dir);
        if pdf_paths.is_empty() {
            bail!("dokuman dizininde pdf yok: {}", docs_dir.display());
        }

        let mut blocks = Vec::new();
        let mut documents = Vec::new();
        for path in pdf_paths {
            let doc_id = documents.len();
            match index_document(doc_id, &path).await {
                Ok((info, doc_blocks)) => {
                    tracing::info!(
                        file = %info.file,
                        pages = info.pages,
                        blocks = doc_blocks.len(),
                        "indexed document"
                    );
                    documents.push(info);
                    blocks.extend(doc_blocks);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable pdf");
                }
            }
        }

        if documents.is_empty() {
            bail!("hicbir pdf islenemedi");
        }

        Ok(IndexSnapshot::build(blocks, documents))
    }
}

fn collect_pdf_paths(docs_dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(docs_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    paths
}

async fn index_document(doc_id: usize, path: &Path) -> Result<(DocumentInfo, Vec<crate::block::Block>)> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat {}", path.display()))?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::from)
        .unwrap_or_else(|_| Utc::now());

    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let path_str = path.display().to_string();

    // PDF parsing and layout recovery are CPU-bound.
    let (info, doc_blocks) = tokio::task::spawn_blocking(move || -> Result<_> {
        let fingerprint = format!("{:x}", Sha256::digest(&data));
        let pages = pdf::read_pages(&data)?;
        let page_texts: Vec<_> = pages.iter().filter_map(layout::extract_lines).collect();
        let doc_blocks = block::build_blocks(doc_id, &page_texts);
        let info = DocumentInfo {
            file,
            path: path_str,
            pages: pages.len(),
            fingerprint,
            modified,
        };
        Ok((info, doc_blocks))
    })
    .await
    .context("pdf indexing task panicked")??;

    if doc_blocks.is_empty() {
        bail!("no extractable text blocks");
    }
    Ok((info, doc_blocks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_docs_dir_is_a_build_error() {
        let engine = QaEngine::new(Config::with_docs_dir("/nonexistent/path/for/tests"));
        let err = engine.rebuild().await.unwrap_err();
        assert!(err.to_string().contains("dokuman dizini"));
    }

    #[tokio::test]
    async fn empty_docs_dir_is_a_build_error_and_health_stays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = QaEngine::new(Config::with_docs_dir(dir.path()));
        assert!(engine.rebuild().await.is_err());
        let health = engine.health().await;
        assert_eq!(health.status, "empty");
        assert_eq!(health.pdf_count, 0);
    }

    #[tokio::test]
    async fn reindex_reports_error_status_without_replacing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let engine = QaEngine::new(Config::with_docs_dir(dir.path()));
        let response = engine.reindex().await;
        assert_eq!(response.status, "error");
        assert!(response.error.is_some());
        assert!(engine.current_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn empty_question_is_refused_without_index_work() {
        // Docs dir does not exist; touching the index would surface a
        // build error instead of the clean refusal payload.
        let engine = QaEngine::new(Config::with_docs_dir("/nonexistent/path/for/tests"));
        let response = engine.ask("   ").await;
        assert_eq!(response.answer, crate::config::REFUSAL_TEXT);
        assert!(response.sources.is_empty());
        assert!(response.error.is_none());
    }
}
