// ABOUTME: Lazily built, process-wide tip retriever with a single-initialization gate
// ABOUTME: First caller builds the index, concurrent callers await the same build
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Tip Retriever
//!
//! Long-lived retrieval front-end owning the build-once index gate. The
//! index is built on first use (bounded by a timeout) inside
//! `spawn_blocking` — corpus embedding is CPU-bound work that must not
//! stall the runtime. `tokio::sync::OnceCell` guarantees concurrent first
//! requests share one in-flight build instead of racing; after a failed
//! build the cell stays empty so a later request can retry once the
//! deployment is fixed.
//!
//! The retriever is an injected dependency, not ambient global state, so
//! tests substitute a small corpus directory and the hash embedder.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::corpus::load_corpus;
use super::embedder::TextEmbedder;
use super::index::TipIndex;
use crate::config::RagConfig;
use crate::errors::{AppError, AppResult};
use crate::models::TipCandidate;

/// Retrieval front-end over the lazily built corpus index
pub struct TipRetriever {
    embedder: Arc<dyn TextEmbedder>,
    corpus_dir: PathBuf,
    top_k: usize,
    build_timeout: Duration,
    index: OnceCell<Arc<TipIndex>>,
}

impl TipRetriever {
    /// Create a retriever over a corpus directory
    #[must_use]
    pub fn new(embedder: Arc<dyn TextEmbedder>, config: &RagConfig) -> Self {
        Self {
            embedder,
            corpus_dir: config.corpus_dir.clone(),
            top_k: config.top_k,
            build_timeout: Duration::from_secs(config.build_timeout_s),
            index: OnceCell::new(),
        }
    }

    /// Configured number of documents per retrieval
    #[must_use]
    pub const fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve the top-k distinct guidance documents for a query.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ErrorCode::IndexBuildFailed`] when the index
    /// cannot be built (empty corpus, unloadable embedder, build timeout) —
    /// fatal for the triggering request. A per-query embedding failure after
    /// a successful build returns
    /// [`crate::errors::ErrorCode::RetrievalUnavailable`], which callers
    /// degrade to an empty retrieved set.
    pub async fn retrieve(&self, query: &str, k: usize) -> AppResult<Vec<TipCandidate>> {
        let index = Arc::clone(self.ensure_index().await?);

        let embedder = Arc::clone(&self.embedder);
        let owned_query = query.to_owned();
        let query_embedding = tokio::task::spawn_blocking(move || {
            embedder.embed_batch(std::slice::from_ref(&owned_query))
        })
        .await
        .map_err(|e| AppError::retrieval_unavailable(format!("Embedding task failed: {e}")))??;

        let Some(query_embedding) = query_embedding.into_iter().next() else {
            return Err(AppError::retrieval_unavailable(
                "Embedder returned no vector for the query",
            ));
        };

        let hits = index.top_k(&query_embedding, k);
        debug!("retrieved {} tips for query {query:?}", hits.len());
        Ok(hits
            .into_iter()
            .map(|hit| TipCandidate::retrieved(hit.text, hit.score))
            .collect())
    }

    /// Get the index, building it exactly once across all concurrent callers
    async fn ensure_index(&self) -> AppResult<&Arc<TipIndex>> {
        self.index
            .get_or_try_init(|| async {
                let embedder = Arc::clone(&self.embedder);
                let dir = self.corpus_dir.clone();

                let build = tokio::task::spawn_blocking(move || {
                    let chunks = load_corpus(&dir)?;
                    TipIndex::build(embedder.as_ref(), chunks)
                });

                let index = tokio::time::timeout(self.build_timeout, build)
                    .await
                    .map_err(|_| {
                        warn!("Tip index build timed out");
                        AppError::index_build(format!(
                            "Index build exceeded {}s",
                            self.build_timeout.as_secs()
                        ))
                    })?
                    .map_err(|e| AppError::index_build(format!("Index build task failed: {e}")))??;

                Ok(Arc::new(index))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embedder::HashEmbedder;
    use std::fs;

    fn retriever_over(dir: &std::path::Path) -> TipRetriever {
        let config = RagConfig {
            corpus_dir: dir.to_path_buf(),
            top_k: 3,
            build_timeout_s: 30,
        };
        TipRetriever::new(Arc::new(HashEmbedder), &config)
    }

    #[tokio::test]
    async fn test_retrieve_from_small_corpus() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sodium.md"), "Reduce salty condiments.").unwrap();
        fs::write(dir.path().join("fiber.md"), "Add beans for fiber.").unwrap();

        let retriever = retriever_over(dir.path());
        let tips = retriever.retrieve("Reduce salty condiments.", 1).await.unwrap();
        assert_eq!(tips.len(), 1);
        assert_eq!(tips[0].text, "Reduce salty condiments.");
    }

    #[tokio::test]
    async fn test_empty_corpus_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = retriever_over(dir.path());
        let err = retriever.retrieve("anything", 3).await.unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::IndexBuildFailed);
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_one_build() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "Tip a.").unwrap();

        let retriever = Arc::new(retriever_over(dir.path()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let r = Arc::clone(&retriever);
            handles.push(tokio::spawn(
                async move { r.retrieve("Tip a.", 1).await },
            ));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }
}
