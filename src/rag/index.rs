// ABOUTME: In-memory embedding index over guidance corpus chunks
// ABOUTME: Cosine top-k with distinct-document selection and insertion-order tie-breaks
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Tip Index
//!
//! A flat in-memory index: one normalized embedding per corpus chunk.
//! Built once, read-only afterward. Scoring is a dot product (vectors are
//! normalized, so this is cosine similarity); selection returns the top-k
//! *distinct source documents*, represented by their best-scoring chunk,
//! with ties broken by corpus insertion order.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::info;

use super::corpus::CorpusChunk;
use super::embedder::TextEmbedder;
use crate::errors::{AppError, AppResult};

/// One retrieval hit
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Source document filename
    pub doc: String,
    /// Chunk text
    pub text: String,
    /// Cosine similarity to the query
    pub score: f64,
}

/// Read-only embedding index over the guidance corpus
#[derive(Debug)]
pub struct TipIndex {
    chunks: Vec<CorpusChunk>,
    embeddings: Vec<Vec<f32>>,
}

impl TipIndex {
    /// Embed every chunk and build the index.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ErrorCode::IndexBuildFailed`] for an empty
    /// corpus (a broken deployment, not a degradation) or when embedding
    /// the corpus fails.
    pub fn build(embedder: &dyn TextEmbedder, chunks: Vec<CorpusChunk>) -> AppResult<Self> {
        if chunks.is_empty() {
            return Err(AppError::index_build(
                "Guidance corpus is empty; nothing to index",
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .map_err(|e| AppError::index_build(format!("Corpus embedding failed: {e}")))?;

        info!(
            "Tip index built: {} chunks via {}",
            chunks.len(),
            embedder.name()
        );
        Ok(Self { chunks, embeddings })
    }

    /// Number of indexed chunks
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True when the index holds no chunks (never the case after `build`)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-k distinct documents by cosine similarity to the query embedding.
    ///
    /// Each document is represented by its best-scoring chunk; within a
    /// document, the earlier chunk wins score ties. Across documents, score
    /// ties fall back to corpus insertion order.
    #[must_use]
    pub fn top_k(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredChunk> {
        // Best chunk per document, first occurrence winning ties
        let mut best_by_doc: HashMap<&str, (f64, usize)> = HashMap::new();
        for (idx, (chunk, embedding)) in self.chunks.iter().zip(&self.embeddings).enumerate() {
            let score = dot(query_embedding, embedding);
            let entry = best_by_doc.entry(&chunk.doc).or_insert((score, idx));
            if score > entry.0 {
                *entry = (score, idx);
            }
        }

        let mut ranked: Vec<(f64, usize)> = best_by_doc.into_values().collect();
        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });

        ranked
            .into_iter()
            .take(k)
            .map(|(score, idx)| ScoredChunk {
                doc: self.chunks[idx].doc.clone(),
                text: self.chunks[idx].text.clone(),
                score,
            })
            .collect()
    }
}

/// Dot product over the shared prefix of two vectors
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embedder::HashEmbedder;

    fn chunk(doc: &str, text: &str) -> CorpusChunk {
        CorpusChunk {
            doc: doc.to_owned(),
            text: text.to_owned(),
        }
    }

    fn embed_one(text: &str) -> Vec<f32> {
        HashEmbedder
            .embed_batch(&[text.to_owned()])
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_empty_corpus_refuses_to_build() {
        let err = TipIndex::build(&HashEmbedder, Vec::new()).unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::IndexBuildFailed);
    }

    #[test]
    fn test_identical_text_is_the_top_hit() {
        let index = TipIndex::build(
            &HashEmbedder,
            vec![
                chunk("a.md", "cut back on salty sauces"),
                chunk("b.md", "add leafy greens for fiber"),
                chunk("c.md", "choose water over soda"),
            ],
        )
        .unwrap();

        // The query embedding equals document b's embedding by construction
        let hits = index.top_k(&embed_one("add leafy greens for fiber"), 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc, "b.md");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_distinct_documents_only() {
        let index = TipIndex::build(
            &HashEmbedder,
            vec![
                chunk("a.md", "sodium note one"),
                chunk("a.md", "sodium note two"),
                chunk("b.md", "fiber note"),
            ],
        )
        .unwrap();

        let hits = index.top_k(&embed_one("sodium note one"), 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc, "a.md");
        assert_eq!(hits[1].doc, "b.md");
    }

    #[test]
    fn test_retrieval_is_deterministic() {
        let chunks = vec![
            chunk("a.md", "tip alpha"),
            chunk("b.md", "tip beta"),
            chunk("c.md", "tip gamma"),
        ];
        let index = TipIndex::build(&HashEmbedder, chunks).unwrap();
        let query = embed_one("alpha beta gamma");

        let first: Vec<String> = index.top_k(&query, 3).iter().map(|h| h.doc.clone()).collect();
        for _ in 0..5 {
            let again: Vec<String> =
                index.top_k(&query, 3).iter().map(|h| h.doc.clone()).collect();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_k_larger_than_corpus() {
        let index = TipIndex::build(&HashEmbedder, vec![chunk("a.md", "only tip")]).unwrap();
        let hits = index.top_k(&embed_one("anything"), 10);
        assert_eq!(hits.len(), 1);
    }
}
