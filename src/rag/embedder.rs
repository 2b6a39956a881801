// ABOUTME: Text embedding backends behind a trait seam
// ABOUTME: fastembed (all-MiniLM-L6-v2) for production, deterministic hash vectors for tests
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Text Embedders
//!
//! Embedding generation behind the [`TextEmbedder`] trait so the retriever
//! can be exercised with a small in-memory corpus and no model download.
//! The production implementation wraps `fastembed`'s all-MiniLM-L6-v2
//! (384-dim); `fastembed::TextEmbedding::embed` needs `&mut self`, so the
//! model sits behind a `Mutex` to keep the embedder `Send + Sync`.
//!
//! All embedders return L2-normalized vectors, which turns cosine
//! similarity into a plain dot product downstream.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash as _, Hasher as _};
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::errors::{AppError, AppResult};

/// Embedding dimensionality of all-MiniLM-L6-v2 (and the hash stub)
pub const EMBEDDING_DIM: usize = 384;

/// Embedding backend contract.
///
/// Implementations are synchronous and potentially CPU-heavy; async callers
/// run them on a blocking thread.
pub trait TextEmbedder: Send + Sync {
    /// Backend identifier for logs
    fn name(&self) -> &'static str;

    /// Embed a batch of texts into L2-normalized vectors
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying model fails; callers treat a
    /// failure during index build as fatal and a per-query failure as a
    /// degradation.
    fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;
}

/// Production embedder: all-MiniLM-L6-v2 via fastembed/ONNX.
///
/// The model is loaded on first use, which places the (potentially slow)
/// weight download inside the index build rather than server startup; a
/// load failure therefore surfaces as an index build failure on the first
/// request, never as a startup crash.
#[derive(Default)]
pub struct FastembedEmbedder {
    model: Mutex<Option<TextEmbedding>>,
}

impl FastembedEmbedder {
    /// Create an embedder; weights load lazily on first embed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TextEmbedder for FastembedEmbedder {
    fn name(&self) -> &'static str {
        "fastembed/all-MiniLM-L6-v2"
    }

    fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut slot = self
            .model
            .lock()
            .map_err(|_| AppError::internal("Embedder mutex poisoned"))?;

        if slot.is_none() {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
            )
            .map_err(|e| {
                AppError::index_build(format!("Embedding model failed to load: {e}"))
            })?;
            info!("Embedding model loaded: all-MiniLM-L6-v2");
            *slot = Some(model);
        }

        let Some(model) = slot.as_mut() else {
            return Err(AppError::internal("Embedder slot empty after load"));
        };
        let embeddings = model
            .embed(texts.to_vec(), None)
            .map_err(|e| AppError::retrieval_unavailable(format!("Embedding failed: {e}")))?;
        Ok(embeddings.into_iter().map(|v| normalize(&v)).collect())
    }
}

/// Deterministic hash-based embedder for tests and offline development.
///
/// Not semantically meaningful, but stable across runs and platforms:
/// identical texts embed identically, so retrieval correctness and
/// determinism can be asserted without model weights.
pub struct HashEmbedder;

impl TextEmbedder for HashEmbedder {
    fn name(&self) -> &'static str {
        "hash-stub"
    }

    fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

/// Deterministic 384-dim vector from per-dimension hashing of the text
fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = Vec::with_capacity(EMBEDDING_DIM);
    for dim in 0..EMBEDDING_DIM {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        dim.hash(&mut hasher);
        let bits = hasher.finish();
        // Map the hash to [-1, 1]
        let unit = (bits as f64 / u64::MAX as f64) * 2.0 - 1.0;
        vector.push(unit as f32);
    }
    normalize(&vector)
}

/// L2-normalize a vector; zero vectors are returned unchanged
fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder;
        let a = embedder.embed_batch(&["low sodium diet".to_owned()]).unwrap();
        let b = embedder.embed_batch(&["low sodium diet".to_owned()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embedder_distinguishes_texts() {
        let embedder = HashEmbedder;
        let out = embedder
            .embed_batch(&["fiber".to_owned(), "sodium".to_owned()])
            .unwrap();
        assert_ne!(out[0], out[1]);
    }

    #[test]
    fn test_vectors_are_normalized() {
        let embedder = HashEmbedder;
        let out = embedder.embed_batch(&["anything at all".to_owned()]).unwrap();
        let norm: f32 = out[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(out[0].len(), EMBEDDING_DIM);
    }
}
