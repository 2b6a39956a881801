// ABOUTME: Retrieval-augmented guidance: corpus index, embeddings, similarity search
// ABOUTME: Lazily builds a process-wide embedding index and serves deterministic top-k retrieval
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Tip Retrieval
//!
//! Embedding-based retrieval over a directory of short guidance documents.
//! The corpus is read and embedded exactly once per process, behind a
//! build-once gate; after that the index is read-only and shared by all
//! concurrent requests. Retrieval is deterministic: a fixed corpus, a fixed
//! embedding model and a fixed query text always produce the same ordered
//! top-k, with ties broken by corpus insertion order.
//!
//! The query is built from the dish label plus the notable-nutrient flags
//! derived from the same thresholds the tip synthesizer uses, so identical
//! profiles for the same dish always retrieve the same snippets.

mod corpus;
mod embedder;
mod index;
mod retriever;

pub use corpus::{load_corpus, CorpusChunk};
pub use embedder::{FastembedEmbedder, HashEmbedder, TextEmbedder};
pub use index::{ScoredChunk, TipIndex};
pub use retriever::TipRetriever;

use crate::models::NutrientProfile;
use crate::tips::nutrient_flags;

/// Build the deterministic retrieval query for a dish and its profile.
///
/// Label first, then the ordered notable-nutrient flags; no numbers, so two
/// profiles on the same side of every threshold query identically.
#[must_use]
pub fn build_query(label: &str, profile: &NutrientProfile) -> String {
    let flags = nutrient_flags(profile);
    if flags.is_empty() {
        format!("Practical tips to improve a meal of {label}")
    } else {
        format!(
            "Practical tips to improve a meal of {label}. Concerns: {}",
            flags.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_is_deterministic() {
        let profile = NutrientProfile {
            sodium_mg: Some(2250.0),
            fiber_g: Some(1.0),
            ..NutrientProfile::default()
        };
        let a = build_query("burger_and_fries", &profile);
        let b = build_query("burger_and_fries", &profile);
        assert_eq!(a, b);
        assert!(a.contains("high sodium"));
        assert!(a.contains("low fiber"));
    }

    #[test]
    fn test_query_without_flags_omits_concerns() {
        let query = build_query("salad", &NutrientProfile::default());
        assert!(!query.contains("Concerns"));
    }

    #[test]
    fn test_same_threshold_side_queries_identically() {
        let a = NutrientProfile {
            sodium_mg: Some(800.0),
            ..NutrientProfile::default()
        };
        let b = NutrientProfile {
            sodium_mg: Some(1900.0),
            ..NutrientProfile::default()
        };
        assert_eq!(build_query("soup", &a), build_query("soup", &b));
    }
}
