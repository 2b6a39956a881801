// ABOUTME: Guidance corpus loading and paragraph chunking
// ABOUTME: Reads .md/.txt documents once, in stable filename order
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Guidance Corpus
//!
//! The corpus is a directory of short `.md`/`.txt` documents, read once at
//! index-build time. Files are visited in filename order and paragraphs in
//! document order, which fixes the insertion order used for retrieval
//! tie-breaking. Editing the corpus requires a process restart; there is no
//! hot reload.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::errors::{AppError, AppResult};

/// Paragraphs are merged up to this many characters per chunk
const MAX_CHUNK_CHARS: usize = 800;

/// One retrievable chunk, tagged with its source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusChunk {
    /// Source document filename
    pub doc: String,
    /// Chunk text
    pub text: String,
}

/// Load and chunk every guidance document under `dir`.
///
/// Returns chunks in deterministic insertion order: files sorted by name,
/// paragraphs in document order. Unreadable individual files are skipped;
/// an unreadable directory is an error. An existing-but-empty corpus yields
/// an empty vector — the caller decides whether that is fatal.
///
/// # Errors
///
/// Returns an error when the directory itself cannot be read.
pub fn load_corpus(dir: &Path) -> AppResult<Vec<CorpusChunk>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        AppError::index_build(format!(
            "Cannot read guidance corpus directory {}: {e}",
            dir.display()
        ))
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("md" | "txt")
            )
        })
        .collect();
    paths.sort();

    let mut chunks = Vec::new();
    for path in paths {
        let Ok(raw) = fs::read_to_string(&path) else {
            debug!("Skipping unreadable corpus file {}", path.display());
            continue;
        };
        let doc = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_owned();
        for text in chunk_text(&raw) {
            chunks.push(CorpusChunk {
                doc: doc.clone(),
                text,
            });
        }
    }

    debug!("Loaded {} corpus chunks from {}", chunks.len(), dir.display());
    Ok(chunks)
}

/// Split a document into bounded chunks on paragraph boundaries.
///
/// Consecutive paragraphs are merged while they fit under the size cap;
/// a single oversized paragraph becomes its own chunk rather than being cut
/// mid-sentence.
fn chunk_text(raw: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in raw.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if !current.is_empty() && current.len() + paragraph.len() + 2 > MAX_CHUNK_CHARS {
            chunks.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            current.push_str(paragraph);
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
