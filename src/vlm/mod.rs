// ABOUTME: Vision-language provider abstraction for pluggable dish recognition
// ABOUTME: Defines the contract for VLM backends (Ollama, OpenAI) with a uniform prediction shape
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Vision-Language Provider Service Provider Interface
//!
//! This module defines the contract that vision-language backends must
//! implement to serve dish predictions. The design mirrors a provider SPI:
//! the orchestrator depends only on [`VisionProvider`], never on a concrete
//! backend type.
//!
//! Two provider families are supported:
//!
//! - **Local runtime** ([`OllamaProvider`]): native Ollama chat API with
//!   base64-attached images
//! - **Hosted API** ([`OpenAiProvider`]): OpenAI chat completions with a
//!   data-URL image part and forced JSON output
//!
//! Both return free-form text that is normalized into a [`DishPrediction`]
//! by the extraction parser; malformed model output degrades to a sentinel
//! low-confidence prediction instead of an error.

pub mod extract;
mod image;
mod ollama;
mod openai;
mod provider;

pub use image::PreparedImage;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::VisionBackend;

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::DishPrediction;

/// Instruction sent to every backend. Strict JSON keeps extraction cheap;
/// models that ignore it fall through to the regex extractor.
pub(crate) const CLASSIFY_PROMPT: &str = "Return STRICT JSON only with no extra text. \
     Schema: {\"label\": <string>, \"portion_grams\": <float>, \"confidence\": <0-1>}. \
     Prefer Food-101 style labels; if unsure, still pick one best label.";

/// Vision-language provider trait for dish prediction
///
/// Implement this trait to add a new inference backend. One outbound call
/// per invocation; no retries here (retry policy belongs to the caller).
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Unique provider identifier (e.g. "ollama", "openai")
    fn name(&self) -> &'static str;

    /// Default model used when the request does not specify one
    fn default_model(&self) -> &str;

    /// Predict the dish, portion and confidence for a prepared image
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ErrorCode::InferenceFailed`] when the
    /// backend is unreachable, answers with a non-success status, or
    /// exceeds the request timeout. A reachable backend whose output
    /// cannot be parsed yields a sentinel prediction, never an error.
    async fn predict(
        &self,
        image: &PreparedImage,
        model: Option<&str>,
    ) -> AppResult<DishPrediction>;
}
