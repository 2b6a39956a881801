// ABOUTME: Unified vision backend selector for runtime provider switching
// ABOUTME: Dispatches predict calls to the Ollama or OpenAI family by selector string
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Vision Backend Selector
//!
//! One enum over both provider families so callers can pick a backend per
//! request ("ollama" or "openai") while the orchestrator stays oblivious to
//! which family answered. Unknown selectors fall back to the local runtime.

use async_trait::async_trait;
use std::fmt;

use super::{OllamaProvider, OpenAiProvider, PreparedImage, VisionProvider};
use crate::config::VlmConfig;
use crate::errors::AppResult;
use crate::models::DishPrediction;

/// Unified vision provider that wraps the local and hosted families
pub enum VisionBackend {
    /// Local Ollama runtime
    Ollama(OllamaProvider),
    /// Hosted OpenAI API
    OpenAi(OpenAiProvider),
}

impl VisionBackend {
    /// Create a backend from a request selector string.
    ///
    /// `"openai"` selects the hosted family (requires an API key); anything
    /// else, including an empty selector, selects the local Ollama runtime.
    ///
    /// # Errors
    ///
    /// Returns an error when the selected family cannot be constructed
    /// (missing API key for the hosted family, client build failure).
    pub fn from_selector(selector: &str, config: &VlmConfig) -> AppResult<Self> {
        match selector.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi(OpenAiProvider::new(config)?)),
            _ => Ok(Self::Ollama(OllamaProvider::new(config)?)),
        }
    }
}

#[async_trait]
impl VisionProvider for VisionBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Ollama(p) => p.name(),
            Self::OpenAi(p) => p.name(),
        }
    }

    fn default_model(&self) -> &str {
        match self {
            Self::Ollama(p) => p.default_model(),
            Self::OpenAi(p) => p.default_model(),
        }
    }

    async fn predict(
        &self,
        image: &PreparedImage,
        model: Option<&str>,
    ) -> AppResult<DishPrediction> {
        match self {
            Self::Ollama(p) => p.predict(image, model).await,
            Self::OpenAi(p) => p.predict(image, model).await,
        }
    }
}

impl fmt::Debug for VisionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama(_) => f.debug_tuple("VisionBackend::Ollama").finish(),
            Self::OpenAi(_) => f.debug_tuple("VisionBackend::OpenAi").finish(),
        }
    }
}
