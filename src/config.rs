// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Typed sub-configs with defaults for server, VLM backends, FDC and retrieval
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Environment-based configuration management
//!
//! All configuration is environment-only; there are no config files. Every
//! knob has a default that works for local development against an Ollama
//! instance, except the FoodData Central API key which has no sane default.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Default Ollama host for the local vision backend
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Default Ollama vision model
const DEFAULT_OLLAMA_MODEL: &str = "qwen3-vl:8b";

/// Official OpenAI endpoint. Deliberately not read from `OPENAI_BASE_URL`:
/// a proxy override there would silently change which service answers
/// vision requests.
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default hosted vision model
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Default FoodData Central base URL
const DEFAULT_FDC_BASE: &str = "https://api.nal.usda.gov/fdc";

/// Default guidance corpus directory
const DEFAULT_RAG_DOCS_DIR: &str = "rag_docs";

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Vision-language backend configuration
    pub vlm: VlmConfig,
    /// FoodData Central client configuration
    pub fdc: FdcConfig,
    /// Tip retrieval configuration
    pub rag: RagConfig,
}

/// Vision-language backend configuration
#[derive(Debug, Clone)]
pub struct VlmConfig {
    /// Ollama host URL
    pub ollama_host: String,
    /// Default Ollama model when the client does not pass one
    pub ollama_model: String,
    /// OpenAI API key; the hosted backend is unavailable without it
    pub openai_api_key: Option<String>,
    /// OpenAI endpoint base URL
    pub openai_base_url: String,
    /// Default hosted model when the client does not pass one
    pub openai_model: String,
    /// Per-request inference timeout in seconds
    pub timeout_s: u64,
    /// Connection timeout in seconds
    pub connect_timeout_s: u64,
}

/// FoodData Central client configuration
#[derive(Debug, Clone)]
pub struct FdcConfig {
    /// Service base URL
    pub base_url: String,
    /// API key (`USDA_FDC_API_KEY`); lookups fail without one
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_s: u64,
    /// Maximum retry attempts for retryable statuses
    pub retries: u32,
}

/// Tip retrieval configuration
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Directory of guidance documents (.md / .txt)
    pub corpus_dir: PathBuf,
    /// Number of distinct documents to retrieve per query
    pub top_k: usize,
    /// Timeout for the one-time index build in seconds
    pub build_timeout_s: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error when a numeric variable is set but unparseable.
    pub fn from_env() -> Result<Self> {
        let http_port = parse_env("HTTP_PORT", 8081)?;

        let vlm = VlmConfig {
            ollama_host: env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_owned()),
            ollama_model: env::var("OLLAMA_MODEL")
                .unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_owned()),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_owned(),
            openai_model: env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_owned()),
            timeout_s: parse_env("VLM_TIMEOUT_S", 120)?,
            connect_timeout_s: parse_env("VLM_CONNECT_TIMEOUT_S", 10)?,
        };

        let fdc = FdcConfig {
            base_url: env::var("FDC_BASE").unwrap_or_else(|_| DEFAULT_FDC_BASE.to_owned()),
            api_key: env::var("USDA_FDC_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout_s: parse_env("FDC_TIMEOUT_S", 20)?,
            retries: parse_env("FDC_RETRIES", 3)?,
        };

        let rag = RagConfig {
            corpus_dir: env::var("RAG_DOCS_DIR")
                .map_or_else(|_| PathBuf::from(DEFAULT_RAG_DOCS_DIR), PathBuf::from),
            top_k: parse_env("RAG_TOP_K", 3)?,
            build_timeout_s: parse_env("RAG_BUILD_TIMEOUT_S", 120)?,
        };

        Ok(Self {
            http_port,
            vlm,
            fdc,
            rag,
        })
    }

    /// One-line startup summary for the logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "port={} ollama={} ({}) openai_key={} fdc_key={} corpus={} top_k={}",
            self.http_port,
            self.vlm.ollama_host,
            self.vlm.ollama_model,
            if self.vlm.openai_api_key.is_some() {
                "present"
            } else {
                "absent"
            },
            if self.fdc.api_key.is_some() {
                "present"
            } else {
                "absent"
            },
            self.rag.corpus_dir.display(),
            self.rag.top_k,
        )
    }
}

/// Parse an environment variable with a fallback default
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}
