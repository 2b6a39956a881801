// ABOUTME: Local Ollama vision provider using the native chat API
// ABOUTME: Sends base64-attached images and normalizes free-text answers into DishPrediction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Ollama Provider
//!
//! Local-runtime vision inference through Ollama's native `/api/chat`
//! endpoint. The image travels as a base64 attachment on the user message;
//! `keep_alive` keeps the weights resident between requests so repeated
//! analyses do not pay the model-load cost.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::extract::extract_prediction;
use super::{PreparedImage, VisionProvider, CLASSIFY_PROMPT};
use crate::config::VlmConfig;
use crate::errors::{AppError, AppResult};
use crate::models::DishPrediction;

/// Sampling temperature; low because we want a label, not prose
const TEMPERATURE: f64 = 0.2;

/// Context window; the prompt is tiny and a small context is cheaper
const NUM_CTX: u32 = 512;

/// How long Ollama keeps the model loaded after a request
const KEEP_ALIVE: &str = "30m";

/// Request body for the native Ollama chat API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
    keep_alive: &'static str,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: &'static str,
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_ctx: u32,
}

/// Response body for the native Ollama chat API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Option<OllamaResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

/// Local Ollama vision provider
pub struct OllamaProvider {
    client: Client,
    host: String,
    default_model: String,
}

impl OllamaProvider {
    /// Create a provider from the VLM configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &VlmConfig) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_s))
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            host: config.ollama_host.trim_end_matches('/').to_owned(),
            default_model: config.ollama_model.clone(),
        })
    }
}

#[async_trait]
impl VisionProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn predict(
        &self,
        image: &PreparedImage,
        model: Option<&str>,
    ) -> AppResult<DishPrediction> {
        let model = model.unwrap_or(&self.default_model);
        let request = OllamaRequest {
            model: model.to_owned(),
            messages: vec![OllamaMessage {
                role: "user",
                content: CLASSIFY_PROMPT,
                images: vec![image.to_base64()],
            }],
            stream: false,
            options: OllamaOptions {
                temperature: TEMPERATURE,
                num_ctx: NUM_CTX,
            },
            keep_alive: KEEP_ALIVE,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Ollama request failed: {e}");
                if e.is_connect() {
                    AppError::inference(format!(
                        "Cannot connect to Ollama. Is the server running at {}?",
                        self.host
                    ))
                } else if e.is_timeout() {
                    AppError::inference(format!("Ollama request timed out ({model})"))
                } else {
                    AppError::inference(format!("Ollama request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::inference(format!("Failed to read Ollama response: {e}")))?;

        if !status.is_success() {
            return Err(AppError::inference(format!(
                "Ollama returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: OllamaResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::inference(format!("Unparseable Ollama response: {e}")))?;
        let latency = started.elapsed().as_secs_f64();

        let content = parsed.message.map(|m| m.content).unwrap_or_default();
        debug!(
            "Ollama answered in {latency:.3}s with {} chars",
            content.len()
        );

        let extracted = extract_prediction(&content);
        Ok(DishPrediction {
            label: extracted.label,
            portion_g: extracted.portion_g,
            confidence: extracted.confidence,
            raw_latency_s: latency,
        })
    }
}
