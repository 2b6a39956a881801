// ABOUTME: Hosted OpenAI vision provider using chat completions with image input
// ABOUTME: Forces JSON-object output and normalizes the answer into DishPrediction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # `OpenAI` Provider
//!
//! Hosted-API vision inference through the `OpenAI` chat completions
//! endpoint. The image travels as a data-URL content part and
//! `response_format: json_object` nudges the model toward the strict-JSON
//! schema; the shared extractor still handles anything that comes back.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::extract::extract_prediction;
use super::{PreparedImage, VisionProvider, CLASSIFY_PROMPT};
use crate::config::VlmConfig;
use crate::errors::{AppError, AppResult};
use crate::models::DishPrediction;

/// Sampling temperature; low because we want a label, not prose
const TEMPERATURE: f64 = 0.2;

/// Request body for the chat completions API
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// Response body for the chat completions API
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

/// Error body shape for non-success statuses
#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

/// Hosted `OpenAI` vision provider
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl OpenAiProvider {
    /// Create a provider from the VLM configuration
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ErrorCode::ConfigMissing`] when no API key
    /// is configured, or an internal error if the HTTP client cannot be
    /// created.
    pub fn new(config: &VlmConfig) -> AppResult<Self> {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            AppError::new(
                crate::errors::ErrorCode::ConfigMissing,
                "OPENAI_API_KEY is not set; the openai backend is unavailable",
            )
        })?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_s))
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.openai_base_url.trim_end_matches('/').to_owned(),
            api_key,
            default_model: config.openai_model.clone(),
        })
    }

    /// Map a non-success status to an inference error with the service detail
    fn error_from_body(status: reqwest::StatusCode, body: &str) -> AppError {
        let detail = serde_json::from_str::<OpenAiErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());
        AppError::inference(format!("OpenAI returned {status}: {detail}"))
    }
}

#[async_trait]
impl VisionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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
        let request = OpenAiRequest {
            model: model.to_owned(),
            messages: vec![json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": CLASSIFY_PROMPT },
                    { "type": "image_url", "image_url": { "url": image.to_data_url() } },
                ],
            })],
            temperature: TEMPERATURE,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("OpenAI request failed: {e}");
                if e.is_timeout() {
                    AppError::inference(format!("OpenAI request timed out ({model})"))
                } else {
                    AppError::inference(format!("OpenAI request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::inference(format!("Failed to read OpenAI response: {e}")))?;

        if !status.is_success() {
            return Err(Self::error_from_body(status, &body));
        }

        let parsed: OpenAiResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::inference(format!("Unparseable OpenAI response: {e}")))?;
        let latency = started.elapsed().as_secs_f64();

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(
            "OpenAI answered in {latency:.3}s with {} chars",
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
