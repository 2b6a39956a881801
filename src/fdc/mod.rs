// ABOUTME: FoodData Central client and wire types for nutrient lookups
// ABOUTME: Search + detail endpoints behind a trait seam with bounded retry
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # FoodData Central Integration
//!
//! Thin client for the USDA FoodData Central search and food-detail
//! endpoints, behind the [`FoodDataClient`] trait so the pipeline can be
//! exercised against fixtures. The service is treated as opaque: its own
//! ranking is not specified here, only consumed (see [`matcher`] for the
//! deterministic candidate selection applied on top).

pub mod matcher;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FdcConfig;
use crate::errors::{AppError, AppResult, ErrorCode};

/// Connection timeout for the FDC service
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Initial backoff between retry attempts
const INITIAL_BACKOFF_MS: u64 = 300;

/// Search response envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Candidate records; `None`/empty both mean zero candidates
    #[serde(default)]
    pub foods: Vec<FoodSearchItem>,
}

/// One candidate record from the search endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodSearchItem {
    /// Record identifier
    pub fdc_id: i64,
    /// Record description
    #[serde(default)]
    pub description: String,
    /// Data-type tag ("Foundation", "SR Legacy", "Survey (FNDDS)", "Branded", ...)
    #[serde(default)]
    pub data_type: Option<String>,
    /// The service's own relevance score
    #[serde(default)]
    pub score: Option<f64>,
}

/// Full food record from the detail endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodDetail {
    /// Record identifier
    #[serde(default)]
    pub fdc_id: i64,
    /// Record description
    #[serde(default)]
    pub description: String,
    /// Data-type tag
    #[serde(default)]
    pub data_type: Option<String>,
    /// Explicit serving size amount, when the record declares one
    #[serde(default)]
    pub serving_size: Option<f64>,
    /// Unit of the explicit serving size
    #[serde(default)]
    pub serving_size_unit: Option<String>,
    /// Portion descriptions with gram weights
    #[serde(default)]
    pub food_portions: Vec<FoodPortion>,
    /// Nutrient entries keyed by standard nutrient codes
    #[serde(default)]
    pub food_nutrients: Vec<FoodNutrientEntry>,
    /// Branded-food label nutrients (per serving)
    #[serde(default)]
    pub label_nutrients: Option<LabelNutrients>,
}

/// One portion description on a detail record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodPortion {
    /// Gram weight of this portion
    #[serde(default)]
    pub gram_weight: Option<f64>,
}

/// One nutrient entry on a detail record. Depending on the data type the
/// nutrient id lives either on a nested object or directly on the entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodNutrientEntry {
    /// Nested nutrient reference (Foundation / SR Legacy shape)
    #[serde(default)]
    pub nutrient: Option<NutrientRef>,
    /// Flat nutrient id (search / survey shape)
    #[serde(default)]
    pub nutrient_id: Option<i64>,
    /// Reported amount; absent means the record does not carry this nutrient
    #[serde(default)]
    pub amount: Option<f64>,
}

/// Nested nutrient reference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NutrientRef {
    /// Standard nutrient code
    #[serde(default)]
    pub id: Option<i64>,
}

/// Branded-food label nutrients; values are per declared serving
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelNutrients {
    /// Energy in kcal
    #[serde(default)]
    pub calories: Option<LabelNutrientValue>,
    /// Protein in grams
    #[serde(default)]
    pub protein: Option<LabelNutrientValue>,
    /// Fat in grams
    #[serde(default)]
    pub fat: Option<LabelNutrientValue>,
    /// Carbohydrates in grams
    #[serde(default)]
    pub carbohydrates: Option<LabelNutrientValue>,
    /// Fiber in grams
    #[serde(default)]
    pub fiber: Option<LabelNutrientValue>,
    /// Sugars in grams
    #[serde(default)]
    pub sugars: Option<LabelNutrientValue>,
    /// Sodium in milligrams
    #[serde(default)]
    pub sodium: Option<LabelNutrientValue>,
}

/// Wrapper object the label nutrients arrive in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelNutrientValue {
    /// Reported value
    #[serde(default)]
    pub value: Option<f64>,
}

/// Search body for the FDC search endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    query: &'a str,
    page_size: u32,
}

/// Food-composition data source contract.
///
/// The production implementation is [`FdcClient`]; tests inject fixture
/// implementations to exercise the matcher and orchestrator offline.
#[async_trait]
pub trait FoodDataClient: Send + Sync {
    /// Text search for candidate records
    async fn search(&self, query: &str, page_size: u32) -> AppResult<SearchResponse>;

    /// Fetch the full record for a candidate
    async fn food_detail(&self, fdc_id: i64) -> AppResult<FoodDetail>;
}

/// Thin wrapper around the USDA FDC search + detail endpoints
pub struct FdcClient {
    client: Client,
    base_url: String,
    api_key: String,
    retries: u32,
}

impl FdcClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ConfigMissing`] when no API key is configured,
    /// or an internal error if the HTTP client cannot be created.
    pub fn new(config: &FdcConfig) -> AppResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            AppError::new(ErrorCode::ConfigMissing, "USDA_FDC_API_KEY is not set")
        })?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            retries: config.retries,
        })
    }

    /// Whether a status is worth retrying (throttling and transient 5xx)
    const fn is_retryable(status: StatusCode) -> bool {
        matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
    }

    /// Send a prepared request, retrying retryable statuses with backoff.
    ///
    /// The request builder is cloned per attempt; bodies here are small
    /// JSON payloads so the clone always succeeds.
    async fn send_with_retry(&self, request: reqwest::RequestBuilder) -> AppResult<String> {
        let mut attempt: u32 = 0;
        loop {
            let Some(cloned) = request.try_clone() else {
                return Err(AppError::internal("FDC request not cloneable"));
            };

            let result = cloned.send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(|e| {
                            AppError::external_service(
                                "FDC",
                                format!("Failed to read response: {e}"),
                            )
                        });
                    }
                    if !Self::is_retryable(status) || attempt >= self.retries {
                        let body = response.text().await.unwrap_or_default();
                        return Err(AppError::external_service(
                            "FDC",
                            format!(
                                "{status}: {}",
                                body.chars().take(200).collect::<String>()
                            ),
                        ));
                    }
                    warn!("FDC returned {status}, retrying (attempt {attempt})");
                }
                Err(e) => {
                    if attempt >= self.retries {
                        return Err(AppError::external_service(
                            "FDC",
                            format!("Request failed after {attempt} retries: {e}"),
                        ));
                    }
                    warn!("FDC request error, retrying (attempt {attempt}): {e}");
                }
            }

            attempt += 1;
            let backoff = INITIAL_BACKOFF_MS * 2_u64.saturating_pow(attempt - 1);
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
    }
}

#[async_trait]
impl FoodDataClient for FdcClient {
    async fn search(&self, query: &str, page_size: u32) -> AppResult<SearchResponse> {
        debug!("FDC search: {query:?} (page_size={page_size})");
        let request = self
            .client
            .post(format!("{}/v1/foods/search", self.base_url))
            .query(&[("api_key", self.api_key.as_str())])
            .json(&SearchBody { query, page_size });

        let body = self.send_with_retry(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            AppError::external_service("FDC", format!("Unparseable search response: {e}"))
        })
    }

    async fn food_detail(&self, fdc_id: i64) -> AppResult<FoodDetail> {
        debug!("FDC detail: {fdc_id}");
        let request = self
            .client
            .get(format!("{}/v1/food/{fdc_id}", self.base_url))
            .query(&[("api_key", self.api_key.as_str())]);

        let body = self.send_with_retry(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            AppError::external_service("FDC", format!("Unparseable detail response: {e}"))
        })
    }
}
