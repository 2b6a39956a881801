// ABOUTME: HTTP route handlers for the analysis API
// ABOUTME: Multipart upload handling, backend selection, JSON responses, error mapping
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # HTTP Routes
//!
//! Thin transport layer over the analysis pipeline:
//!
//! - `GET  /api/health` — liveness and collaborator configuration
//! - `POST /api/analyze` — full pipeline: multipart image + backend/model
//! - `POST /api/vlm_smoke` — vision inference only, no nutrient lookup
//! - `GET  /api/fdc_search?q=` — nutrient database search passthrough
//!
//! The handlers decode the upload, hand bytes to the pipeline, and
//! serialize the result; no analysis logic lives here. The end-to-end
//! timeout layer drops the request future on expiry, which cancels
//! in-flight stages cooperatively — no partial result is ever delivered.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult, ErrorCode, ErrorResponse};
use crate::fdc::{FdcClient, FoodDataClient as _, SearchResponse};
use crate::health::{HealthChecker, HealthResponse};
use crate::pipeline::AnalysisOrchestrator;
use crate::vlm::extract::sanitize_label;
use crate::vlm::{PreparedImage, VisionBackend, VisionProvider as _};

/// Largest accepted upload (images are re-encoded down anyway)
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// End-to-end request deadline
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Page size for the search passthrough endpoint
const SEARCH_PASSTHROUGH_PAGE_SIZE: u32 = 5;

/// Shared state for all handlers
pub struct AppState {
    /// Loaded configuration
    pub config: ServerConfig,
    /// Pipeline orchestrator
    pub orchestrator: AnalysisOrchestrator,
    /// Direct food-data client for the search passthrough
    pub food_data: Option<Arc<FdcClient>>,
    /// Health checker
    pub health: HealthChecker,
}

/// Build the application router with all middleware layers
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/vlm_smoke", post(vlm_smoke))
        .route("/api/fdc_search", get(fdc_search))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .with_state(state)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

/// Fields accepted by the multipart upload endpoints
struct UploadForm {
    image: Bytes,
    backend: String,
    model: Option<String>,
}

/// Pull the image and selector fields out of a multipart body
async fn read_upload(mut multipart: Multipart) -> AppResult<UploadForm> {
    let mut image: Option<Bytes> = None;
    let mut backend = "ollama".to_owned();
    let mut model: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid_input(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("image") => {
                image = Some(field.bytes().await.map_err(|e| {
                    AppError::invalid_input(format!("Failed to read image field: {e}"))
                })?);
            }
            Some("backend") => {
                backend = field.text().await.map_err(|e| {
                    AppError::invalid_input(format!("Failed to read backend field: {e}"))
                })?;
            }
            Some("model") => {
                model = Some(field.text().await.map_err(|e| {
                    AppError::invalid_input(format!("Failed to read model field: {e}"))
                })?)
                .filter(|m| !m.trim().is_empty());
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| {
        AppError::new(ErrorCode::MissingRequiredField, "image field is required")
    })?;

    Ok(UploadForm {
        image,
        backend,
        model,
    })
}

/// `GET /api/health`
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.health.check())
}

/// `POST /api/analyze` — the full pipeline
async fn analyze(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<Json<crate::models::AnalysisResult>> {
    let form = read_upload(multipart).await?;
    let image = PreparedImage::from_bytes(&form.image)?;
    let vision = VisionBackend::from_selector(&form.backend, &state.config.vlm)?;

    let result = state
        .orchestrator
        .analyze(&vision, &image, form.model.as_deref())
        .await?;
    Ok(Json(result))
}

/// Response for the inference-only smoke endpoint
#[derive(Debug, Serialize)]
struct VlmSmokeResponse {
    label: String,
    portion_g: f64,
    confidence: f64,
    raw_latency_s: f64,
    backend: String,
    requested_backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    requested_model: Option<String>,
}

/// `POST /api/vlm_smoke` — vision inference only, no nutrient lookup
async fn vlm_smoke(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<Json<VlmSmokeResponse>> {
    let form = read_upload(multipart).await?;
    let image = PreparedImage::from_bytes(&form.image)?;
    let vision = VisionBackend::from_selector(&form.backend, &state.config.vlm)?;

    let prediction = vision.predict(&image, form.model.as_deref()).await?;
    Ok(Json(VlmSmokeResponse {
        label: prediction.label,
        portion_g: prediction.portion_g,
        confidence: prediction.confidence,
        raw_latency_s: prediction.raw_latency_s,
        backend: vision.name().to_owned(),
        requested_backend: form.backend,
        requested_model: form.model,
    }))
}

/// Query parameters for the search passthrough
#[derive(Debug, Deserialize)]
struct FdcSearchParams {
    q: String,
}

/// `GET /api/fdc_search` — nutrient database search passthrough
async fn fdc_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FdcSearchParams>,
) -> AppResult<Json<SearchResponse>> {
    let Some(client) = &state.food_data else {
        return Err(AppError::new(
            ErrorCode::ConfigMissing,
            "USDA_FDC_API_KEY is not set; food search is unavailable",
        ));
    };

    let query = sanitize_label(&params.q);
    if query.is_empty() {
        return Err(AppError::invalid_input("q must contain searchable text"));
    }

    let response = client.search(&query, SEARCH_PASSTHROUGH_PAGE_SIZE).await?;
    Ok(Json(response))
}
