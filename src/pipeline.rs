// ABOUTME: Analysis orchestrator sequencing prediction, matching, scaling, retrieval, synthesis
// ABOUTME: Explicit per-stage state machine with typed fatal/non-fatal fallback policy
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Analysis Orchestrator
//!
//! Sequences the pipeline stages for one request:
//!
//! ```text
//! Predicting -> Matching -> Scaling -> Retrieving -> Synthesizing -> Done
//!      \____________\___________\___________\____________\--> Failed
//! ```
//!
//! Transition policy:
//!
//! - **Predicting** failure is fatal: no nutrient data exists without a
//!   prediction, so the request terminates with a typed error and no
//!   downstream stage runs.
//! - **Matching** yielding nothing (zero candidates, or a food-data outage)
//!   is non-fatal: the pipeline continues with an absent match and an
//!   all-absent profile, and the result says so explicitly.
//! - **Scaling** never fails; an implausible portion skips the arithmetic
//!   and flags the result instead.
//! - **Retrieving** failure is non-fatal and degrades to an empty retrieved
//!   set — except a first-request index build failure, which is fatal and
//!   must not be swallowed (it means the guidance corpus is broken).
//! - Every stage's wall-clock duration is recorded regardless of outcome.
//!
//! Stages run to completion sequentially; cancellation is cooperative — when
//! the caller drops the request future, in-flight stages are cancelled and
//! no partial result is delivered. The orchestrator exclusively owns the
//! in-flight result during assembly.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::errors::{AppResult, ErrorCode};
use crate::fdc::matcher::match_food;
use crate::fdc::FoodDataClient;
use crate::models::{AnalysisResult, NutrientProfile, ServingBasis, Stage, StageTimings};
use crate::nutrition::scale;
use crate::rag::{build_query, TipRetriever};
use crate::tips::synthesize;
use crate::vlm::{PreparedImage, VisionProvider};

/// Orchestrates the analysis pipeline over injected collaborators.
///
/// Depends only on the [`VisionProvider`] and [`FoodDataClient`] interfaces
/// and the retriever front-end, never on concrete provider types.
pub struct AnalysisOrchestrator {
    food_data: Option<Arc<dyn FoodDataClient>>,
    retriever: Arc<TipRetriever>,
}

impl AnalysisOrchestrator {
    /// Create an orchestrator.
    ///
    /// `food_data` is optional: a deployment without database credentials
    /// still serves predictions and heuristic guidance, with every result
    /// marked unmatched.
    #[must_use]
    pub fn new(food_data: Option<Arc<dyn FoodDataClient>>, retriever: Arc<TipRetriever>) -> Self {
        Self {
            food_data,
            retriever,
        }
    }

    /// Run the full pipeline for one prepared image.
    ///
    /// # Errors
    ///
    /// Returns an error only for the fatal paths: inference failure
    /// ([`ErrorCode::InferenceFailed`]) and first-request index build
    /// failure ([`ErrorCode::IndexBuildFailed`]). All other degradations
    /// are absorbed and marked on the result.
    pub async fn analyze(
        &self,
        vision: &dyn VisionProvider,
        image: &PreparedImage,
        model: Option<&str>,
    ) -> AppResult<AnalysisResult> {
        let mut timings = StageTimings::new();

        // Predicting: fatal on failure, nothing downstream is invoked
        let started = Instant::now();
        let prediction = match vision.predict(image, model).await {
            Ok(prediction) => {
                record(&mut timings, Stage::Predicting, started);
                prediction
            }
            Err(e) => {
                record(&mut timings, Stage::Predicting, started);
                warn!("prediction failed after {:.3}s: {e}", elapsed(started));
                return Err(e);
            }
        };
        debug!(
            "predicted {:?} ({:.0} g, confidence {:.2})",
            prediction.label, prediction.portion_g, prediction.confidence
        );

        // Matching: absence and outages are both non-fatal
        let started = Instant::now();
        let matched = match &self.food_data {
            Some(client) => match match_food(client.as_ref(), &prediction.label).await {
                Ok(matched) => matched,
                Err(e) => {
                    warn!("food data lookup degraded to no-match: {e}");
                    None
                }
            },
            None => {
                debug!("no food data client configured; skipping match");
                None
            }
        };
        record(&mut timings, Stage::Matching, started);

        // Scaling: pure, applied exactly once per request
        let started = Instant::now();
        let (fdc_match, unscaled) = match matched {
            Some((m, profile)) => (Some(m), profile),
            None => (None, NutrientProfile::default()),
        };
        let basis = fdc_match
            .as_ref()
            .map_or(ServingBasis::PerHundredGrams, |m| m.basis);
        let scaled = scale(&unscaled, basis, prediction.portion_g);
        record(&mut timings, Stage::Scaling, started);

        // Retrieving: degrades to empty, except a fatal first-build failure
        let started = Instant::now();
        let query = build_query(&prediction.label, &scaled.profile);
        let (retrieved, retrieval_degraded) = match self
            .retriever
            .retrieve(&query, self.retriever.top_k())
            .await
        {
            Ok(retrieved) => (retrieved, false),
            Err(e) if e.code == ErrorCode::IndexBuildFailed => {
                record(&mut timings, Stage::Retrieving, started);
                warn!("index build failed; aborting request: {e}");
                return Err(e);
            }
            Err(e) => {
                warn!("retrieval degraded to empty set: {e}");
                (Vec::new(), true)
            }
        };
        record(&mut timings, Stage::Retrieving, started);

        // Synthesizing: pure fusion of heuristics and retrieved snippets
        let started = Instant::now();
        let tips = synthesize(&scaled.profile, retrieved);
        record(&mut timings, Stage::Synthesizing, started);

        // Done: assemble the result exactly once
        let matched = fdc_match.is_some();
        let serving_used = matched.then(|| scaled.serving_used.clone());
        let result = AnalysisResult {
            label: prediction.label,
            portion_g: prediction.portion_g,
            confidence: prediction.confidence,
            matched,
            fdc_match,
            nutrition: scaled.profile,
            serving_used,
            portion_flag: scaled.flag,
            tips,
            retrieval_degraded,
            timings_s: timings,
            backend: vision.name().to_owned(),
            model: model.map(ToOwned::to_owned),
        };
        info!(
            "analysis done: label={:?} matched={} tips={} degraded={}",
            result.label,
            result.matched,
            result.tips.len(),
            result.retrieval_degraded
        );
        Ok(result)
    }
}

/// Record a stage duration
fn record(timings: &mut StageTimings, stage: Stage, started: Instant) {
    timings.insert(stage.as_str().to_owned(), round3(elapsed(started)));
}

fn elapsed(started: Instant) -> f64 {
    started.elapsed().as_secs_f64()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
