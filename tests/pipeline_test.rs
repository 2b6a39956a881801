// ABOUTME: Integration tests for the analysis orchestrator
// ABOUTME: Exercises fatal and non-fatal pipeline paths with injected fakes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use mealscope::config::RagConfig;
use mealscope::errors::{AppError, AppResult, ErrorCode};
use mealscope::fdc::{FoodDataClient, FoodDetail, FoodNutrientEntry, FoodSearchItem, NutrientRef, SearchResponse};
use mealscope::models::{DishPrediction, PortionFlag, TipSource};
use mealscope::pipeline::AnalysisOrchestrator;
use mealscope::rag::{HashEmbedder, TextEmbedder, TipRetriever};
use mealscope::vlm::{PreparedImage, VisionProvider};

/// Vision fake: a canned prediction, or a canned failure
struct FakeVision {
    prediction: Option<DishPrediction>,
}

impl FakeVision {
    fn predicting(label: &str, portion_g: f64, confidence: f64) -> Self {
        Self {
            prediction: Some(DishPrediction {
                label: label.to_owned(),
                portion_g,
                confidence,
                raw_latency_s: 0.01,
            }),
        }
    }

    fn failing() -> Self {
        Self { prediction: None }
    }
}

#[async_trait]
impl VisionProvider for FakeVision {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }

    async fn predict(
        &self,
        _image: &PreparedImage,
        _model: Option<&str>,
    ) -> AppResult<DishPrediction> {
        self.prediction
            .clone()
            .ok_or_else(|| AppError::inference("backend unreachable"))
    }
}

/// Food-data fake serving fixtures, recording whether it was called
struct FixtureFoodData {
    search: SearchResponse,
    detail: FoodDetail,
    called: AtomicBool,
}

impl FixtureFoodData {
    fn burger() -> Self {
        Self {
            search: SearchResponse {
                foods: vec![FoodSearchItem {
                    fdc_id: 1001,
                    description: "Burger and fries".to_owned(),
                    data_type: Some("Survey (FNDDS)".to_owned()),
                    score: Some(700.0),
                }],
            },
            detail: FoodDetail {
                fdc_id: 1001,
                description: "Burger and fries".to_owned(),
                data_type: Some("Survey (FNDDS)".to_owned()),
                food_nutrients: vec![
                    nutrient(1008, 280.0),
                    nutrient(1093, 500.0),
                ],
                ..FoodDetail::default()
            },
            called: AtomicBool::new(false),
        }
    }

    fn empty() -> Self {
        Self {
            search: SearchResponse::default(),
            detail: FoodDetail::default(),
            called: AtomicBool::new(false),
        }
    }

    fn was_called(&self) -> bool {
        self.called.load(Ordering::SeqCst)
    }
}

fn nutrient(id: i64, amount: f64) -> FoodNutrientEntry {
    FoodNutrientEntry {
        nutrient: Some(NutrientRef { id: Some(id) }),
        nutrient_id: None,
        amount: Some(amount),
    }
}

#[async_trait]
impl FoodDataClient for FixtureFoodData {
    async fn search(&self, _query: &str, _page_size: u32) -> AppResult<SearchResponse> {
        self.called.store(true, Ordering::SeqCst);
        Ok(self.search.clone())
    }

    async fn food_detail(&self, _fdc_id: i64) -> AppResult<FoodDetail> {
        Ok(self.detail.clone())
    }
}

/// Embedder that works for batch (index build) but fails single-text
/// (query) embeds, to model a post-build transient retrieval failure
struct FlakyQueryEmbedder;

impl TextEmbedder for FlakyQueryEmbedder {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.len() == 1 {
            return Err(AppError::retrieval_unavailable("transient embed failure"));
        }
        HashEmbedder.embed_batch(texts)
    }
}

/// Corpus with a couple of guidance docs
fn seeded_corpus() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("sodium.md"),
        "Ask for sauce on the side to cut sodium.",
    )
    .unwrap();
    fs::write(
        dir.path().join("fiber.md"),
        "Add beans or greens for extra fiber.",
    )
    .unwrap();
    dir
}

fn retriever_over(dir: &std::path::Path, embedder: Arc<dyn TextEmbedder>) -> Arc<TipRetriever> {
    let config = RagConfig {
        corpus_dir: dir.to_path_buf(),
        top_k: 3,
        build_timeout_s: 30,
    };
    Arc::new(TipRetriever::new(embedder, &config))
}

fn test_image() -> PreparedImage {
    PreparedImage::from_bytes(&image_bytes()).unwrap()
}

fn image_bytes() -> Vec<u8> {
    // Minimal 1x1 PNG generated via the image crate
    let img = image::RgbImage::from_pixel(1, 1, image::Rgb([200, 100, 50]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

#[tokio::test]
async fn test_burger_end_to_end_scales_and_flags_sodium() {
    let corpus = seeded_corpus();
    let food_data = Arc::new(FixtureFoodData::burger());
    let orchestrator = AnalysisOrchestrator::new(
        Some(Arc::clone(&food_data) as Arc<dyn FoodDataClient>),
        retriever_over(corpus.path(), Arc::new(HashEmbedder)),
    );

    let vision = FakeVision::predicting("burger_and_fries", 450.0, 0.82);
    let result = orchestrator
        .analyze(&vision, &test_image(), None)
        .await
        .unwrap();

    assert_eq!(result.label, "burger_and_fries");
    assert!(result.matched);
    assert_eq!(result.fdc_match.as_ref().unwrap().fdc_id, 1001);

    // 280 kcal and 500 mg per 100 g at a 450 g portion
    assert_eq!(result.nutrition.calories_kcal, Some(1260.0));
    assert_eq!(result.nutrition.sodium_mg, Some(2250.0));
    // Absent in the source record stays absent after scaling
    assert_eq!(result.nutrition.protein_g, None);

    // Sodium heuristic fires and leads the tip list
    assert_eq!(result.tips[0].source, TipSource::Heuristic);
    assert!(result.tips[0].text.starts_with("High sodium"));

    // Every stage landed in the timing map
    for stage in ["vlm", "fdc", "scale", "retrieve", "synthesize"] {
        assert!(result.timings_s.contains_key(stage), "missing {stage}");
    }

    assert!(!result.retrieval_degraded);
    assert!(result.portion_flag.is_none());
}

#[tokio::test]
async fn test_inference_failure_is_fatal_and_skips_downstream() {
    let corpus = seeded_corpus();
    let food_data = Arc::new(FixtureFoodData::burger());
    let orchestrator = AnalysisOrchestrator::new(
        Some(Arc::clone(&food_data) as Arc<dyn FoodDataClient>),
        retriever_over(corpus.path(), Arc::new(HashEmbedder)),
    );

    let err = orchestrator
        .analyze(&FakeVision::failing(), &test_image(), None)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::InferenceFailed);
    assert!(!food_data.was_called(), "matcher must not run after fatal prediction");
}

#[tokio::test]
async fn test_no_match_still_reaches_done_with_tips() {
    let corpus = seeded_corpus();
    let food_data = Arc::new(FixtureFoodData::empty());
    let orchestrator = AnalysisOrchestrator::new(
        Some(food_data as Arc<dyn FoodDataClient>),
        retriever_over(corpus.path(), Arc::new(HashEmbedder)),
    );

    let vision = FakeVision::predicting("void_stew", 300.0, 0.5);
    let result = orchestrator
        .analyze(&vision, &test_image(), None)
        .await
        .unwrap();

    assert!(!result.matched);
    assert!(result.fdc_match.is_none());
    assert!(result.nutrition.is_empty());
    // Heuristics fire nothing on an all-absent profile, but retrieval
    // still populates the tip list
    assert!(!result.tips.is_empty());
    assert!(result.tips.iter().all(|t| t.source == TipSource::Retrieved));
}

#[tokio::test]
async fn test_implausible_portion_is_flagged_and_unscaled() {
    let corpus = seeded_corpus();
    let food_data = Arc::new(FixtureFoodData::burger());
    let orchestrator = AnalysisOrchestrator::new(
        Some(food_data as Arc<dyn FoodDataClient>),
        retriever_over(corpus.path(), Arc::new(HashEmbedder)),
    );

    let vision = FakeVision::predicting("burger_and_fries", 9000.0, 0.6);
    let result = orchestrator
        .analyze(&vision, &test_image(), None)
        .await
        .unwrap();

    assert_eq!(result.portion_flag, Some(PortionFlag::Implausible));
    // Unscaled per-100g values come back untouched
    assert_eq!(result.nutrition.calories_kcal, Some(280.0));
    assert_eq!(result.nutrition.sodium_mg, Some(500.0));
}

#[tokio::test]
async fn test_transient_retrieval_failure_degrades_to_heuristics() {
    let corpus = seeded_corpus();
    let food_data = Arc::new(FixtureFoodData::burger());
    let orchestrator = AnalysisOrchestrator::new(
        Some(food_data as Arc<dyn FoodDataClient>),
        retriever_over(corpus.path(), Arc::new(FlakyQueryEmbedder)),
    );

    let vision = FakeVision::predicting("burger_and_fries", 450.0, 0.82);
    let result = orchestrator
        .analyze(&vision, &test_image(), None)
        .await
        .unwrap();

    assert!(result.retrieval_degraded);
    assert!(!result.tips.is_empty());
    assert!(result.tips.iter().all(|t| t.source == TipSource::Heuristic));
}

#[tokio::test]
async fn test_index_build_failure_is_fatal() {
    let empty_corpus = tempfile::tempdir().unwrap();
    let food_data = Arc::new(FixtureFoodData::burger());
    let orchestrator = AnalysisOrchestrator::new(
        Some(food_data as Arc<dyn FoodDataClient>),
        retriever_over(empty_corpus.path(), Arc::new(HashEmbedder)),
    );

    let vision = FakeVision::predicting("burger_and_fries", 450.0, 0.82);
    let err = orchestrator
        .analyze(&vision, &test_image(), None)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::IndexBuildFailed);
}

#[tokio::test]
async fn test_missing_food_data_client_marks_unmatched() {
    let corpus = seeded_corpus();
    let orchestrator =
        AnalysisOrchestrator::new(None, retriever_over(corpus.path(), Arc::new(HashEmbedder)));

    let vision = FakeVision::predicting("toast", 80.0, 0.9);
    let result = orchestrator
        .analyze(&vision, &test_image(), None)
        .await
        .unwrap();

    assert!(!result.matched);
    assert!(result.nutrition.is_empty());
    assert!(result.serving_used.is_none());
}
