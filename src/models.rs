// ABOUTME: Core data models for the food-photo analysis pipeline
// ABOUTME: Defines DishPrediction, NutrientProfile, FdcMatch, TipCandidate and AnalysisResult
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Data Models
//!
//! Core data structures flowing through the analysis pipeline.
//!
//! ## Design Principles
//!
//! - **Absent is not zero**: every nutrient field is an `Option<f64>`; a
//!   record that lacks a nutrient stays `None` and is never defaulted to `0.0`
//! - **Immutable after production**: each stage produces a new value; the
//!   unscaled profile is never mutated by scaling
//! - **Serializable**: all models serialize to JSON for the HTTP surface,
//!   with absent fields omitted entirely

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// Output of the vision-language adapter for a single image.
///
/// Produced once per request and immutable afterward. A prediction with
/// `confidence == 0.0` and the sentinel label is the parse-failure fallback,
/// not an error; callers decide whether it is usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DishPrediction {
    /// Short categorical dish label (e.g. `"burger_and_fries"`)
    pub label: String,
    /// Predicted portion mass in grams
    pub portion_g: f64,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    /// Wall-clock latency of the provider call, in seconds
    pub raw_latency_s: f64,
}

/// Sentinel label used when a provider response cannot be parsed at all.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Macro-nutrient profile, either per-100g (unscaled) or portion-scaled.
///
/// All fields are optional: `None` means the source record did not report the
/// nutrient. Scaling preserves absence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutrientProfile {
    /// Energy in kcal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories_kcal: Option<f64>,
    /// Protein in grams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_g: Option<f64>,
    /// Fat in grams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat_g: Option<f64>,
    /// Carbohydrates in grams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carb_g: Option<f64>,
    /// Dietary fiber in grams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_g: Option<f64>,
    /// Sodium in milligrams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sodium_mg: Option<f64>,
    /// Total sugars in grams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sugars_g: Option<f64>,
}

impl NutrientProfile {
    /// True when no nutrient field is present at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.calories_kcal.is_none()
            && self.protein_g.is_none()
            && self.fat_g.is_none()
            && self.carb_g.is_none()
            && self.fiber_g.is_none()
            && self.sodium_mg.is_none()
            && self.sugars_g.is_none()
    }
}

/// The quantity basis a nutrient profile is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServingBasis {
    /// Standard per-100g reference quantity
    PerHundredGrams,
    /// A discrete serving with a known gram weight
    Serving {
        /// Gram weight of one serving
        grams: f64,
    },
}

impl ServingBasis {
    /// Gram weight this basis represents
    #[must_use]
    pub const fn grams(&self) -> f64 {
        match self {
            Self::PerHundredGrams => 100.0,
            Self::Serving { grams } => *grams,
        }
    }
}

impl Display for ServingBasis {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::PerHundredGrams => write!(f, "100 g"),
            Self::Serving { grams } => write!(f, "{grams:.0} g serving"),
        }
    }
}

/// The chosen food-composition database record for a request.
///
/// Exactly one match is selected per request, or none; never multiple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FdcMatch {
    /// FoodData Central record identifier
    pub fdc_id: i64,
    /// Record description as returned by the service
    pub description: String,
    /// Record data type (e.g. "SR Legacy", "Branded")
    pub data_type: String,
    /// Quantity basis the extracted profile is expressed against
    pub basis: ServingBasis,
}

/// Where a tip came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipSource {
    /// Produced by a fixed threshold rule
    Heuristic,
    /// Retrieved from the guidance corpus by embedding similarity
    Retrieved,
}

/// One guidance tip, heuristic or retrieved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipCandidate {
    /// Tip text
    pub text: String,
    /// Origin of the tip
    pub source: TipSource,
    /// Cosine similarity score for retrieved tips; `None` for heuristic tips
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl TipCandidate {
    /// Create a heuristic tip
    #[must_use]
    pub fn heuristic(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: TipSource::Heuristic,
            score: None,
        }
    }

    /// Create a retrieved tip with its similarity score
    #[must_use]
    pub fn retrieved(text: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            source: TipSource::Retrieved,
            score: Some(score),
        }
    }
}

/// Pipeline stage names, used as keys in the per-stage timing map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Vision-language inference
    Predicting,
    /// Nutrient database lookup
    Matching,
    /// Portion scaling
    Scaling,
    /// Tip retrieval
    Retrieving,
    /// Tip synthesis
    Synthesizing,
}

impl Stage {
    /// Stable string key for the timing map
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Predicting => "vlm",
            Self::Matching => "fdc",
            Self::Scaling => "scale",
            Self::Retrieving => "retrieve",
            Self::Synthesizing => "synthesize",
        }
    }
}

/// Per-stage wall-clock durations in seconds, recorded for every stage that
/// ran, regardless of success or fallback.
pub type StageTimings = BTreeMap<String, f64>;

/// Flag raised when the predicted portion is outside the plausible range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortionFlag {
    /// Portion was non-positive or unreasonably large; scaling was skipped
    Implausible,
}

/// The sole externally visible artifact of a successful (possibly degraded)
/// analysis. Assembled once by the orchestrator and never mutated afterward.
///
/// Degradations are explicit: "no database match" (`matched == false`,
/// `fdc_match == None`, all-absent `nutrition`) is distinguishable from
/// "matched but the record reported nothing" (`matched == true`, per-field
/// `None`s), and a skipped scaling step is marked by `portion_flag`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Predicted dish label
    pub label: String,
    /// Predicted portion in grams
    pub portion_g: f64,
    /// Prediction confidence in [0, 1]
    pub confidence: f64,
    /// Whether a nutrient database record was matched
    pub matched: bool,
    /// The chosen database record, when one was matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fdc_match: Option<FdcMatch>,
    /// Portion-scaled nutrient profile (unscaled when `portion_flag` is set)
    pub nutrition: NutrientProfile,
    /// Human-readable description of the serving basis actually used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving_used: Option<String>,
    /// Set when the predicted portion was implausible and scaling was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portion_flag: Option<PortionFlag>,
    /// Ordered tips: heuristic first, then deduplicated retrieved tips
    pub tips: Vec<TipCandidate>,
    /// True when tip retrieval failed and only heuristic tips are present
    pub retrieval_degraded: bool,
    /// Wall-clock seconds per pipeline stage
    pub timings_s: StageTimings,
    /// Backend that served the prediction (e.g. "ollama", "openai")
    pub backend: String,
    /// Model identifier that served the prediction, when requested explicitly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}
