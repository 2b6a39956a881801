// ABOUTME: Pure portion scaling for nutrient profiles
// ABOUTME: Per-basis multiplication with rounding, absence preservation, and plausibility flagging
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Portion Scaler
//!
//! A pure numeric transform: each present nutrient field is multiplied by
//! `portion_g / basis_g`, where the basis is 100 g unless the matched record
//! declared a discrete gram serving. Absent fields stay absent. An
//! implausible portion (non-positive, or larger than any real meal) is not
//! scaled silently — the unscaled profile comes back flagged so the
//! orchestrator can mark the result, since a wild portion indicates an
//! upstream prediction failure rather than a valid nutrition case.

use crate::models::{NutrientProfile, PortionFlag, ServingBasis};

/// Upper bound on a believable single-meal portion, in grams
pub const MAX_PLAUSIBLE_PORTION_G: f64 = 5000.0;

/// Outcome of a scaling attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledProfile {
    /// Scaled profile, or the untouched input when flagged
    pub profile: NutrientProfile,
    /// Human-readable description of the basis actually applied
    pub serving_used: String,
    /// Set when the portion was implausible and scaling was skipped
    pub flag: Option<PortionFlag>,
}

/// Scale a per-basis profile to the predicted portion.
///
/// Pure: the input profile is never mutated; a new instance is returned.
/// Values are rounded to two decimals. Callers must not re-apply this to an
/// already-scaled profile — the orchestrator scales exactly once per request.
#[must_use]
pub fn scale(profile: &NutrientProfile, basis: ServingBasis, portion_g: f64) -> ScaledProfile {
    if !portion_g.is_finite() || portion_g <= 0.0 || portion_g > MAX_PLAUSIBLE_PORTION_G {
        return ScaledProfile {
            profile: profile.clone(),
            serving_used: format!("{basis} (unscaled)"),
            flag: Some(PortionFlag::Implausible),
        };
    }

    let basis_g = basis.grams();
    let factor = portion_g / basis_g;
    let scaled = NutrientProfile {
        calories_kcal: profile.calories_kcal.map(|v| round2(v * factor)),
        protein_g: profile.protein_g.map(|v| round2(v * factor)),
        fat_g: profile.fat_g.map(|v| round2(v * factor)),
        carb_g: profile.carb_g.map(|v| round2(v * factor)),
        fiber_g: profile.fiber_g.map(|v| round2(v * factor)),
        sodium_mg: profile.sodium_mg.map(|v| round2(v * factor)),
        sugars_g: profile.sugars_g.map(|v| round2(v * factor)),
    };

    ScaledProfile {
        profile: scaled,
        serving_used: format!("{portion_g:.0} g (scaled from {basis})"),
        flag: None,
    }
}

/// Round to two decimals
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
