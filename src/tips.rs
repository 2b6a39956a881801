// ABOUTME: Heuristic guidance rules and tip synthesis
// ABOUTME: Fixed nutrient thresholds, ordered rule evaluation, retrieved-tip dedup
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Tip Synthesizer
//!
//! Deterministic guidance: a fixed threshold table evaluated against the
//! scaled nutrient profile, fused with snippets retrieved from the guidance
//! corpus. Heuristic tips come first in rule-declaration order; retrieved
//! tips follow, minus any whose normalized text duplicates a tip already
//! present. Absent nutrient fields never fire a rule — "unknown" is not
//! "zero". No side effects anywhere in this module.

use crate::models::{NutrientProfile, TipCandidate};

/// Sodium above this many milligrams reads as a high-sodium meal
pub const SODIUM_HIGH_MG: f64 = 700.0;
/// Fiber below this many grams reads as a low-fiber meal
pub const FIBER_LOW_G: f64 = 5.0;
/// Protein below this many grams reads as a low-protein meal
pub const PROTEIN_LOW_G: f64 = 15.0;
/// Sugars above this many grams reads as a sugary meal
pub const SUGARS_HIGH_G: f64 = 20.0;

/// At most this many heuristic tips per result
const MAX_HEURISTIC_TIPS: usize = 3;

/// Evaluate the fixed threshold rules against a profile.
///
/// Rules fire independently; output order is rule-declaration order. A
/// profile with at least one present field that fires nothing earns a
/// "balanced" tip. An all-absent profile yields no tips at all.
#[must_use]
pub fn heuristic_tips(profile: &NutrientProfile) -> Vec<TipCandidate> {
    let mut tips = Vec::new();

    if profile.sodium_mg.is_some_and(|v| v > SODIUM_HIGH_MG) {
        tips.push(TipCandidate::heuristic(
            "High sodium: try low-sodium dressing or sauce.",
        ));
    }
    if profile.fiber_g.is_some_and(|v| v < FIBER_LOW_G) {
        tips.push(TipCandidate::heuristic(
            "Low fiber: add greens, beans, or whole grains.",
        ));
    }
    if profile.protein_g.is_some_and(|v| v < PROTEIN_LOW_G) {
        tips.push(TipCandidate::heuristic(
            "Boost protein with chicken, tofu, eggs, or legumes.",
        ));
    }
    if profile.sugars_g.is_some_and(|v| v > SUGARS_HIGH_G) {
        tips.push(TipCandidate::heuristic(
            "Sugary: keep dressing on the side or skip sweet drinks.",
        ));
    }

    if tips.is_empty() && !profile.is_empty() {
        tips.push(TipCandidate::heuristic(
            "Nice balance! Pair with water and extra veggies if you like.",
        ));
    }

    tips.truncate(MAX_HEURISTIC_TIPS);
    tips
}

/// Notable-nutrient flags for the retrieval query, derived from the same
/// thresholds as the heuristic rules so retrieval stays deterministic for a
/// given profile.
#[must_use]
pub fn nutrient_flags(profile: &NutrientProfile) -> Vec<&'static str> {
    let mut flags = Vec::new();
    if profile.sodium_mg.is_some_and(|v| v > SODIUM_HIGH_MG) {
        flags.push("high sodium");
    }
    if profile.fiber_g.is_some_and(|v| v < FIBER_LOW_G) {
        flags.push("low fiber");
    }
    if profile.protein_g.is_some_and(|v| v < PROTEIN_LOW_G) {
        flags.push("low protein");
    }
    if profile.sugars_g.is_some_and(|v| v > SUGARS_HIGH_G) {
        flags.push("high sugar");
    }
    flags
}

/// Fuse heuristic and retrieved tips into the final ordered list.
///
/// Heuristic tips are prepended; retrieved tips follow with duplicates (by
/// normalized text, including duplicates among themselves) dropped.
#[must_use]
pub fn synthesize(profile: &NutrientProfile, retrieved: Vec<TipCandidate>) -> Vec<TipCandidate> {
    let mut tips = heuristic_tips(profile);
    let mut seen: Vec<String> = tips.iter().map(|t| normalize_tip(&t.text)).collect();

    for candidate in retrieved {
        let normalized = normalize_tip(&candidate.text);
        if normalized.is_empty() || seen.contains(&normalized) {
            continue;
        }
        seen.push(normalized);
        tips.push(candidate);
    }

    tips
}

/// Lowercase, strip punctuation, collapse whitespace
fn normalize_tip(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TipSource;

    #[test]
    fn test_high_sodium_fires_first() {
        let profile = NutrientProfile {
            sodium_mg: Some(2250.0),
            fiber_g: Some(2.0),
            ..NutrientProfile::default()
        };
        let tips = heuristic_tips(&profile);
        assert!(tips[0].text.starts_with("High sodium"));
        assert!(tips[1].text.starts_with("Low fiber"));
    }

    #[test]
    fn test_absent_fields_fire_nothing() {
        let tips = heuristic_tips(&NutrientProfile::default());
        assert!(tips.is_empty());
    }

    #[test]
    fn test_zero_fiber_fires_low_fiber() {
        // Zero is a reported value and legitimately low
        let profile = NutrientProfile {
            fiber_g: Some(0.0),
            ..NutrientProfile::default()
        };
        let tips = heuristic_tips(&profile);
        assert_eq!(tips.len(), 1);
        assert!(tips[0].text.starts_with("Low fiber"));
    }

    #[test]
    fn test_balanced_profile_gets_balance_tip() {
        let profile = NutrientProfile {
            sodium_mg: Some(300.0),
            fiber_g: Some(8.0),
            protein_g: Some(25.0),
            sugars_g: Some(6.0),
            ..NutrientProfile::default()
        };
        let tips = heuristic_tips(&profile);
        assert_eq!(tips.len(), 1);
        assert!(tips[0].text.contains("balance"));
    }

    #[test]
    fn test_heuristic_cap() {
        let profile = NutrientProfile {
            sodium_mg: Some(2000.0),
            fiber_g: Some(1.0),
            protein_g: Some(2.0),
            sugars_g: Some(50.0),
            ..NutrientProfile::default()
        };
        assert_eq!(heuristic_tips(&profile).len(), MAX_HEURISTIC_TIPS);
    }

    #[test]
    fn test_synthesize_dedups_retrieved_against_heuristics() {
        let profile = NutrientProfile {
            sodium_mg: Some(2000.0),
            ..NutrientProfile::default()
        };
        let retrieved = vec![
            TipCandidate::retrieved("High sodium: try low-sodium dressing or sauce!", 0.9),
            TipCandidate::retrieved("Swap fries for a side salad.", 0.8),
            TipCandidate::retrieved("Swap fries for a side salad", 0.7),
        ];
        let tips = synthesize(&profile, retrieved);

        assert_eq!(tips.len(), 2);
        assert_eq!(tips[0].source, TipSource::Heuristic);
        assert_eq!(tips[1].source, TipSource::Retrieved);
        assert!(tips[1].text.contains("side salad"));
    }

    #[test]
    fn test_synthesize_on_all_absent_profile() {
        let retrieved = vec![TipCandidate::retrieved("Drink water with meals.", 0.5)];
        let tips = synthesize(&NutrientProfile::default(), retrieved);
        assert_eq!(tips.len(), 1);
        assert_eq!(tips[0].source, TipSource::Retrieved);
    }

    #[test]
    fn test_nutrient_flags_match_thresholds() {
        let profile = NutrientProfile {
            sodium_mg: Some(2250.0),
            fiber_g: Some(1.0),
            ..NutrientProfile::default()
        };
        assert_eq!(nutrient_flags(&profile), vec!["high sodium", "low fiber"]);
    }
}
