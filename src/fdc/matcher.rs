// ABOUTME: Deterministic candidate selection and nutrient extraction for FDC records
// ABOUTME: Ranks search results, extracts per-basis nutrient profiles by nutrient code
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Nutrient Matcher
//!
//! Selects the best food-composition record for a predicted dish label and
//! extracts its macro-nutrient profile. Candidate ranking is deterministic:
//! near-exact description matches first, then standard-reference data types
//! ahead of survey and branded records, then the service's own score, then
//! service order. Zero candidates is an expected outcome (`None`), not an
//! error. Nutrients absent from the chosen record stay absent; zero and
//! "unknown" are never conflated.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, warn};

use super::{FoodDataClient, FoodDetail, FoodNutrientEntry, FoodSearchItem, LabelNutrients};
use crate::errors::AppResult;
use crate::models::{FdcMatch, NutrientProfile, ServingBasis};
use crate::vlm::extract::sanitize_label;

/// Energy in kcal; 2047 is the Atwater-general alternative some records use
const ENERGY_KCAL_IDS: [i64; 2] = [1008, 2047];
/// Protein, grams
const PROTEIN_ID: i64 = 1003;
/// Total fat, grams
const FAT_ID: i64 = 1004;
/// Carbohydrate by difference, grams
const CARB_ID: i64 = 1005;
/// Dietary fiber, grams
const FIBER_ID: i64 = 1079;
/// Sodium, milligrams
const SODIUM_ID: i64 = 1093;
/// Total sugars, grams
const SUGAR_ID: i64 = 2000;

/// Page size for the primary search
const SEARCH_PAGE_SIZE: u32 = 15;
/// Page size for the single-token fallback search
const FALLBACK_PAGE_SIZE: u32 = 10;

/// Match a dish label against the food database.
///
/// Returns `Ok(None)` when the search yields zero candidates — an expected,
/// non-fatal outcome. Transport failures propagate as errors for the caller
/// to absorb; a failed primary search is retried once with the label's first
/// token before giving up.
///
/// # Errors
///
/// Returns an error when both the primary and fallback searches fail at the
/// transport level, or when the detail fetch for the chosen candidate fails.
pub async fn match_food(
    client: &dyn FoodDataClient,
    raw_label: &str,
) -> AppResult<Option<(FdcMatch, NutrientProfile)>> {
    let query = sanitize_label(raw_label);
    if query.is_empty() {
        return Ok(None);
    }

    let search = match client.search(&query, SEARCH_PAGE_SIZE).await {
        Ok(search) => search,
        Err(primary_err) => {
            // Compound labels sometimes trip the service; the head token
            // alone is usually enough to land in the right food family
            let Some(first_token) = query.split_whitespace().next() else {
                return Err(primary_err);
            };
            if first_token == query {
                return Err(primary_err);
            }
            warn!("FDC search for {query:?} failed ({primary_err}), retrying with {first_token:?}");
            client.search(first_token, FALLBACK_PAGE_SIZE).await?
        }
    };

    let Some(best) = pick_best_food(&search.foods, &query) else {
        debug!("FDC search for {query:?} returned no candidates");
        return Ok(None);
    };

    let detail = client.food_detail(best.fdc_id).await?;
    let basis = extract_basis(&detail);
    let profile = extract_profile(&detail);

    let chosen = FdcMatch {
        fdc_id: detail.fdc_id,
        description: detail.description.clone(),
        data_type: detail.data_type.clone().unwrap_or_default(),
        basis,
    };
    debug!(
        "matched {query:?} -> {} ({}, basis {})",
        chosen.fdc_id, chosen.description, chosen.basis
    );
    Ok(Some((chosen, profile)))
}

/// Pick the best candidate from a search result set.
///
/// Ordering: near-exact description match, then data-type class
/// (Foundation / SR Legacy, then Survey (FNDDS), then Branded, then the
/// rest), then the service score descending, then service order.
#[must_use]
pub fn pick_best_food<'a>(
    foods: &'a [FoodSearchItem],
    query: &str,
) -> Option<&'a FoodSearchItem> {
    let normalized_query = normalize_text(query);
    foods
        .iter()
        .enumerate()
        .min_by(|(a_idx, a), (b_idx, b)| {
            exact_match_rank(a, &normalized_query)
                .cmp(&exact_match_rank(b, &normalized_query))
                .then_with(|| data_type_rank(a).cmp(&data_type_rank(b)))
                .then_with(|| {
                    let a_score = a.score.unwrap_or(0.0);
                    let b_score = b.score.unwrap_or(0.0);
                    b_score.partial_cmp(&a_score).unwrap_or(Ordering::Equal)
                })
                .then_with(|| a_idx.cmp(b_idx))
        })
        .map(|(_, item)| item)
}

/// 0 when the candidate description matches the query after normalization
fn exact_match_rank(item: &FoodSearchItem, normalized_query: &str) -> u8 {
    u8::from(normalize_text(&item.description) != normalized_query)
}

/// Data-type preference class; lower is better
fn data_type_rank(item: &FoodSearchItem) -> u8 {
    match item
        .data_type
        .as_deref()
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "foundation" | "sr legacy" => 0,
        "survey (fndds)" => 1,
        "branded" => 2,
        _ => 3,
    }
}

/// Lowercase, strip punctuation, collapse whitespace
fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Determine the quantity basis of a record's nutrient values.
///
/// A discrete serving basis is only adopted when the record declares a gram
/// serving (explicit `servingSize` in grams, or a portion with a gram
/// weight); anything else falls back to the per-100g standard.
#[must_use]
pub fn extract_basis(detail: &FoodDetail) -> ServingBasis {
    if let (Some(size), Some(unit)) = (detail.serving_size, detail.serving_size_unit.as_deref()) {
        if unit.trim().eq_ignore_ascii_case("g") && size > 0.0 {
            return ServingBasis::Serving { grams: size };
        }
    }

    for portion in &detail.food_portions {
        if let Some(grams) = portion.gram_weight {
            if grams > 0.0 {
                return ServingBasis::Serving { grams };
            }
        }
    }

    ServingBasis::PerHundredGrams
}

/// Extract the macro-nutrient profile from a detail record by nutrient code.
///
/// `foodNutrients` entries win; branded `labelNutrients` fill remaining
/// holes. Fields the record does not report stay `None`.
#[must_use]
pub fn extract_profile(detail: &FoodDetail) -> NutrientProfile {
    let mut by_id: HashMap<i64, f64> = HashMap::new();
    for entry in &detail.food_nutrients {
        let (Some(id), Some(amount)) = (nutrient_id(entry), entry.amount) else {
            continue;
        };
        by_id.entry(id).or_insert(amount);
    }

    if let Some(label) = &detail.label_nutrients {
        merge_label_nutrients(&mut by_id, label);
    }

    NutrientProfile {
        calories_kcal: ENERGY_KCAL_IDS.iter().find_map(|id| by_id.get(id)).copied(),
        protein_g: by_id.get(&PROTEIN_ID).copied(),
        fat_g: by_id.get(&FAT_ID).copied(),
        carb_g: by_id.get(&CARB_ID).copied(),
        fiber_g: by_id.get(&FIBER_ID).copied(),
        sodium_mg: by_id.get(&SODIUM_ID).copied(),
        sugars_g: by_id.get(&SUGAR_ID).copied(),
    }
}

/// Nutrient id from either record shape
fn nutrient_id(entry: &FoodNutrientEntry) -> Option<i64> {
    entry
        .nutrient
        .as_ref()
        .and_then(|n| n.id)
        .or(entry.nutrient_id)
}

/// Fill holes from branded label nutrients without overriding listed entries
fn merge_label_nutrients(by_id: &mut HashMap<i64, f64>, label: &LabelNutrients) {
    let pairs = [
        (ENERGY_KCAL_IDS[0], &label.calories),
        (PROTEIN_ID, &label.protein),
        (FAT_ID, &label.fat),
        (CARB_ID, &label.carbohydrates),
        (FIBER_ID, &label.fiber),
        (SUGAR_ID, &label.sugars),
        (SODIUM_ID, &label.sodium),
    ];
    for (id, node) in pairs {
        if let Some(value) = node.as_ref().and_then(|n| n.value) {
            by_id.entry(id).or_insert(value);
        }
    }
}
