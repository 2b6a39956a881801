// ABOUTME: Structured-field extraction from free-form vision-model output
// ABOUTME: JSON-block-first parsing with regex fallbacks and a sentinel low-confidence default
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Prediction Extraction
//!
//! Vision models answer the classification prompt with anything from clean
//! JSON to JSON buried in prose to plain text. This parser accepts that whole
//! range: it tries the first JSON-looking block, falls back to regex scans
//! for a `label` field, and finally degrades to a sentinel prediction with
//! `confidence = 0.0` — it never raises on malformed model output.

use regex::Regex;
use serde_json::Value;

use crate::models::UNKNOWN_LABEL;

/// Default portion guess when the model omits one, in grams
const DEFAULT_PORTION_G: f64 = 250.0;

/// Default confidence when the model found a label but omitted a confidence
const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Fields extracted from a model response
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPrediction {
    /// Sanitized dish label, or the sentinel when nothing was parseable
    pub label: String,
    /// Portion grams (defaulted when absent)
    pub portion_g: f64,
    /// Confidence in [0, 1]; `0.0` marks the sentinel case
    pub confidence: f64,
}

/// Pull label, portion and confidence out of free-form model output.
///
/// Tries the outermost JSON block first, then regex fallbacks for the label.
/// A missing portion defaults to 250 g and a missing confidence to 0.7 when
/// a label was found; a wholly unparseable response yields the sentinel
/// label with confidence 0.0.
#[must_use]
pub fn extract_prediction(text: &str) -> ExtractedPrediction {
    let mut label: Option<String> = None;
    let mut portion: Option<f64> = None;
    let mut confidence: Option<f64> = None;

    if let Some(block) = json_block(text) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            label = value
                .get("label")
                .or_else(|| value.get("dish"))
                .or_else(|| value.get("class"))
                .and_then(value_to_label);
            portion = value.get("portion_grams").and_then(value_to_f64);
            confidence = value.get("confidence").and_then(value_to_f64);
        }
    }

    // Fallbacks for the label when JSON parsing found nothing
    if label.is_none() {
        label = quoted_label_field(text);
    }
    if label.is_none() {
        label = bare_label_field(text);
    }

    let label = label.map(|l| sanitize_label(&l)).filter(|l| !l.is_empty());

    match label {
        Some(label) => ExtractedPrediction {
            label,
            portion_g: portion.unwrap_or(DEFAULT_PORTION_G),
            confidence: confidence.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0),
        },
        // Sentinel: the caller decides whether a zero-confidence prediction
        // is still worth matching against the nutrient database
        None => ExtractedPrediction {
            label: UNKNOWN_LABEL.to_owned(),
            portion_g: DEFAULT_PORTION_G,
            confidence: 0.0,
        },
    }
}

/// Make a database-safe query string: strip noise and limit length.
///
/// `&` becomes "and", underscores become spaces (Food-101 style labels),
/// characters outside `[A-Za-z0-9 /()-]` are dropped, whitespace collapses,
/// and the result is capped at six words.
#[must_use]
pub fn sanitize_label(raw: &str) -> String {
    let replaced = raw
        .replace('&', " and ")
        .replace(['\n', '_'], " ");
    let filtered: String = replaced
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '/' | '(' | ')' | '-'))
        .collect();
    filtered
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The outermost brace-delimited block, mirroring a greedy `\{.*\}` scan
fn json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// `"label": "..."` anywhere in the text
fn quoted_label_field(text: &str) -> Option<String> {
    let re = Regex::new(r#"(?i)"label"\s*:\s*"([^"]+)""#).ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
}

/// `label: ...` / `label = ...` with an unquoted value
fn bare_label_field(text: &str) -> Option<String> {
    let re = Regex::new(r#"(?i)label\s*[:=]\s*["']?([A-Za-z0-9][^"',\n]+)"#).ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_owned())
}

/// Accept a string, the first element of an array, or a bare scalar as label
fn value_to_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(value_to_label),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accept a number or a numeric string
fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_json_response() {
        let text = r#"{"label": "caesar_salad", "portion_grams": 320.5, "confidence": 0.91}"#;
        let p = extract_prediction(text);
        assert_eq!(p.label, "caesar salad");
        assert!((p.portion_g - 320.5).abs() < f64::EPSILON);
        assert!((p.confidence - 0.91).abs() < f64::EPSILON);
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let text = "Sure! Here is the answer:\n{\"label\": \"pad_thai\", \"confidence\": 0.8}\nHope that helps.";
        let p = extract_prediction(text);
        assert_eq!(p.label, "pad thai");
        // Missing portion falls back to the default guess
        assert!((p.portion_g - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_label_as_list() {
        let text = r#"{"label": ["ramen", "noodle soup"], "portion_grams": 400}"#;
        let p = extract_prediction(text);
        assert_eq!(p.label, "ramen");
        assert!((p.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_numeric_string_fields() {
        let text = r#"{"label": "pizza", "portion_grams": "300", "confidence": "0.6"}"#;
        let p = extract_prediction(text);
        assert!((p.portion_g - 300.0).abs() < f64::EPSILON);
        assert!((p.confidence - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_regex_fallback_label() {
        let text = "label: grilled cheese sandwich\nportion unknown";
        let p = extract_prediction(text);
        assert_eq!(p.label, "grilled cheese sandwich");
        assert!((p.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unparseable_yields_sentinel() {
        let p = extract_prediction("I cannot identify this image.");
        assert_eq!(p.label, UNKNOWN_LABEL);
        assert!((p.confidence - 0.0).abs() < f64::EPSILON);
        assert!((p.portion_g - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sanitize_label_strips_noise() {
        assert_eq!(sanitize_label("mac & cheese!!"), "mac and cheese");
        assert_eq!(
            sanitize_label("a very long label with far too many words in it"),
            "a very long label with far"
        );
        assert_eq!(sanitize_label("fish\nand chips"), "fish and chips");
    }

    #[test]
    fn test_confidence_clamped() {
        let text = r#"{"label": "toast", "confidence": 1.7}"#;
        let p = extract_prediction(text);
        assert!((p.confidence - 1.0).abs() < f64::EPSILON);
    }
}
