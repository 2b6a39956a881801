// ABOUTME: Offline accuracy evaluation for vision-language backends
// ABOUTME: Runs labeled food images through each model and prints accuracy plus mean latency
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Mealscope Evaluation Binary
//!
//! Scores vision backends against a directory of labeled food images laid
//! out as `<dir>/<ground_truth_label>/<image files>`. Each image is run
//! through every model in the list; a prediction counts as correct when its
//! normalized label matches or contains (or is contained by) the normalized
//! ground truth. Reuses the same provider interface as the server; no
//! pipeline stages beyond prediction are involved.
//!
//! ```bash
//! mealscope-eval --models "qwen3-vl:8b,llava:7b-v1.6" --images ./food101 --num-samples 100
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use mealscope::config::ServerConfig;
use mealscope::vlm::{PreparedImage, VisionBackend, VisionProvider as _};

#[derive(Parser)]
#[command(name = "mealscope-eval")]
#[command(about = "Evaluate vision-language models on a labeled food image directory")]
struct Args {
    /// Comma-separated model names (e.g. "qwen3-vl:8b,llava:7b-v1.6")
    #[arg(long)]
    models: String,

    /// Backend selector (default: ollama)
    #[arg(long, default_value = "ollama")]
    backend: String,

    /// Directory of labeled images: one subdirectory per ground-truth label
    #[arg(long)]
    images: PathBuf,

    /// Number of samples to evaluate
    #[arg(long, default_value_t = 50)]
    num_samples: usize,
}

/// Per-model accumulator
#[derive(Debug, Default)]
struct ModelStats {
    total: usize,
    correct: usize,
    latency_sum: f64,
    latency_count: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let models: Vec<String> = args
        .models
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    if models.is_empty() {
        bail!("No models provided via --models");
    }

    let config = ServerConfig::from_env()?;
    let vision = VisionBackend::from_selector(&args.backend, &config.vlm)
        .map_err(|e| anyhow::anyhow!("Failed to create backend: {e}"))?;

    let samples = collect_samples(&args.images, args.num_samples)?;
    if samples.is_empty() {
        bail!("No labeled images found under {}", args.images.display());
    }

    println!(
        "Using backend={}, models={models:?}",
        vision.name()
    );
    println!("Evaluating {} samples from {}", samples.len(), args.images.display());

    let mut stats: BTreeMap<String, ModelStats> = models
        .iter()
        .map(|m| (m.clone(), ModelStats::default()))
        .collect();

    for (idx, (ground_truth, path)) in samples.iter().enumerate() {
        let gt_norm = normalize_label(ground_truth);
        println!("\n=== Sample {}/{} | GT: {ground_truth} ===", idx + 1, samples.len());

        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        let Ok(image) = PreparedImage::from_bytes(&bytes) else {
            println!("  skipping undecodable image {}", path.display());
            continue;
        };

        for model in &models {
            let Some(entry) = stats.get_mut(model) else {
                continue;
            };
            entry.total += 1;

            match vision.predict(&image, Some(model.as_str())).await {
                Ok(prediction) => {
                    let pred_norm = normalize_label(&prediction.label);
                    let correct = pred_norm == gt_norm
                        || gt_norm.contains(&pred_norm)
                        || pred_norm.contains(&gt_norm);

                    if correct {
                        entry.correct += 1;
                    }
                    entry.latency_sum += prediction.raw_latency_s;
                    entry.latency_count += 1;

                    println!(
                        "[{model}] pred={:?} (norm={pred_norm:?}) | gt={gt_norm:?} | correct={correct} | latency={:.3}s",
                        prediction.label, prediction.raw_latency_s
                    );
                }
                Err(e) => {
                    // Counts as incorrect, contributes no latency
                    println!("[{model}] ERROR: {e}");
                }
            }
        }
    }

    println!("\n===== SUMMARY =====");
    println!("{:30} {:>10} {:>16}", "Model", "Accuracy", "Avg Latency (s)");
    println!("{}", "-".repeat(60));
    for (model, entry) in &stats {
        let total = entry.total.max(1);
        let accuracy = entry.correct as f64 / total as f64;
        let avg_latency = if entry.latency_count > 0 {
            entry.latency_sum / entry.latency_count as f64
        } else {
            f64::NAN
        };
        println!("{model:30} {accuracy:>10.3} {avg_latency:>16.3}");
    }

    Ok(())
}

/// Collect `(label, image path)` pairs from the labeled directory layout
fn collect_samples(dir: &Path, limit: usize) -> Result<Vec<(String, PathBuf)>> {
    let mut samples = Vec::new();

    let mut label_dirs: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Cannot read image directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    label_dirs.sort();

    'outer: for label_dir in label_dirs {
        let label = label_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_owned();

        let mut images: Vec<PathBuf> = fs::read_dir(&label_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("jpg" | "jpeg" | "png" | "webp")
                )
            })
            .collect();
        images.sort();

        for image in images {
            samples.push((label.clone(), image));
            if samples.len() >= limit {
                break 'outer;
            }
        }
    }

    Ok(samples)
}

/// Lowercase, underscores to spaces, strip punctuation, collapse spaces
fn normalize_label(raw: &str) -> String {
    raw.to_lowercase()
        .replace('_', " ")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
