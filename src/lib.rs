// ABOUTME: Main library entry point for the Mealscope nutrition analysis API
// ABOUTME: Exposes the analysis pipeline, provider adapters, and HTTP surface
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Mealscope
//!
//! A food-photo nutrition analysis service: a vision-language model predicts
//! the dish and portion, USDA `FoodData` Central supplies a nutrient record,
//! nutrients are scaled to the predicted portion, and guidance tips are
//! assembled from threshold heuristics plus embedding-retrieved snippets.
//!
//! ## Architecture
//!
//! The server follows a modular architecture:
//! - **`vlm`**: Swappable vision-language backends behind one interface
//! - **`fdc`**: `FoodData` Central client, candidate ranking, nutrient extraction
//! - **`nutrition`**: Pure portion scaling
//! - **`rag`**: Lazily indexed guidance corpus with embedding retrieval
//! - **`tips`**: Threshold heuristics and tip fusion
//! - **`pipeline`**: The orchestrator sequencing all of the above
//! - **`routes`**: Thin axum transport over the pipeline
//!
//! ## Example
//!
//! ```rust,no_run
//! use mealscope::config::ServerConfig;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ServerConfig::from_env()?;
//! println!("Mealscope configured: {}", config.summary());
//! # Ok(())
//! # }
//! ```

/// Environment-based configuration management
pub mod config;

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// `FoodData` Central client, candidate ranking, and nutrient extraction
pub mod fdc;

/// Health checks and monitoring
pub mod health;

/// Logging configuration and initialization
pub mod logging;

/// Core data models for the analysis pipeline
pub mod models;

/// Pure portion scaling
pub mod nutrition;

/// Analysis orchestrator and per-stage fallback policy
pub mod pipeline;

/// Retrieval-augmented guidance over the corpus index
pub mod rag;

/// HTTP routes for the analysis API
pub mod routes;

/// Heuristic guidance rules and tip synthesis
pub mod tips;

/// Vision-language provider abstraction and backends
pub mod vlm;
