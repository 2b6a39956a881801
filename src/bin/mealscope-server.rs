// ABOUTME: Mealscope analysis server binary
// ABOUTME: Loads configuration, wires the pipeline, serves the HTTP API with graceful shutdown
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Mealscope Server Binary
//!
//! Starts the food-photo analysis API: vision-language prediction, nutrient
//! matching and scaling, and retrieval-augmented guidance behind one
//! `POST /api/analyze` endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use mealscope::config::ServerConfig;
use mealscope::fdc::{FdcClient, FoodDataClient};
use mealscope::health::HealthChecker;
use mealscope::logging;
use mealscope::pipeline::AnalysisOrchestrator;
use mealscope::rag::{FastembedEmbedder, TipRetriever};
use mealscope::routes::{router, AppState};

#[derive(Parser)]
#[command(name = "mealscope-server")]
#[command(about = "Mealscope - food photo nutrition analysis API")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    logging::init_from_env()?;
    info!("Starting Mealscope analysis server");
    info!("{}", config.summary());

    // A deployment without database credentials still serves predictions
    // and heuristic tips; every result is marked unmatched
    let food_data = match FdcClient::new(&config.fdc) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Food data lookups disabled: {e}");
            None
        }
    };

    let embedder = Arc::new(FastembedEmbedder::new());
    let retriever = Arc::new(TipRetriever::new(embedder, &config.rag));
    let orchestrator = AnalysisOrchestrator::new(
        food_data
            .clone()
            .map(|client| client as Arc<dyn FoodDataClient>),
        retriever,
    );

    let health = HealthChecker::new(food_data.is_some());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let state = Arc::new(AppState {
        config,
        orchestrator,
        food_data,
        health,
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on ctrl-c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install ctrl-c handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
