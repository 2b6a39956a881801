// ABOUTME: Server health monitoring for operational visibility
// ABOUTME: Reports service status, uptime, and collaborator configuration
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Health check payloads and monitoring utilities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Overall health status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All collaborators configured
    Healthy,
    /// Serving, but some collaborator is unconfigured
    Degraded,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Liveness marker
    pub ok: bool,
    /// Overall service status
    pub status: HealthStatus,
    /// Service information
    pub service: ServiceInfo,
    /// Response timestamp
    pub timestamp: DateTime<Utc>,
}

/// Service information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
    /// Service uptime in seconds
    pub uptime_seconds: u64,
}

/// Health checker for the analysis server
pub struct HealthChecker {
    start_time: Instant,
    food_data_configured: bool,
}

impl HealthChecker {
    /// Create a checker; `food_data_configured` reflects whether nutrient
    /// lookups can succeed in this deployment
    #[must_use]
    pub fn new(food_data_configured: bool) -> Self {
        Self {
            start_time: Instant::now(),
            food_data_configured,
        }
    }

    /// Produce the current health payload
    #[must_use]
    pub fn check(&self) -> HealthResponse {
        let status = if self.food_data_configured {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthResponse {
            ok: true,
            status,
            service: ServiceInfo {
                name: env!("CARGO_PKG_NAME").to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                uptime_seconds: self.start_time.elapsed().as_secs(),
            },
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_reports_degraded_without_food_data() {
        let checker = HealthChecker::new(false);
        let response = checker.check();
        assert!(response.ok);
        assert_eq!(response.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_health_reports_healthy_when_configured() {
        let checker = HealthChecker::new(true);
        assert_eq!(checker.check().status, HealthStatus::Healthy);
    }
}
