//! Health check module
//! Provides health status for the application and its dependencies

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Instant;

use crate::database;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone)]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn record(&mut self, component: &str, health: ComponentHealth) {
        if matches!(health.status, ComponentState::Down) {
            self.status = HealthState::Unhealthy;
        }
        self.checks.insert(component.to_string(), health);
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

/// GET /health
pub async fn health_handler(State(pool): State<PgPool>) -> impl IntoResponse {
    let mut status = HealthStatus::new();

    let start = Instant::now();
    match database::health_check(&pool).await {
        Ok(()) => {
            status.record(
                "database",
                ComponentHealth::up(Some(start.elapsed().as_millis())),
            );
        }
        Err(e) => {
            status.record("database", ComponentHealth::down(Some(e.to_string())));
        }
    }

    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(status))
}
