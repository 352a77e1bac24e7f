//! Static liveness report.
//!
//! Backends are not probed: every configured service is reported `UP` as
//! long as the gateway process itself is serving.
use std::time::Instant;

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::adapters::{app::AppState, http_handler::RouteLabel};

const STATUS_UP: &str = "UP";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub services: Vec<ServiceStatus>,
    /// Time spent building this report, in milliseconds.
    pub response_time: u64,
    pub timestamp: String,
    pub version: &'static str,
}

impl HealthReport {
    /// Report for the gateway itself followed by each service, in name order.
    pub fn build(service_names: &[&str]) -> Self {
        let start = Instant::now();

        let services = std::iter::once("gateway")
            .chain(service_names.iter().copied())
            .map(|name| ServiceStatus {
                name: name.to_string(),
                status: STATUS_UP,
            })
            .collect();

        Self {
            status: STATUS_UP,
            services,
            response_time: start.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Response {
    let service_names = state.handler.gateway_service().resolver().service_names();
    let mut response = Json(HealthReport::build(&service_names)).into_response();
    response
        .extensions_mut()
        .insert(RouteLabel("/health".to_string()));
    response
}
