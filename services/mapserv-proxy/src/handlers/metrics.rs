//! Health check and Prometheus metrics handlers.

use axum::{extract::Extension, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub maps: Vec<MapSummary>,
}

#[derive(Debug, Serialize)]
pub struct MapSummary {
    pub name: String,
    pub path: String,
    pub projections: Vec<String>,
}

pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<HealthResponse> {
    let maps = state
        .config
        .maps
        .iter()
        .map(|m| MapSummary {
            name: m.name().to_string(),
            path: m.url_path().to_string(),
            projections: m.projections().to_vec(),
        })
        .collect();

    Json(HealthResponse {
        status: "ok",
        service: "mapserv-proxy",
        version: env!("CARGO_PKG_VERSION"),
        maps,
    })
}

pub async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
