//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// List all registered accessories
pub async fn list_accessories(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.accessories().await)
}

/// Get a specific accessory by identity
pub async fn get_accessory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.get_accessory(&id).await {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiError::new("Accessory not found")),
        )
            .into_response(),
    }
}

/// Trigger a discovery cycle
pub async fn trigger_scan(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Manual scan triggered");

    match state.scanner.scan_once().await {
        Ok(summary) => Json(serde_json::json!({
            "status": "completed",
            "summary": summary
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(format!("Scan failed: {}", e))),
        )
            .into_response(),
    }
}

/// Get the configuration the daemon and its scanner are running with
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "daemon": state.config.daemon,
        "discovery": state.scanner.config(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    async fn state(dir: &TempDir) -> Arc<AppState> {
        let mut config = Config::default();
        config.daemon.cache_path = dir.path().join("accessories.json").display().to_string();
        AppState::new(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_accessory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let response = get_accessory(State(state(&dir).await), Path("missing".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_scan_with_nothing_configured_completes() {
        let dir = TempDir::new().unwrap();
        let response = trigger_scan(State(state(&dir).await)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_config_reports_scanner_settings() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.daemon.cache_path = dir.path().join("accessories.json").display().to_string();
        config.discovery.excluded_apps = vec!["Netflix".to_string()];
        let state = AppState::new(config).await.unwrap();

        let response = get_config(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["daemon"]["polling_interval_secs"], 60);
        assert_eq!(json["discovery"]["excluded_apps"][0], "Netflix");
        assert_eq!(json["discovery"]["ecp_port"], 8060);
    }
}
