//! HTTP surface.
//!
//! Endpoints:
//!   GET /api/health                      - liveness
//!   GET /api/realestate/assets           - asset list and metadata
//!   GET /api/realestate/asset?asset=ID   - full payload for one asset

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::assets::{assets_meta, list_assets};
use crate::config::Config;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::payload::{build_asset_payload, PayloadError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid asset id: {0:?}")]
    InvalidAsset(String),
    #[error("no assets available")]
    NoAssets,
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidAsset(_) => StatusCode::BAD_REQUEST,
            ApiError::NoAssets => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidAsset(_) => "invalid_asset",
            ApiError::NoAssets => "no_assets",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<PayloadError> for ApiError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::NoAssets => ApiError::NoAssets,
            PayloadError::InvalidAsset(asset) => ApiError::InvalidAsset(asset),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let reason = self.to_string();
        log(
            if status.is_server_error() { Level::Error } else { Level::Warn },
            Domain::Api,
            "request_failed",
            obj(&[
                ("status", json!(status.as_u16())),
                ("error", v_str(self.code())),
                ("msg", v_str(&reason)),
            ]),
        );
        (status, Json(json!({ "error": self.code(), "reason": reason }))).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
pub struct AssetQuery {
    pub asset: Option<String>,
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn assets_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let assets = list_assets(&state.config).await;
    if assets.is_empty() {
        return Err(ApiError::NoAssets);
    }
    let meta = assets_meta(&state.config, &assets).await;
    Ok(Json(json!({ "assets": assets, "assets_meta": meta })).into_response())
}

async fn asset_handler(
    State(state): State<AppState>,
    query: Result<Query<AssetQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::InvalidAsset(rejection.body_text()))?;
    let requested = query.asset.as_deref().map(str::trim).filter(|a| !a.is_empty());
    let payload = build_asset_payload(&state.config, requested).await?;
    let body = serde_json::to_value(&payload).map_err(anyhow::Error::from)?;
    Ok(Json(body).into_response())
}

pub fn build_router(config: Config) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/realestate/assets", get(assets_handler))
        .route("/api/realestate/asset", get(asset_handler))
        .with_state(AppState {
            config: Arc::new(config),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_statuses() {
        assert_eq!(ApiError::NoAssets.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::InvalidAsset("..".into()).status(), StatusCode::BAD_REQUEST);
        let internal = ApiError::from(anyhow::anyhow!("boom"));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.code(), "internal_error");
        assert_eq!(ApiError::from(PayloadError::NoAssets).code(), "no_assets");
    }
}
