//! Health check endpoint. Reports 503 until the first price import finished.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use goldie_common::error::AppError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    if !state.readiness.is_ready() {
        return Err(AppError::Unavailable(
            "Price history import in progress".to_string(),
        ));
    }

    Ok(Json(json!({ "status": "ok" })))
}
