// HTTP request handlers
use crate::presentation::app_state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Build and return one fresh vitals report. A stale reading still yields a
/// 200 (the timestamps carry the staleness signal); only a failed sweep is
/// reported as unavailable.
pub async fn get_vitals(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.vitals_service.build_report().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "could not build vitals report");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}
