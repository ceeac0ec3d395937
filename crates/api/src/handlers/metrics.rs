use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::routes::AppState;

/// Prometheus文本格式的指标导出；未启用指标时返回404
pub async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
