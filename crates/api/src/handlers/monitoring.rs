use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::{error::ApiResult, response::success, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct PendingQueryParams {
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ClaimRequest {
    pub consumer: Option<String>,
    pub min_idle_ms: Option<u64>,
    pub batch: Option<usize>,
}

/// 工作流与死信流概览（流后端不可用时降级返回错误描述）
pub async fn get_stream_info(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let outcome = state.job_service.get_stream_info().await?;
    Ok(success(outcome))
}

/// 挂起消息巡检
pub async fn get_pending(
    State(state): State<AppState>,
    Query(params): Query<PendingQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let count = params.count.unwrap_or(10).clamp(1, 100);
    let outcome = state.job_service.get_pending_jobs(count).await?;
    Ok(success(outcome))
}

/// 认领停滞消息（崩溃恢复的手动入口）
pub async fn claim_stuck(
    State(state): State<AppState>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .job_service
        .claim_stuck_jobs(
            request.consumer.as_deref(),
            request.min_idle_ms,
            request.batch,
        )
        .await?;
    Ok(success(report))
}
