use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use macct_application::StatusUpdate;
use macct_domain::constants::DEFAULT_SCHOOL;
use macct_domain::entities::{OperationFilter, OperationStatus};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{ApiError, ApiResult},
    response::{created, success, PaginatedResponse},
    routes::AppState,
};

/// 修复任务创建请求
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[validate(length(min = 1, max = 255, message = "hostname长度必须在1到255之间"))]
    pub hostname: String,
    /// 缺省使用默认学校标签
    pub school: Option<String>,
    pub options: Option<serde_json::Value>,
}

/// worker状态回报请求
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub attempt: Option<i32>,
}

/// 任务查询参数
#[derive(Debug, Deserialize)]
pub struct JobQueryParams {
    pub status: Option<String>,
    pub hostname: Option<String>,
    pub school: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn parse_status(raw: &str) -> Result<OperationStatus, ApiError> {
    OperationStatus::parse(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("未知的任务状态: {raw}")))
}

/// 创建修复任务（同一主机幂等）
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<impl IntoResponse> {
    request.validate()?;
    let school = request
        .school
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SCHOOL.to_string());
    let options = request.options.unwrap_or_else(|| serde_json::json!({}));

    let outcome = state
        .job_service
        .create_repair_job(&request.hostname, &school, options)
        .await?;
    if outcome.queued {
        Ok(created(outcome).into_response())
    } else {
        Ok(success(outcome).into_response())
    }
}

/// 获取任务列表
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let status = params.status.as_deref().map(parse_status).transpose()?;
    let filter = OperationFilter {
        status,
        hostname: params.hostname,
        school: params.school,
        page: params.page,
        limit: params.limit,
    };
    let page = state.job_service.list_macct_jobs(&filter).await?;
    Ok(success(PaginatedResponse::new(
        page.items, page.total, page.page, page.limit,
    )))
}

/// 获取单个任务
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let operation = state.job_service.get_operation_status(id).await?;
    Ok(success(operation))
}

/// worker回报任务状态
pub async fn update_job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let status = parse_status(&request.status)?;
    let operation = state
        .job_service
        .update_operation_status(
            id,
            StatusUpdate {
                status,
                result: request.result,
                error: request.error,
                attempt: request.attempt,
            },
        )
        .await?;
    Ok(success(operation))
}

/// 请求重试（名额耗尽时转入死信）
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.job_service.retry_job(id).await?;
    Ok(success(outcome))
}
