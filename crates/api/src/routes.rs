use axum::{
    routing::{get, post},
    Router,
};
use macct_application::JobService;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::handlers::{
    health::health_check,
    jobs::{create_job, get_job, list_jobs, retry_job, update_job_status},
    metrics::render_metrics,
    monitoring::{claim_stuck, get_pending, get_stream_info},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub job_service: Arc<JobService>,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查与指标
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        // 修复任务API
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/status", post(update_job_status))
        .route("/api/jobs/{id}/retry", post(retry_job))
        // 流监控API
        .route("/api/monitoring/stream", get(get_stream_info))
        .route("/api/monitoring/pending", get(get_pending))
        .route("/api/monitoring/claim", post(claim_stuck))
        .with_state(state)
}
