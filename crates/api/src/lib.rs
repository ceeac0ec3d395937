//! # macct API
//!
//! 机器账号修复调度子系统的REST API层，基于Axum构建。
//!
//! ## API 端点
//!
//! ### 修复任务
//! - `GET /api/jobs` - 任务列表（支持状态/主机/学校过滤与分页）
//! - `POST /api/jobs` - 创建修复任务（同一主机幂等）
//! - `GET /api/jobs/{id}` - 任务详情
//! - `POST /api/jobs/{id}/status` - worker回报状态
//! - `POST /api/jobs/{id}/retry` - 请求重试（名额耗尽转入死信）
//!
//! ### 流监控
//! - `GET /api/monitoring/stream` - 工作流/死信流概览
//! - `GET /api/monitoring/pending` - 挂起消息巡检
//! - `POST /api/monitoring/claim` - 认领停滞消息
//!
//! ### 系统
//! - `GET /health` - 健康检查
//! - `GET /metrics` - Prometheus指标

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;

pub use error::{ApiError, ApiResult};
pub use response::{ApiResponse, PaginatedResponse};
pub use routes::{create_routes, AppState};

/// 组装完整的API应用（路由加中间件）
pub fn create_app(state: AppState, cors_enabled: bool) -> Router {
    let mut app = create_routes(state)
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(middleware::trace_layer());
    if cors_enabled {
        app = app.layer(middleware::cors_layer());
    }
    app
}
