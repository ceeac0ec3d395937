use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use macct_errors::DispatchError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度错误: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("验证错误: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type, suggestions) = match &self {
            ApiError::Dispatch(DispatchError::OperationNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("修复任务 {} 不存在", id),
                "OPERATION_NOT_FOUND".to_string(),
                vec![
                    "请检查任务ID是否正确".to_string(),
                    "使用 GET /api/jobs 查看所有修复任务".to_string(),
                ],
            ),
            ApiError::Dispatch(DispatchError::InvalidTransition { from, to }) => (
                StatusCode::CONFLICT,
                format!("非法的状态迁移: {} -> {}", from, to),
                "INVALID_TRANSITION".to_string(),
                vec![
                    "已完成的任务不能再变更状态".to_string(),
                    "使用 GET /api/jobs/{id} 查看任务当前状态".to_string(),
                ],
            ),
            ApiError::Dispatch(DispatchError::ValidationError(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数验证失败: {}", msg),
                "VALIDATION_ERROR".to_string(),
                vec!["请检查请求参数是否符合要求".to_string()],
            ),
            ApiError::Dispatch(DispatchError::MessageQueue(msg)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("消息队列暂时不可用: {}", msg),
                "MESSAGE_QUEUE_ERROR".to_string(),
                vec![
                    "流后端暂时不可用，请稍后重试".to_string(),
                    "查看 GET /health 检查系统状态".to_string(),
                ],
            ),
            ApiError::Dispatch(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR".to_string(),
                vec![
                    "系统遇到内部错误，请稍后重试".to_string(),
                    "如果问题持续存在，请联系系统管理员".to_string(),
                ],
            ),
            ApiError::Validation(errors) => {
                let error_details: Vec<String> = errors
                    .field_errors()
                    .iter()
                    .map(|(field, errors)| {
                        let messages: Vec<String> = errors
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .unwrap_or(&std::borrow::Cow::Borrowed("验证失败"))
                                    .to_string()
                            })
                            .collect();
                        format!("{}: {}", field, messages.join(", "))
                    })
                    .collect();
                (
                    StatusCode::BAD_REQUEST,
                    format!("请求参数验证失败: {}", error_details.join("; ")),
                    "VALIDATION_ERROR".to_string(),
                    vec!["请检查请求参数是否符合要求".to_string()],
                )
            }
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {}", msg),
                "BAD_REQUEST".to_string(),
                vec![
                    "请检查请求格式和参数".to_string(),
                    "确保Content-Type正确设置".to_string(),
                ],
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "请求的资源不存在".to_string(),
                "NOT_FOUND".to_string(),
                vec!["请检查请求URL是否正确".to_string()],
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR".to_string(),
                vec![format!("错误详情: {}", msg)],
            ),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
