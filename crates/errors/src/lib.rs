use thiserror::Error;
use uuid::Uuid;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("修复任务未找到: {id}")]
    OperationNotFound { id: Uuid },
    #[error("非法的状态迁移: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("消息队列错误: {0}")]
    MessageQueue(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn operation_not_found(id: Uuid) -> Self {
        Self::OperationNotFound { id }
    }
    pub fn invalid_transition<S: Into<String>>(from: S, to: S) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }
    pub fn message_queue<S: Into<String>>(msg: S) -> Self {
        Self::MessageQueue(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }

    /// 瞬态错误，调用方可以稍后重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Database(_)
                | DispatchError::DatabaseOperation(_)
                | DispatchError::MessageQueue(_)
                | DispatchError::Network(_)
                | DispatchError::Timeout(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            DispatchError::OperationNotFound { .. } => "请求的修复任务不存在",
            DispatchError::InvalidTransition { .. } => "任务当前状态不允许此操作",
            DispatchError::ValidationError(_) => "输入数据验证失败",
            DispatchError::Configuration(_) => "系统配置有误",
            DispatchError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        DispatchError::Internal(err.to_string())
    }
}
