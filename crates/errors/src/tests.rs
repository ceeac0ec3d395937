#[cfg(test)]
mod error_tests {
    use crate::*;

    #[test]
    fn test_dispatch_error_display() {
        let db_op_error = DispatchError::DatabaseOperation("Connection failed".to_string());
        assert_eq!(db_op_error.to_string(), "数据库操作错误: Connection failed");

        let id = Uuid::nil();
        let not_found = DispatchError::OperationNotFound { id };
        assert_eq!(
            not_found.to_string(),
            format!("修复任务未找到: {id}")
        );

        let mq_error = DispatchError::MessageQueue("BUSYGROUP".to_string());
        assert_eq!(mq_error.to_string(), "消息队列错误: BUSYGROUP");

        let transition = DispatchError::invalid_transition("completed", "running");
        assert_eq!(
            transition.to_string(),
            "非法的状态迁移: completed -> running"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DispatchError::MessageQueue("conn reset".into()).is_retryable());
        assert!(DispatchError::Network("dns".into()).is_retryable());
        assert!(DispatchError::Timeout("5s".into()).is_retryable());
        assert!(!DispatchError::operation_not_found(Uuid::nil()).is_retryable());
        assert!(!DispatchError::validation_error("empty host").is_retryable());
    }

    #[test]
    fn test_user_message() {
        assert_eq!(
            DispatchError::operation_not_found(Uuid::nil()).user_message(),
            "请求的修复任务不存在"
        );
        assert_eq!(
            DispatchError::MessageQueue("x".into()).user_message(),
            "系统繁忙，请稍后重试"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let wrapped: DispatchError = err.into();
        assert!(matches!(wrapped, DispatchError::Serialization(_)));
    }
}
