use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::REPAIR_JOB_TYPE;

/// 一次机器账号修复任务的权威生命周期记录
///
/// 由JobStore持久化，仅通过JobService变更，不会被本子系统删除（保留审计）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub op_type: String,
    /// 目标主机名
    pub target_host: String,
    /// 学校租户标签
    pub school: String,
    pub status: OperationStatus,
    /// 已消耗的重试次数，上限为 MAX_RETRIES
    pub attempt: i32,
    /// 创建时透传的不透明参数
    pub options: serde_json::Value,
    /// worker回报的不透明结果
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// 最近一次发布到工作流的消息ID；None表示尚未成功投递
    pub stream_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "retrying")]
    Retrying,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Running => "running",
            OperationStatus::Retrying => "retrying",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }

    /// 终态：completed 与 failed。非终态任务占用主机的唯一活跃名额
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OperationStatus::Pending),
            "running" => Some(OperationStatus::Running),
            "retrying" => Some(OperationStatus::Retrying),
            "completed" => Some(OperationStatus::Completed),
            "failed" => Some(OperationStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Postgres> for OperationStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OperationStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        OperationStatus::parse(s).ok_or_else(|| format!("Invalid operation status: {s}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for OperationStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// JobStore的部分更新
///
/// `error`与`stream_id`使用双层Option：`Some(None)`表示清除该字段，
/// `None`表示不变。重新入队前清掉stream_id，补偿扫描才认得这条任务。
#[derive(Debug, Clone, Default)]
pub struct OperationUpdate {
    pub status: Option<OperationStatus>,
    pub result: Option<serde_json::Value>,
    pub error: Option<Option<String>>,
    pub attempt: Option<i32>,
    pub stream_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct OperationFilter {
    pub status: Option<OperationStatus>,
    pub hostname: Option<String>,
    pub school: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationPage {
    pub items: Vec<Operation>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl Operation {
    pub fn new(target_host: String, school: String, options: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            op_type: REPAIR_JOB_TYPE.to_string(),
            target_host,
            school,
            status: OperationStatus::Pending,
            attempt: 0,
            options,
            result: None,
            error: None,
            stream_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 应用部分更新并盖时间戳
    ///
    /// 进入running时盖started_at，进入终态时盖completed_at；
    /// 已存在的时间戳不会被覆盖。所有存储实现共享这一条迁移规则。
    pub fn apply_update(&mut self, update: OperationUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            if status != self.status {
                if status == OperationStatus::Running && self.started_at.is_none() {
                    self.started_at = Some(now);
                }
                if status.is_terminal() && self.completed_at.is_none() {
                    self.completed_at = Some(now);
                }
            }
            self.status = status;
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        if let Some(attempt) = update.attempt {
            self.attempt = attempt;
        }
        if let Some(stream_id) = update.stream_id {
            self.stream_id = stream_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Operation {
        Operation::new(
            "pc-01".to_string(),
            "default-school".to_string(),
            serde_json::json!({}),
        )
    }

    #[test]
    fn test_new_operation_defaults() {
        let op = sample();
        assert_eq!(op.op_type, "macct_repair");
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempt, 0);
        assert!(op.stream_id.is_none());
        assert!(op.started_at.is_none());
        assert!(op.completed_at.is_none());
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::Running,
            OperationStatus::Retrying,
            OperationStatus::Completed,
            OperationStatus::Failed,
        ] {
            assert_eq!(OperationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OperationStatus::parse("unknown"), None);
    }

    #[test]
    fn test_apply_update_stamps_started_at_once() {
        let mut op = sample();
        let t1 = Utc::now();
        op.apply_update(
            OperationUpdate {
                status: Some(OperationStatus::Running),
                ..Default::default()
            },
            t1,
        );
        assert_eq!(op.started_at, Some(t1));

        // 再次进入running不会刷新时间戳
        let t2 = t1 + chrono::Duration::seconds(10);
        op.apply_update(
            OperationUpdate {
                status: Some(OperationStatus::Pending),
                ..Default::default()
            },
            t2,
        );
        op.apply_update(
            OperationUpdate {
                status: Some(OperationStatus::Running),
                ..Default::default()
            },
            t2,
        );
        assert_eq!(op.started_at, Some(t1));
    }

    #[test]
    fn test_apply_update_stamps_completed_at_and_keeps_started_at() {
        let mut op = sample();
        let t1 = Utc::now();
        op.apply_update(
            OperationUpdate {
                status: Some(OperationStatus::Running),
                ..Default::default()
            },
            t1,
        );
        let t2 = t1 + chrono::Duration::seconds(42);
        op.apply_update(
            OperationUpdate {
                status: Some(OperationStatus::Completed),
                result: Some(serde_json::json!({"ok": true})),
                ..Default::default()
            },
            t2,
        );
        assert_eq!(op.started_at, Some(t1));
        assert_eq!(op.completed_at, Some(t2));
        assert!(op.is_terminal());
    }

    #[test]
    fn test_apply_update_clears_error_and_stream_id() {
        let mut op = sample();
        op.error = Some("ldb locked".to_string());
        op.stream_id = Some("1-0".to_string());
        op.apply_update(
            OperationUpdate {
                status: Some(OperationStatus::Retrying),
                error: Some(None),
                attempt: Some(1),
                stream_id: Some(None),
                ..Default::default()
            },
            Utc::now(),
        );
        assert_eq!(op.error, None);
        assert_eq!(op.stream_id, None);
        assert_eq!(op.attempt, 1);
        assert_eq!(op.status, OperationStatus::Retrying);
    }
}
