//! 流投递抽象
//!
//! 定义append-only日志之上的投递接口：发布、消费者组生命周期、
//! 挂起消息巡检与停滞消息认领。实现见infrastructure crate。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use macct_errors::{DispatchError, DispatchResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::REPAIR_JOB_TYPE;
use crate::entities::Operation;

/// 消费者组的挂起消息汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSummary {
    pub total: i64,
    pub min_id: Option<String>,
    pub max_id: Option<String>,
    pub consumers: Vec<ConsumerPending>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerPending {
    pub name: String,
    pub pending: i64,
}

/// 单条挂起消息的归属与空闲信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: String,
    pub consumer: String,
    pub idle_ms: u64,
    pub delivery_count: u64,
}

/// 认领回来的消息（含原始字段，供运维核对）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub length: u64,
    pub first_id: Option<String>,
    pub last_id: Option<String>,
}

/// 流投递抽象
///
/// 同一条流内保证全序；跨流无顺序保证。变更类调用在后端不可用时
/// 返回可重试错误，由调用方决定降级策略。
#[async_trait]
pub trait StreamDispatcher: Send + Sync {
    /// 幂等地创建消费者组（组定位在流尾部，流不存在时一并创建）。
    /// 组已存在不视为错误。
    async fn ensure_group(&self, stream: &str, group: &str) -> DispatchResult<()>;

    /// 追加一条消息，返回服务端分配的单调递增ID
    async fn publish(&self, stream: &str, fields: &[(String, String)]) -> DispatchResult<String>;

    async fn pending_summary(&self, stream: &str, group: &str) -> DispatchResult<PendingSummary>;

    async fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        start: &str,
        end: &str,
        count: usize,
    ) -> DispatchResult<Vec<PendingEntry>>;

    /// 把空闲超过min_idle_ms的挂起消息重新分配给consumer，
    /// 用于worker中途死亡后的崩溃恢复。batch限制单次回收规模。
    async fn claim_stuck(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        batch: usize,
    ) -> DispatchResult<Vec<ClaimedEntry>>;

    async fn stream_info(&self, stream: &str) -> DispatchResult<StreamInfo>;
}

/// 工作流消息：Operation面向投递的子集镜像，非权威数据
///
/// 固定字段列表的类型化编码器，必填字段为空时报错，
/// 而不是静默丢字段。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairJobMessage {
    pub operation_id: Uuid,
    pub host: String,
    pub school: String,
    pub attempt: i32,
    pub created_at: DateTime<Utc>,
}

impl RepairJobMessage {
    pub fn from_operation(op: &Operation) -> Self {
        Self {
            operation_id: op.id,
            host: op.target_host.clone(),
            school: op.school.clone(),
            attempt: op.attempt,
            created_at: op.created_at,
        }
    }

    /// 展开为扁平的字符串键值对（非字符串值由此处统一字符串化）
    pub fn to_fields(&self) -> DispatchResult<Vec<(String, String)>> {
        if self.host.trim().is_empty() {
            return Err(DispatchError::validation_error("流消息缺少必填字段: host"));
        }
        if self.school.trim().is_empty() {
            return Err(DispatchError::validation_error(
                "流消息缺少必填字段: school",
            ));
        }
        Ok(vec![
            ("type".to_string(), REPAIR_JOB_TYPE.to_string()),
            ("operation_id".to_string(), self.operation_id.to_string()),
            ("host".to_string(), self.host.clone()),
            ("school".to_string(), self.school.clone()),
            ("attempt".to_string(), self.attempt.to_string()),
            (
                "created_at".to_string(),
                self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ])
    }

    /// 从流消息字段还原（worker侧与认领核对使用）
    pub fn from_fields(fields: &HashMap<String, String>) -> DispatchResult<Self> {
        let get = |key: &str| -> DispatchResult<&String> {
            fields
                .get(key)
                .ok_or_else(|| DispatchError::validation_error(format!("流消息缺少字段: {key}")))
        };
        let operation_id = Uuid::parse_str(get("operation_id")?)
            .map_err(|e| DispatchError::validation_error(format!("operation_id非法: {e}")))?;
        let attempt = get("attempt")?
            .parse::<i32>()
            .map_err(|e| DispatchError::validation_error(format!("attempt非法: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(get("created_at")?)
            .map_err(|e| DispatchError::validation_error(format!("created_at非法: {e}")))?
            .with_timezone(&Utc);
        Ok(Self {
            operation_id,
            host: get("host")?.clone(),
            school: get("school")?.clone(),
            attempt,
            created_at,
        })
    }
}

/// 死信消息：重试耗尽后的终态记录
#[derive(Debug, Clone)]
pub struct DeadLetterMessage {
    pub operation_id: Uuid,
    pub host: String,
    pub school: String,
    pub attempt: i32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterMessage {
    pub fn from_operation(op: &Operation, failed_at: DateTime<Utc>) -> Self {
        Self {
            operation_id: op.id,
            host: op.target_host.clone(),
            school: op.school.clone(),
            attempt: op.attempt,
            last_error: op.error.clone().unwrap_or_default(),
            failed_at,
        }
    }

    pub fn to_fields(&self) -> DispatchResult<Vec<(String, String)>> {
        if self.host.trim().is_empty() {
            return Err(DispatchError::validation_error("死信消息缺少必填字段: host"));
        }
        Ok(vec![
            ("type".to_string(), REPAIR_JOB_TYPE.to_string()),
            ("operation_id".to_string(), self.operation_id.to_string()),
            ("host".to_string(), self.host.clone()),
            ("school".to_string(), self.school.clone()),
            ("attempt".to_string(), self.attempt.to_string()),
            ("last_error".to_string(), self.last_error.clone()),
            (
                "failed_at".to_string(),
                self.failed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ])
    }
}
