//! 领域事件
//!
//! JobService产生的实时事件，交由外部通知层（UI/运维面板）投递。
//! 本子系统只负责产生事件，不实现投递。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use macct_errors::DispatchResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 修复任务相关事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Created {
        operation_id: Uuid,
        hostname: String,
        school: String,
        occurred_at: DateTime<Utc>,
    },
    Updated {
        operation_id: Uuid,
        hostname: String,
        status: crate::entities::OperationStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Retrying {
        operation_id: Uuid,
        hostname: String,
        attempt: i32,
        occurred_at: DateTime<Utc>,
    },
    Failed {
        operation_id: Uuid,
        hostname: String,
        attempt: i32,
        last_error: Option<String>,
        occurred_at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::Created { .. } => "job.created",
            JobEvent::Updated { .. } => "job.updated",
            JobEvent::Retrying { .. } => "job.retrying",
            JobEvent::Failed { .. } => "job.failed",
        }
    }

    pub fn operation_id(&self) -> Uuid {
        match self {
            JobEvent::Created { operation_id, .. } => *operation_id,
            JobEvent::Updated { operation_id, .. } => *operation_id,
            JobEvent::Retrying { operation_id, .. } => *operation_id,
            JobEvent::Failed { operation_id, .. } => *operation_id,
        }
    }

    pub fn hostname(&self) -> &str {
        match self {
            JobEvent::Created { hostname, .. } => hostname,
            JobEvent::Updated { hostname, .. } => hostname,
            JobEvent::Retrying { hostname, .. } => hostname,
            JobEvent::Failed { hostname, .. } => hostname,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JobEvent::Created { occurred_at, .. } => *occurred_at,
            JobEvent::Updated { occurred_at, .. } => *occurred_at,
            JobEvent::Retrying { occurred_at, .. } => *occurred_at,
            JobEvent::Failed { occurred_at, .. } => *occurred_at,
        }
    }
}

/// 事件通知抽象
///
/// 实现方负责实时分发；发布失败由调用方记录日志，绝不中断任务流程。
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn publish(&self, event: &JobEvent) -> DispatchResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let event = JobEvent::Created {
            operation_id: Uuid::new_v4(),
            hostname: "pc-01".to_string(),
            school: "default-school".to_string(),
            occurred_at: Utc::now(),
        };
        assert_eq!(event.event_type(), "job.created");
        assert_eq!(event.hostname(), "pc-01");
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = JobEvent::Retrying {
            operation_id: Uuid::nil(),
            hostname: "pc-01".to_string(),
            attempt: 2,
            occurred_at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "retrying");
        assert_eq!(value["attempt"], 2);
    }
}
