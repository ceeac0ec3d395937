//! 领域仓储抽象
//!
//! JobStore：任务状态的唯一权威来源，与投递机制解耦。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use macct_errors::DispatchResult;
use uuid::Uuid;

use crate::entities::{Operation, OperationFilter, OperationPage, OperationUpdate};

/// 修复任务仓储抽象
#[async_trait]
pub trait OperationRepository: Send + Sync {
    async fn create(&self, operation: &Operation) -> DispatchResult<Operation>;

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Operation>>;

    /// 查找目标主机上的非终态任务（幂等创建的存在性检查）
    async fn find_active_by_host(&self, host: &str) -> DispatchResult<Option<Operation>>;

    /// 部分更新；时间戳盖章规则见 [`Operation::apply_update`]。
    /// 任务不存在时返回 OperationNotFound。
    async fn update(&self, id: Uuid, update: OperationUpdate) -> DispatchResult<Operation>;

    async fn list(&self, filter: &OperationFilter) -> DispatchResult<OperationPage>;

    /// 补偿扫描的选择器：早于older_than、仍为pending且没有流消息引用的任务
    async fn find_undispatched(
        &self,
        older_than: DateTime<Utc>,
    ) -> DispatchResult<Vec<Operation>>;
}
