use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use macct_domain::entities::{
    Operation, OperationFilter, OperationPage, OperationStatus, OperationUpdate,
};
use macct_domain::repositories::OperationRepository;
use macct_errors::{DispatchError, DispatchResult};
use tokio::sync::RwLock;
use uuid::Uuid;

/// 内存版任务仓储
#[derive(Debug, Default)]
pub struct InMemoryOperationRepository {
    operations: RwLock<HashMap<Uuid, Operation>>,
}

impl InMemoryOperationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OperationRepository for InMemoryOperationRepository {
    async fn create(&self, operation: &Operation) -> DispatchResult<Operation> {
        let mut operations = self.operations.write().await;
        if operations.contains_key(&operation.id) {
            return Err(DispatchError::database_error(format!(
                "任务ID已存在: {}",
                operation.id
            )));
        }
        operations.insert(operation.id, operation.clone());
        Ok(operation.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Operation>> {
        Ok(self.operations.read().await.get(&id).cloned())
    }

    async fn find_active_by_host(&self, host: &str) -> DispatchResult<Option<Operation>> {
        let operations = self.operations.read().await;
        Ok(operations
            .values()
            .filter(|op| op.target_host == host && !op.is_terminal())
            .min_by_key(|op| op.created_at)
            .cloned())
    }

    async fn update(&self, id: Uuid, update: OperationUpdate) -> DispatchResult<Operation> {
        let mut operations = self.operations.write().await;
        let operation = operations
            .get_mut(&id)
            .ok_or(DispatchError::OperationNotFound { id })?;
        operation.apply_update(update, Utc::now());
        Ok(operation.clone())
    }

    async fn list(&self, filter: &OperationFilter) -> DispatchResult<OperationPage> {
        let operations = self.operations.read().await;
        let mut items: Vec<Operation> = operations
            .values()
            .filter(|op| {
                filter.status.map_or(true, |s| op.status == s)
                    && filter
                        .hostname
                        .as_ref()
                        .map_or(true, |h| &op.target_host == h)
                    && filter.school.as_ref().map_or(true, |s| &op.school == s)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = items.len() as i64;
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter.limit.unwrap_or(20).clamp(1, 100);
        let offset = ((page - 1) * limit) as usize;
        let items = items
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        Ok(OperationPage {
            items,
            total,
            page,
            limit,
        })
    }

    async fn find_undispatched(
        &self,
        older_than: DateTime<Utc>,
    ) -> DispatchResult<Vec<Operation>> {
        let operations = self.operations.read().await;
        let mut items: Vec<Operation> = operations
            .values()
            .filter(|op| {
                matches!(
                    op.status,
                    OperationStatus::Pending | OperationStatus::Retrying
                ) && op.stream_id.is_none()
                    && op.created_at < older_than
            })
            .cloned()
            .collect();
        items.sort_by_key(|op| op.created_at);
        Ok(items)
    }
}
