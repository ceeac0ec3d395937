use async_trait::async_trait;
use chrono::{DateTime, Utc};
use macct_domain::entities::{
    Operation, OperationFilter, OperationPage, OperationStatus, OperationUpdate,
};
use macct_domain::repositories::OperationRepository;
use macct_errors::{DispatchError, DispatchResult};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

const OPERATION_COLUMNS: &str = "id, op_type, target_host, school, status, attempt, options, \
     result, error, stream_id, created_at, started_at, completed_at";

/// PostgreSQL任务仓储
pub struct PostgresOperationRepository {
    pool: PgPool,
}

impl PostgresOperationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_operation(row: &sqlx::postgres::PgRow) -> DispatchResult<Operation> {
        Ok(Operation {
            id: row.try_get("id")?,
            op_type: row.try_get("op_type")?,
            target_host: row.try_get("target_host")?,
            school: row.try_get("school")?,
            status: row.try_get("status")?,
            attempt: row.try_get("attempt")?,
            options: row.try_get("options")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            stream_id: row.try_get("stream_id")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait]
impl OperationRepository for PostgresOperationRepository {
    #[instrument(skip(self, operation), fields(
        operation_id = %operation.id,
        target_host = %operation.target_host,
        school = %operation.school,
    ))]
    async fn create(&self, operation: &Operation) -> DispatchResult<Operation> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO operations (id, op_type, target_host, school, status, attempt, options, result, error, stream_id, created_at, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {OPERATION_COLUMNS}
            "#
        ))
        .bind(operation.id)
        .bind(&operation.op_type)
        .bind(&operation.target_host)
        .bind(&operation.school)
        .bind(operation.status)
        .bind(operation.attempt)
        .bind(&operation.options)
        .bind(&operation.result)
        .bind(&operation.error)
        .bind(&operation.stream_id)
        .bind(operation.created_at)
        .bind(operation.started_at)
        .bind(operation.completed_at)
        .fetch_one(&self.pool)
        .await?;

        let created = Self::row_to_operation(&row)?;
        debug!("创建修复任务成功: {} ({})", created.id, created.target_host);
        Ok(created)
    }

    #[instrument(skip(self), fields(operation_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Operation>> {
        let row = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM operations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_operation).transpose()
    }

    #[instrument(skip(self))]
    async fn find_active_by_host(&self, host: &str) -> DispatchResult<Option<Operation>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {OPERATION_COLUMNS} FROM operations
            WHERE target_host = $1 AND status IN ('pending', 'running', 'retrying')
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(host)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_operation).transpose()
    }

    /// 读-改-写：盖章规则统一走 [`Operation::apply_update`]，
    /// 与内存实现保持完全一致的迁移语义。
    #[instrument(skip(self, update), fields(operation_id = %id))]
    async fn update(&self, id: Uuid, update: OperationUpdate) -> DispatchResult<Operation> {
        let mut operation = self
            .find_by_id(id)
            .await?
            .ok_or(DispatchError::OperationNotFound { id })?;
        operation.apply_update(update, Utc::now());

        let row = sqlx::query(&format!(
            r#"
            UPDATE operations
            SET status = $2, attempt = $3, result = $4, error = $5, stream_id = $6,
                started_at = $7, completed_at = $8
            WHERE id = $1
            RETURNING {OPERATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(operation.status)
        .bind(operation.attempt)
        .bind(&operation.result)
        .bind(&operation.error)
        .bind(&operation.stream_id)
        .bind(operation.started_at)
        .bind(operation.completed_at)
        .fetch_one(&self.pool)
        .await?;

        let updated = Self::row_to_operation(&row)?;
        debug!(
            "更新修复任务成功: {} 状态: {}",
            updated.id, updated.status
        );
        Ok(updated)
    }

    #[instrument(skip(self, filter))]
    async fn list(&self, filter: &OperationFilter) -> DispatchResult<OperationPage> {
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter.limit.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut count_query =
            sqlx::QueryBuilder::new("SELECT COUNT(*) AS total FROM operations WHERE 1=1");
        let mut list_query = sqlx::QueryBuilder::new(format!(
            "SELECT {OPERATION_COLUMNS} FROM operations WHERE 1=1"
        ));
        for builder in [&mut count_query, &mut list_query] {
            if let Some(status) = filter.status {
                builder.push(" AND status = ").push_bind(status);
            }
            if let Some(hostname) = &filter.hostname {
                builder.push(" AND target_host = ").push_bind(hostname.clone());
            }
            if let Some(school) = &filter.school {
                builder.push(" AND school = ").push_bind(school.clone());
            }
        }
        list_query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let total: i64 = count_query
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;
        let rows = list_query.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(Self::row_to_operation)
            .collect::<DispatchResult<Vec<_>>>()?;

        Ok(OperationPage {
            items,
            total,
            page,
            limit,
        })
    }

    #[instrument(skip(self))]
    async fn find_undispatched(
        &self,
        older_than: DateTime<Utc>,
    ) -> DispatchResult<Vec<Operation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {OPERATION_COLUMNS} FROM operations
            WHERE status IN ($1, $2) AND stream_id IS NULL AND created_at < $3
            ORDER BY created_at ASC
            LIMIT 100
            "#
        ))
        .bind(OperationStatus::Pending)
        .bind(OperationStatus::Retrying)
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_operation).collect()
    }
}
