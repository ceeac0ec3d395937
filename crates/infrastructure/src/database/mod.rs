pub mod postgres_operation_repository;

pub use postgres_operation_repository::PostgresOperationRepository;

use macct_errors::{DispatchError, DispatchResult};
use sqlx::PgPool;

/// 执行数据库迁移
pub async fn run_migrations(pool: &PgPool) -> DispatchResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DispatchError::DatabaseOperation(format!("数据库迁移失败: {e}")))
}
