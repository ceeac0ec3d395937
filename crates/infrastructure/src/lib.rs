//! 基础设施实现
//!
//! - `redis_stream`：基于Redis Stream的流投递实现（发布、消费者组、
//!   挂起巡检、停滞认领）
//! - `database`：PostgreSQL任务仓储
//! - `memory`：内存版流投递与仓储，用于嵌入式部署和测试
//! - `notifier`：基于tokio broadcast的事件扇出点

pub mod database;
pub mod memory;
pub mod notifier;
pub mod redis_stream;

pub use database::{run_migrations, PostgresOperationRepository};
pub use memory::{InMemoryOperationRepository, InMemoryStreamDispatcher};
pub use notifier::BroadcastEventNotifier;
pub use redis_stream::{DispatchMetrics, RedisConnectionManager, RedisStreamDispatcher};
