//! Redis Stream流投递模块
//!
//! 按单一职责拆分：连接管理、指标收集、流操作。
//! 所有Redis访问都经过 [`RedisConnectionManager`]，
//! 后端错误统一包装为 `DispatchError::MessageQueue`。

pub mod connection_manager;
pub mod dispatcher;
pub mod metrics;
pub mod rate_limiter;

pub use connection_manager::RedisConnectionManager;
pub use dispatcher::RedisStreamDispatcher;
pub use metrics::DispatchMetrics;
pub use rate_limiter::LogRateLimiter;
