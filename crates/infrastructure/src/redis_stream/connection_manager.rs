use std::sync::Arc;
use std::time::Duration;

use macct_config::RedisConfig;
use macct_errors::{DispatchError, DispatchResult};
use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::metrics::DispatchMetrics;
use super::rate_limiter::LogRateLimiter;

/// Redis连接管理
///
/// 持有client与一条multiplexed连接，断连后按配置的次数与间隔重连。
/// 重连告警经过限流器，避免后端长时间不可用时刷屏。
pub struct RedisConnectionManager {
    client: Client,
    config: RedisConfig,
    metrics: Arc<DispatchMetrics>,
    connection: tokio::sync::Mutex<Option<MultiplexedConnection>>,
    reconnect_log: LogRateLimiter,
}

impl RedisConnectionManager {
    pub async fn new(
        config: RedisConfig,
        metrics: Arc<DispatchMetrics>,
    ) -> DispatchResult<Self> {
        let redis_url = config.build_connection_url();
        let client = Client::open(redis_url).map_err(|e| {
            DispatchError::MessageQueue(format!("Failed to create Redis client: {e}"))
        })?;

        let manager = Self {
            client,
            config,
            metrics,
            connection: tokio::sync::Mutex::new(None),
            reconnect_log: LogRateLimiter::new(Duration::from_secs(10)),
        };
        manager.connection().await?;
        debug!(
            "Successfully connected to Redis at {}:{}",
            manager.config.host, manager.config.port
        );
        Ok(manager)
    }

    async fn connection(&self) -> DispatchResult<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let mut last_error = None;
        for attempt in 0..self.config.max_retry_attempts.max(1) {
            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    if attempt > 0 {
                        debug!(
                            "Successfully reconnected to Redis after {} attempts",
                            attempt + 1
                        );
                    }
                    self.metrics.set_active_connections(1);
                    *guard = Some(conn.clone());
                    return Ok(conn);
                }
                Err(e) => {
                    self.metrics.record_connection_error();
                    if self.reconnect_log.allow() {
                        warn!(
                            "Redis connection attempt {} failed: {}",
                            attempt + 1,
                            e
                        );
                    }
                    last_error = Some(e);
                    sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
                }
            }
        }

        self.metrics.set_active_connections(0);
        Err(DispatchError::MessageQueue(format!(
            "Failed to connect to Redis after {} attempts: {}",
            self.config.max_retry_attempts,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        )))
    }

    /// 执行一条命令；IO类错误会丢弃缓存连接，下次调用触发重连
    pub async fn execute_command<T: redis::FromRedisValue>(
        &self,
        cmd: &mut redis::Cmd,
    ) -> DispatchResult<T> {
        let mut conn = self.connection().await?;
        match cmd.query_async::<T>(&mut conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    self.metrics.record_connection_error();
                    self.metrics.set_active_connections(0);
                    let mut guard = self.connection.lock().await;
                    *guard = None;
                }
                Err(DispatchError::MessageQueue(format!(
                    "Redis command failed: {e}"
                )))
            }
        }
    }

    pub async fn ping(&self) -> DispatchResult<()> {
        let pong: String = self.execute_command(&mut redis::cmd("PING")).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(DispatchError::MessageQueue(format!(
                "Unexpected PING reply: {pong}"
            )))
        }
    }
}
