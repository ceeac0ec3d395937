//! 应用配置
//!
//! 配置来源：TOML文件（可选） + `MACCTD__`前缀的环境变量覆盖。
//! 各分节都有可用的默认值，零配置即可在本机起一个开发实例。

use macct_domain::constants::{
    DEFAULT_CLAIM_BATCH, DEFAULT_CLAIM_MIN_IDLE_MS, DEFAULT_MAX_RETRIES,
    DEFAULT_RECONCILE_AGE_SECONDS, DEFAULT_RECONCILE_INTERVAL_SECONDS,
};
use macct_errors::{DispatchError, DispatchResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub dispatch: DispatchConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/macctd".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub connection_timeout_seconds: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connection_timeout_seconds: 30,
            max_retry_attempts: 3,
            retry_delay_seconds: 1,
        }
    }
}

/// 投递策略：重试上限、认领阈值与补偿扫描参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_retries: i32,
    pub claim_min_idle_ms: u64,
    pub claim_batch: usize,
    /// 认领时的默认消费者名，缺省取机器主机名
    pub claim_consumer: String,
    pub reconcile_interval_seconds: u64,
    pub reconcile_age_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            claim_min_idle_ms: DEFAULT_CLAIM_MIN_IDLE_MS,
            claim_batch: DEFAULT_CLAIM_BATCH,
            claim_consumer: default_consumer_name(),
            reconcile_interval_seconds: DEFAULT_RECONCILE_INTERVAL_SECONDS,
            reconcile_age_seconds: DEFAULT_RECONCILE_AGE_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
        }
    }
}

fn default_consumer_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "macctd-recovery".to_string())
}

impl RedisConfig {
    pub fn build_connection_url(&self) -> String {
        if let Some(password) = &self.password {
            format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            )
        } else {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        }
    }
}

impl AppConfig {
    /// 加载配置；path为None时只用默认值和环境变量
    pub fn load(path: Option<&str>) -> DispatchResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("MACCTD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DispatchError::config_error(format!("读取配置失败: {e}")))?;

        let app_config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| DispatchError::config_error(format!("解析配置失败: {e}")))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.database.url.is_empty() {
            return Err(DispatchError::config_error("database.url 不能为空"));
        }
        if self.database.max_connections < self.database.min_connections {
            return Err(DispatchError::config_error(
                "database.max_connections 不能小于 min_connections",
            ));
        }
        if self.dispatch.max_retries < 1 {
            return Err(DispatchError::config_error("dispatch.max_retries 至少为1"));
        }
        if self.dispatch.claim_batch == 0 {
            return Err(DispatchError::config_error("dispatch.claim_batch 至少为1"));
        }
        if self.api.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(DispatchError::config_error(format!(
                "api.bind_address 不是合法的监听地址: {}",
                self.api.bind_address
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.max_retries, 3);
        assert_eq!(config.dispatch.claim_min_idle_ms, 300_000);
    }

    #[test]
    fn test_redis_connection_url() {
        let mut redis = RedisConfig::default();
        assert_eq!(redis.build_connection_url(), "redis://127.0.0.1:6379/0");
        redis.password = Some("secret".to_string());
        assert_eq!(
            redis.build_connection_url(),
            "redis://:secret@127.0.0.1:6379/0"
        );
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[dispatch]
max_retries = 5
claim_batch = 20

[api]
bind_address = "127.0.0.1:9090"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.dispatch.max_retries, 5);
        assert_eq!(config.dispatch.claim_batch, 20);
        assert_eq!(config.api.bind_address, "127.0.0.1:9090");
        // 未覆盖的分节保持默认
        assert_eq!(config.redis.port, 6379);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.dispatch.max_retries = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.api.bind_address = "not-an-addr".to_string();
        assert!(config.validate().is_err());
    }
}
