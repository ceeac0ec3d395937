use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use macct_api::{create_app, AppState};
use macct_application::{JobService, ReconcileService};
use macct_config::AppConfig;
use macct_infrastructure::{
    run_migrations, BroadcastEventNotifier, PostgresOperationRepository, RedisStreamDispatcher,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast;
use tracing::info;

/// 应用实例：聚合数据库、流后端与HTTP服务
pub struct Application {
    config: AppConfig,
    job_service: Arc<JobService>,
    metrics_handle: Option<PrometheusHandle>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate().context("配置验证失败")?;

        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(Duration::from_secs(
                config.database.connection_timeout_seconds,
            ))
            .connect(&config.database.url)
            .await
            .context("连接PostgreSQL失败")?;
        run_migrations(&pool).await.context("数据库迁移失败")?;
        info!("数据库连接就绪");

        let store = Arc::new(PostgresOperationRepository::new(pool));
        let stream = Arc::new(
            RedisStreamDispatcher::new(config.redis.clone())
                .await
                .context("连接Redis失败")?,
        );
        let notifier = Arc::new(BroadcastEventNotifier::default());

        let job_service = Arc::new(JobService::new(
            store,
            stream,
            notifier,
            config.dispatch.clone(),
        ));
        job_service
            .ensure_infrastructure()
            .await
            .context("初始化消费者组失败")?;

        let metrics_handle = if config.observability.metrics_enabled {
            Some(
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("安装Prometheus指标导出器失败")?,
            )
        } else {
            None
        };

        Ok(Self {
            config,
            job_service,
            metrics_handle,
        })
    }

    /// 启动补偿扫描与HTTP服务器，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let reconciler = ReconcileService::new(
            self.job_service.clone(),
            self.config.dispatch.reconcile_interval_seconds,
        );
        let reconciler_rx = shutdown_rx.resubscribe();
        let reconciler_handle = tokio::spawn(async move {
            reconciler.run(reconciler_rx).await;
        });

        let app = create_app(
            AppState {
                job_service: self.job_service.clone(),
                metrics_handle: self.metrics_handle.clone(),
            },
            self.config.api.cors_enabled,
        );

        let listener = tokio::net::TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
        info!("HTTP服务监听 {}", self.config.api.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .context("HTTP服务异常退出")?;

        let _ = reconciler_handle.await;
        info!("应用组件已全部停止");
        Ok(())
    }
}
