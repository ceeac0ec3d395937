//! 双写缝隙的补偿扫描
//!
//! 写库成功但发流失败的任务会停留在pending且没有流消息引用，
//! 本服务周期性把这类任务重新发上工作流。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::job_service::JobService;

pub struct ReconcileService {
    job_service: Arc<JobService>,
    interval: Duration,
}

impl ReconcileService {
    pub fn new(job_service: Arc<JobService>, interval_seconds: u64) -> Self {
        Self {
            job_service,
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    /// 周期扫描直到收到停机信号
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_seconds = self.interval.as_secs(), "补偿扫描启动");
        let mut ticker = tokio::time::interval(self.interval);
        // 第一次tick立即到期，跳过它避免启动时与正常创建竞争
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.job_service.reconcile_undispatched().await {
                        error!(error = %e, "补偿扫描失败");
                    }
                }
                _ = shutdown.recv() => {
                    info!("补偿扫描收到停机信号, 退出");
                    break;
                }
            }
        }
    }
}
