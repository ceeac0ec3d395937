//! 应用服务层
//!
//! JobService负责修复任务的编排：幂等创建、状态迁移、有界重试与死信、
//! 停滞消息认领；ReconcileService负责双写缝隙的补偿扫描。

pub mod job_service;
pub mod reconciler;

pub use job_service::{
    ClaimReport, CreateJobOutcome, JobService, MonitorOutcome, PendingReport, RetryOutcome,
    StatusUpdate, StreamOverview,
};
pub use reconciler::ReconcileService;
