//! # 系统常量定义
//!
//! 机器账号修复调度子系统的固定标识符与默认值

/// 系统名称
pub const SYSTEM_NAME: &str = "macctd";

/// 修复任务类型（固定值，写入每条流消息）
pub const REPAIR_JOB_TYPE: &str = "macct_repair";

/// 工作流（待处理修复任务的append-only日志）
pub const REPAIR_JOB_STREAM: &str = "macct_repair_jobs";

/// 竞争消费者组（域控制器上的worker进程）
pub const REPAIR_WORKER_GROUP: &str = "macct_repair_workers";

/// 死信流（重试耗尽的任务，独立于工作流）
pub const REPAIR_DLQ_STREAM: &str = "macct_repair_dlq";

/// 请求未携带租户标签时使用的学校标签
pub const DEFAULT_SCHOOL: &str = "default-school";

/// 最大重试次数
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// 停滞消息认领的空闲阈值（毫秒）
pub const DEFAULT_CLAIM_MIN_IDLE_MS: u64 = 300_000;

/// 单次认领的最大消息数，防止回收风暴
pub const DEFAULT_CLAIM_BATCH: usize = 10;

/// 未投递任务补偿扫描的最小任务年龄（秒）
pub const DEFAULT_RECONCILE_AGE_SECONDS: u64 = 60;

/// 补偿扫描间隔（秒）
pub const DEFAULT_RECONCILE_INTERVAL_SECONDS: u64 = 30;

/// 主机名最大长度
pub const MAX_HOSTNAME_LENGTH: usize = 255;

/// 错误消息最大长度
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 2048;
