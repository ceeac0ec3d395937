//! 修复任务编排服务

use std::sync::Arc;

use chrono::Utc;
use macct_config::DispatchConfig;
use macct_domain::constants::{
    MAX_ERROR_MESSAGE_LENGTH, MAX_HOSTNAME_LENGTH, REPAIR_DLQ_STREAM, REPAIR_JOB_STREAM,
    REPAIR_WORKER_GROUP,
};
use macct_domain::entities::{
    Operation, OperationFilter, OperationPage, OperationStatus, OperationUpdate,
};
use macct_domain::events::{EventNotifier, JobEvent};
use macct_domain::messaging::{
    ClaimedEntry, DeadLetterMessage, PendingEntry, PendingSummary, RepairJobMessage,
    StreamDispatcher, StreamInfo,
};
use macct_domain::repositories::OperationRepository;
use macct_errors::{DispatchError, DispatchResult};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 创建请求的结果：`queued=false`表示命中了主机上已有的活跃任务
#[derive(Debug, Clone, Serialize)]
pub struct CreateJobOutcome {
    pub operation: Operation,
    pub queued: bool,
    pub message: String,
}

/// worker回报的状态变更
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: OperationStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// worker可以回报它观察到的attempt，缺省不改动
    pub attempt: Option<i32>,
}

impl StatusUpdate {
    pub fn new(status: OperationStatus) -> Self {
        Self {
            status,
            result: None,
            error: None,
            attempt: None,
        }
    }
}

/// 重试请求的结果：`success=false`表示重试名额耗尽并已转入死信
#[derive(Debug, Clone, Serialize)]
pub struct RetryOutcome {
    pub success: bool,
    pub attempt: i32,
    pub message: String,
}

/// 监控查询的降级结果
///
/// 流后端不可用时监控接口返回错误描述而不是失败，
/// 任务数据面不受影响。
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MonitorOutcome<T> {
    Ok(T),
    Degraded { available: bool, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamOverview {
    pub stream: String,
    pub info: StreamInfo,
    pub dlq: StreamInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingReport {
    pub summary: PendingSummary,
    pub entries: Vec<PendingEntry>,
}

/// 认领结果：逐条解析失败不打断整体，收集到errors里
#[derive(Debug, Clone, Serialize)]
pub struct ClaimReport {
    pub consumer: String,
    pub claimed: usize,
    pub entries: Vec<ClaimedEntry>,
    pub errors: Vec<String>,
}

/// 修复任务编排服务
///
/// 任务数据面（仓储）是权威，流只是投递通道；先写库再发流，
/// 发流失败不回滚，由补偿扫描兜底重发。
pub struct JobService {
    store: Arc<dyn OperationRepository>,
    stream: Arc<dyn StreamDispatcher>,
    notifier: Arc<dyn EventNotifier>,
    policy: DispatchConfig,
}

impl JobService {
    pub fn new(
        store: Arc<dyn OperationRepository>,
        stream: Arc<dyn StreamDispatcher>,
        notifier: Arc<dyn EventNotifier>,
        policy: DispatchConfig,
    ) -> Self {
        Self {
            store,
            stream,
            notifier,
            policy,
        }
    }

    /// 启动时的流侧准备：消费者组不存在则创建（幂等）
    pub async fn ensure_infrastructure(&self) -> DispatchResult<()> {
        self.stream
            .ensure_group(REPAIR_JOB_STREAM, REPAIR_WORKER_GROUP)
            .await?;
        info!(
            stream = REPAIR_JOB_STREAM,
            group = REPAIR_WORKER_GROUP,
            "消费者组就绪"
        );
        Ok(())
    }

    /// 幂等创建修复任务
    ///
    /// 同一主机上已有非终态任务时返回该任务且不再入队。
    /// 入队失败不撤销任务，留给补偿扫描重发。
    #[instrument(skip(self, options), fields(hostname = %hostname, school = %school))]
    pub async fn create_repair_job(
        &self,
        hostname: &str,
        school: &str,
        options: serde_json::Value,
    ) -> DispatchResult<CreateJobOutcome> {
        let hostname = hostname.trim();
        let school = school.trim();
        if hostname.is_empty() {
            return Err(DispatchError::validation_error("hostname不能为空"));
        }
        if hostname.len() > MAX_HOSTNAME_LENGTH {
            return Err(DispatchError::validation_error(format!(
                "hostname超长(最大{MAX_HOSTNAME_LENGTH}字符)"
            )));
        }
        if school.is_empty() {
            return Err(DispatchError::validation_error("school不能为空"));
        }

        if let Some(active) = self.store.find_active_by_host(hostname).await? {
            debug!(
                operation_id = %active.id,
                status = %active.status,
                "主机上已有活跃任务, 跳过创建"
            );
            return Ok(CreateJobOutcome {
                operation: active,
                queued: false,
                message: "Job already queued".to_string(),
            });
        }

        let operation = Operation::new(hostname.to_string(), school.to_string(), options);
        let mut created = self.store.create(&operation).await?;

        match self.publish_job(&created).await {
            Ok(stream_id) => {
                created = self
                    .store
                    .update(
                        created.id,
                        OperationUpdate {
                            stream_id: Some(Some(stream_id.clone())),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(operation_id = %created.id, stream_id = %stream_id, "修复任务已入队");
            }
            Err(e) => {
                // 任务保留pending且无stream_id，补偿扫描会重发
                warn!(operation_id = %created.id, error = %e, "入队失败, 等待补偿扫描重发");
            }
        }

        self.emit(JobEvent::Created {
            operation_id: created.id,
            hostname: created.target_host.clone(),
            school: created.school.clone(),
            occurred_at: Utc::now(),
        })
        .await;

        Ok(CreateJobOutcome {
            operation: created,
            queued: true,
            message: "Repair job queued".to_string(),
        })
    }

    /// worker回报状态；已完成的任务不可再变更
    #[instrument(skip(self, update), fields(operation_id = %id, status = %update.status))]
    pub async fn update_operation_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
    ) -> DispatchResult<Operation> {
        let operation = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(DispatchError::OperationNotFound { id })?;

        if operation.status == OperationStatus::Completed {
            return Err(DispatchError::invalid_transition(
                operation.status.as_str(),
                update.status.as_str(),
            ));
        }

        let error = update.error.map(|e| truncate_error(&e));
        let updated = self
            .store
            .update(
                id,
                OperationUpdate {
                    status: Some(update.status),
                    result: update.result,
                    error: Some(error),
                    attempt: update.attempt,
                    ..Default::default()
                },
            )
            .await?;

        self.emit(JobEvent::Updated {
            operation_id: updated.id,
            hostname: updated.target_host.clone(),
            status: updated.status,
            result: updated.result.clone(),
            error: updated.error.clone(),
            occurred_at: Utc::now(),
        })
        .await;

        Ok(updated)
    }

    /// 有界重试
    ///
    /// 名额未耗尽：attempt加一、清空error、回到retrying并重新入队；
    /// 耗尽（已重试max_retries次）：写入死信流并标记failed。
    #[instrument(skip(self), fields(operation_id = %id))]
    pub async fn retry_job(&self, id: Uuid) -> DispatchResult<RetryOutcome> {
        let operation = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(DispatchError::OperationNotFound { id })?;

        if operation.status == OperationStatus::Completed {
            return Err(DispatchError::invalid_transition(
                operation.status.as_str(),
                OperationStatus::Retrying.as_str(),
            ));
        }

        if operation.attempt >= self.policy.max_retries {
            let failed = self.move_to_dlq(&operation).await?;
            return Ok(RetryOutcome {
                success: false,
                attempt: failed.attempt,
                message: format!(
                    "重试次数已达上限({}), 任务已转入死信队列",
                    self.policy.max_retries
                ),
            });
        }

        // 先清掉上一轮的error和stream_id再发布：发布失败时任务留在
        // retrying且无stream_id，补偿扫描能扫到它
        let attempt = operation.attempt + 1;
        let mut updated = self
            .store
            .update(
                id,
                OperationUpdate {
                    status: Some(OperationStatus::Retrying),
                    attempt: Some(attempt),
                    error: Some(None),
                    stream_id: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        match self.publish_job(&updated).await {
            Ok(stream_id) => {
                updated = self
                    .store
                    .update(
                        id,
                        OperationUpdate {
                            stream_id: Some(Some(stream_id)),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(operation_id = %id, attempt, "重试消息已入队");
            }
            Err(e) => {
                warn!(operation_id = %id, attempt, error = %e, "重试入队失败, 等待补偿扫描重发");
            }
        }

        self.emit(JobEvent::Retrying {
            operation_id: updated.id,
            hostname: updated.target_host.clone(),
            attempt,
            occurred_at: Utc::now(),
        })
        .await;

        Ok(RetryOutcome {
            success: true,
            attempt,
            message: format!("第{attempt}次重试已入队"),
        })
    }

    /// 写入死信流并把任务标记为failed
    ///
    /// 先追加死信再改库：死信写入失败时任务保持原状，调用方可重试。
    pub async fn move_to_dlq(&self, operation: &Operation) -> DispatchResult<Operation> {
        let message = DeadLetterMessage::from_operation(operation, Utc::now());
        let dlq_id = self
            .stream
            .publish(REPAIR_DLQ_STREAM, &message.to_fields()?)
            .await?;
        error!(
            operation_id = %operation.id,
            hostname = %operation.target_host,
            dlq_id = %dlq_id,
            attempt = operation.attempt,
            "修复任务重试耗尽, 已转入死信队列"
        );

        let failed = self
            .store
            .update(
                operation.id,
                OperationUpdate {
                    status: Some(OperationStatus::Failed),
                    ..Default::default()
                },
            )
            .await?;

        self.emit(JobEvent::Failed {
            operation_id: failed.id,
            hostname: failed.target_host.clone(),
            attempt: failed.attempt,
            last_error: failed.error.clone(),
            occurred_at: Utc::now(),
        })
        .await;

        Ok(failed)
    }

    pub async fn get_operation_status(&self, id: Uuid) -> DispatchResult<Operation> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(DispatchError::OperationNotFound { id })
    }

    pub async fn list_macct_jobs(&self, filter: &OperationFilter) -> DispatchResult<OperationPage> {
        self.store.list(filter).await
    }

    /// 工作流与死信流的长度概览；流后端不可用时降级返回错误描述
    pub async fn get_stream_info(&self) -> DispatchResult<MonitorOutcome<StreamOverview>> {
        let info = match self.stream.stream_info(REPAIR_JOB_STREAM).await {
            Ok(info) => info,
            Err(e) => return Ok(degraded("stream_info", e)),
        };
        let dlq = match self.stream.stream_info(REPAIR_DLQ_STREAM).await {
            Ok(info) => info,
            Err(e) => return Ok(degraded("stream_info", e)),
        };
        Ok(MonitorOutcome::Ok(StreamOverview {
            stream: REPAIR_JOB_STREAM.to_string(),
            info,
            dlq,
        }))
    }

    /// 挂起消息巡检：汇总加明细
    pub async fn get_pending_jobs(
        &self,
        count: usize,
    ) -> DispatchResult<MonitorOutcome<PendingReport>> {
        let summary = match self
            .stream
            .pending_summary(REPAIR_JOB_STREAM, REPAIR_WORKER_GROUP)
            .await
        {
            Ok(summary) => summary,
            Err(e) => return Ok(degraded("pending_summary", e)),
        };
        let entries = if summary.total > 0 {
            match self
                .stream
                .pending_detail(REPAIR_JOB_STREAM, REPAIR_WORKER_GROUP, "-", "+", count)
                .await
            {
                Ok(entries) => entries,
                Err(e) => return Ok(degraded("pending_detail", e)),
            }
        } else {
            Vec::new()
        };
        Ok(MonitorOutcome::Ok(PendingReport { summary, entries }))
    }

    /// 认领停滞消息（崩溃恢复）
    ///
    /// 流后端不可用时与其他监控调用一样降级；认领回来的消息逐条核对
    /// 字段，坏消息记入errors但不中断，对应的任务回写为retrying。
    #[instrument(skip(self))]
    pub async fn claim_stuck_jobs(
        &self,
        consumer: Option<&str>,
        min_idle_ms: Option<u64>,
        batch: Option<usize>,
    ) -> DispatchResult<MonitorOutcome<ClaimReport>> {
        let consumer = consumer
            .map(str::to_string)
            .unwrap_or_else(|| self.policy.claim_consumer.clone());
        let min_idle_ms = min_idle_ms.unwrap_or(self.policy.claim_min_idle_ms);
        let batch = batch.unwrap_or(self.policy.claim_batch);

        let entries = match self
            .stream
            .claim_stuck(
                REPAIR_JOB_STREAM,
                REPAIR_WORKER_GROUP,
                &consumer,
                min_idle_ms,
                batch,
            )
            .await
        {
            Ok(entries) => entries,
            Err(e) => return Ok(degraded("claim_stuck", e)),
        };

        let mut errors = Vec::new();
        for entry in &entries {
            let message = match RepairJobMessage::from_fields(&entry.fields) {
                Ok(message) => message,
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "认领到无法解析的消息");
                    errors.push(format!("{}: {e}", entry.id));
                    continue;
                }
            };
            // 任务可能已终态（worker死前已完成但没来得及ack），跳过回写
            match self.store.find_by_id(message.operation_id).await {
                Ok(Some(op)) if !op.is_terminal() => {
                    if let Err(e) = self
                        .store
                        .update(
                            op.id,
                            OperationUpdate {
                                status: Some(OperationStatus::Retrying),
                                ..Default::default()
                            },
                        )
                        .await
                    {
                        errors.push(format!("{}: {e}", entry.id));
                    }
                }
                Ok(_) => {}
                Err(e) => errors.push(format!("{}: {e}", entry.id)),
            }
        }

        if !entries.is_empty() {
            info!(
                consumer = %consumer,
                claimed = entries.len(),
                parse_errors = errors.len(),
                "停滞消息认领完成"
            );
        }

        Ok(MonitorOutcome::Ok(ClaimReport {
            consumer,
            claimed: entries.len(),
            entries,
            errors,
        }))
    }

    /// 补偿扫描：重发写库成功但没发上流的任务
    ///
    /// 覆盖pending和retrying两种无stream_id的情况，返回本轮成功重发的条数。
    #[instrument(skip(self))]
    pub async fn reconcile_undispatched(&self) -> DispatchResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.policy.reconcile_age_seconds as i64);
        let stranded = self.store.find_undispatched(cutoff).await?;
        if stranded.is_empty() {
            return Ok(0);
        }

        let mut republished = 0;
        for operation in &stranded {
            match self.publish_job(operation).await {
                Ok(stream_id) => {
                    self.store
                        .update(
                            operation.id,
                            OperationUpdate {
                                stream_id: Some(Some(stream_id)),
                                ..Default::default()
                            },
                        )
                        .await?;
                    republished += 1;
                }
                Err(e) => {
                    warn!(operation_id = %operation.id, error = %e, "补偿重发失败");
                }
            }
        }
        info!(
            found = stranded.len(),
            republished, "补偿扫描结束"
        );
        Ok(republished)
    }

    async fn publish_job(&self, operation: &Operation) -> DispatchResult<String> {
        let fields = RepairJobMessage::from_operation(operation).to_fields()?;
        self.stream.publish(REPAIR_JOB_STREAM, &fields).await
    }

    /// 事件发布失败只记录日志；通知是尽力而为，不影响任务流程
    async fn emit(&self, event: JobEvent) {
        if let Err(e) = self.notifier.publish(&event).await {
            warn!(event_type = event.event_type(), error = %e, "事件发布失败");
        }
    }
}

fn degraded<T>(call: &str, error: DispatchError) -> MonitorOutcome<T> {
    warn!(call, error = %error, "流后端查询失败, 监控结果降级");
    MonitorOutcome::Degraded {
        available: false,
        error: error.to_string(),
    }
}

fn truncate_error(error: &str) -> String {
    if error.len() <= MAX_ERROR_MESSAGE_LENGTH {
        return error.to_string();
    }
    let mut end = MAX_ERROR_MESSAGE_LENGTH;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    error[..end].to_string()
}
