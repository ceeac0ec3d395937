use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use macct_config::RedisConfig;
use macct_domain::constants::REPAIR_DLQ_STREAM;
use macct_domain::messaging::{
    ClaimedEntry, ConsumerPending, PendingEntry, PendingSummary, StreamDispatcher, StreamInfo,
};
use macct_errors::{DispatchError, DispatchResult};
use redis::Value;
use tracing::{debug, info};

use super::connection_manager::RedisConnectionManager;
use super::metrics::DispatchMetrics;

/// 基于Redis Stream的流投递实现
///
/// 发布靠XADD，组生命周期靠XGROUP，巡检靠XPENDING，
/// 崩溃恢复认领靠XAUTOCLAIM。
pub struct RedisStreamDispatcher {
    connection_manager: Arc<RedisConnectionManager>,
    metrics: Arc<DispatchMetrics>,
}

impl RedisStreamDispatcher {
    pub async fn new(config: RedisConfig) -> DispatchResult<Self> {
        let metrics = Arc::new(DispatchMetrics::default());
        let connection_manager =
            Arc::new(RedisConnectionManager::new(config, metrics.clone()).await?);
        Ok(Self {
            connection_manager,
            metrics,
        })
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        self.metrics.clone()
    }

    pub async fn health_check(&self) -> DispatchResult<()> {
        self.connection_manager.ping().await
    }

    fn validate_stream_name(stream: &str) -> DispatchResult<()> {
        if stream.is_empty() {
            return Err(DispatchError::MessageQueue(
                "Stream name cannot be empty".to_string(),
            ));
        }
        if stream.contains(' ') || stream.contains('\n') || stream.contains('\r') {
            return Err(DispatchError::MessageQueue(
                "Stream name contains invalid characters".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StreamDispatcher for RedisStreamDispatcher {
    async fn ensure_group(&self, stream: &str, group: &str) -> DispatchResult<()> {
        Self::validate_stream_name(stream)?;
        debug!(
            "Ensuring consumer group {} for stream {}",
            group, stream
        );

        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$") // 新组定位在流尾部
            .arg("MKSTREAM"); // 流不存在则一并创建

        match self
            .connection_manager
            .execute_command::<String>(&mut cmd)
            .await
        {
            Ok(_) => {
                info!("Created consumer group {} on stream {}", group, stream);
                Ok(())
            }
            Err(e) => {
                // 组已存在是幂等成功，不是错误
                if e.to_string().contains("BUSYGROUP") {
                    debug!("Consumer group {} already exists", group);
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn publish(&self, stream: &str, fields: &[(String, String)]) -> DispatchResult<String> {
        Self::validate_stream_name(stream)?;
        if fields.is_empty() {
            return Err(DispatchError::MessageQueue(
                "Cannot publish entry without fields".to_string(),
            ));
        }

        let start = Instant::now();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (key, value) in fields {
            cmd.arg(key).arg(value);
        }

        let id: String = self.connection_manager.execute_command(&mut cmd).await?;

        self.metrics.record_entry_published();
        if stream == REPAIR_DLQ_STREAM {
            self.metrics.record_dlq_appended();
        }
        self.metrics
            .record_operation_duration("publish", start.elapsed().as_millis() as f64);
        debug!("Published entry {} to stream {}", id, stream);
        Ok(id)
    }

    async fn pending_summary(&self, stream: &str, group: &str) -> DispatchResult<PendingSummary> {
        Self::validate_stream_name(stream)?;
        let mut cmd = redis::cmd("XPENDING");
        cmd.arg(stream).arg(group);
        let value: Value = self.connection_manager.execute_command(&mut cmd).await?;
        parse_pending_summary(&value)
    }

    async fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        start: &str,
        end: &str,
        count: usize,
    ) -> DispatchResult<Vec<PendingEntry>> {
        Self::validate_stream_name(stream)?;
        let mut cmd = redis::cmd("XPENDING");
        cmd.arg(stream).arg(group).arg(start).arg(end).arg(count);
        let value: Value = self.connection_manager.execute_command(&mut cmd).await?;
        parse_pending_detail(&value)
    }

    async fn claim_stuck(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        batch: usize,
    ) -> DispatchResult<Vec<ClaimedEntry>> {
        Self::validate_stream_name(stream)?;
        let start = Instant::now();

        let mut cmd = redis::cmd("XAUTOCLAIM");
        cmd.arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(batch);

        let value: Value = self.connection_manager.execute_command(&mut cmd).await?;
        let claimed = parse_autoclaim_reply(&value)?;

        self.metrics.record_entries_claimed(claimed.len() as u64);
        self.metrics
            .record_operation_duration("claim_stuck", start.elapsed().as_millis() as f64);
        if !claimed.is_empty() {
            info!(
                "Claimed {} stuck entries on {} for consumer {}",
                claimed.len(),
                stream,
                consumer
            );
        }
        Ok(claimed)
    }

    async fn stream_info(&self, stream: &str) -> DispatchResult<StreamInfo> {
        Self::validate_stream_name(stream)?;

        let mut len_cmd = redis::cmd("XLEN");
        len_cmd.arg(stream);
        let length: u64 = self.connection_manager.execute_command(&mut len_cmd).await?;

        let mut first_cmd = redis::cmd("XRANGE");
        first_cmd.arg(stream).arg("-").arg("+").arg("COUNT").arg(1);
        let first: Value = self.connection_manager.execute_command(&mut first_cmd).await?;

        let mut last_cmd = redis::cmd("XREVRANGE");
        last_cmd.arg(stream).arg("+").arg("-").arg("COUNT").arg(1);
        let last: Value = self.connection_manager.execute_command(&mut last_cmd).await?;

        Ok(StreamInfo {
            length,
            first_id: parse_first_entry_id(&first)?,
            last_id: parse_first_entry_id(&last)?,
        })
    }
}

fn value_as_array(value: &Value) -> Option<&[Value]> {
    match value {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::BulkString(bytes) => String::from_utf8_lossy(bytes).parse().ok(),
        Value::SimpleString(s) => s.parse().ok(),
        _ => None,
    }
}

fn reply_error(context: &str) -> DispatchError {
    DispatchError::MessageQueue(format!("Unexpected Redis reply shape: {context}"))
}

/// XPENDING汇总形式：[total, min-id, max-id, [[consumer, count], ...]]
fn parse_pending_summary(value: &Value) -> DispatchResult<PendingSummary> {
    let items = value_as_array(value).ok_or_else(|| reply_error("XPENDING summary"))?;
    if items.is_empty() {
        return Ok(PendingSummary {
            total: 0,
            min_id: None,
            max_id: None,
            consumers: Vec::new(),
        });
    }
    if items.len() < 4 {
        return Err(reply_error("XPENDING summary arity"));
    }

    let total = value_as_i64(&items[0]).ok_or_else(|| reply_error("XPENDING total"))?;
    let min_id = value_as_string(&items[1]);
    let max_id = value_as_string(&items[2]);

    let mut consumers = Vec::new();
    if let Some(entries) = value_as_array(&items[3]) {
        for entry in entries {
            let pair = value_as_array(entry).ok_or_else(|| reply_error("XPENDING consumer"))?;
            if pair.len() < 2 {
                return Err(reply_error("XPENDING consumer arity"));
            }
            consumers.push(ConsumerPending {
                name: value_as_string(&pair[0])
                    .ok_or_else(|| reply_error("XPENDING consumer name"))?,
                pending: value_as_i64(&pair[1])
                    .ok_or_else(|| reply_error("XPENDING consumer count"))?,
            });
        }
    }

    Ok(PendingSummary {
        total,
        min_id,
        max_id,
        consumers,
    })
}

/// XPENDING明细形式：[[id, consumer, idle-ms, delivery-count], ...]
fn parse_pending_detail(value: &Value) -> DispatchResult<Vec<PendingEntry>> {
    let items = match value {
        Value::Nil => return Ok(Vec::new()),
        other => value_as_array(other).ok_or_else(|| reply_error("XPENDING detail"))?,
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let parts = value_as_array(item).ok_or_else(|| reply_error("XPENDING detail entry"))?;
        if parts.len() < 4 {
            return Err(reply_error("XPENDING detail arity"));
        }
        entries.push(PendingEntry {
            id: value_as_string(&parts[0]).ok_or_else(|| reply_error("pending id"))?,
            consumer: value_as_string(&parts[1]).ok_or_else(|| reply_error("pending consumer"))?,
            idle_ms: value_as_i64(&parts[2]).ok_or_else(|| reply_error("pending idle"))?.max(0)
                as u64,
            delivery_count: value_as_i64(&parts[3])
                .ok_or_else(|| reply_error("pending deliveries"))?
                .max(0) as u64,
        });
    }
    Ok(entries)
}

/// XAUTOCLAIM形式：[next-cursor, [[id, [k, v, ...]], ...], (deleted-ids)]
fn parse_autoclaim_reply(value: &Value) -> DispatchResult<Vec<ClaimedEntry>> {
    let items = value_as_array(value).ok_or_else(|| reply_error("XAUTOCLAIM"))?;
    if items.len() < 2 {
        return Err(reply_error("XAUTOCLAIM arity"));
    }
    parse_entry_list(&items[1])
}

fn parse_entry_list(value: &Value) -> DispatchResult<Vec<ClaimedEntry>> {
    let items = match value {
        Value::Nil => return Ok(Vec::new()),
        other => value_as_array(other).ok_or_else(|| reply_error("entry list"))?,
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        // XAUTOCLAIM删除过的消息以Nil占位
        if matches!(item, Value::Nil) {
            continue;
        }
        let parts = value_as_array(item).ok_or_else(|| reply_error("stream entry"))?;
        if parts.len() < 2 {
            return Err(reply_error("stream entry arity"));
        }
        let id = value_as_string(&parts[0]).ok_or_else(|| reply_error("entry id"))?;
        let mut fields = HashMap::new();
        match &parts[1] {
            Value::Array(kv) => {
                for chunk in kv.chunks(2) {
                    if chunk.len() == 2 {
                        if let (Some(k), Some(v)) =
                            (value_as_string(&chunk[0]), value_as_string(&chunk[1]))
                        {
                            fields.insert(k, v);
                        }
                    }
                }
            }
            Value::Map(pairs) => {
                for (k, v) in pairs {
                    if let (Some(k), Some(v)) = (value_as_string(k), value_as_string(v)) {
                        fields.insert(k, v);
                    }
                }
            }
            Value::Nil => {}
            _ => return Err(reply_error("entry fields")),
        }
        entries.push(ClaimedEntry { id, fields });
    }
    Ok(entries)
}

/// XRANGE/XREVRANGE COUNT 1 的回复中取第一条消息的ID
fn parse_first_entry_id(value: &Value) -> DispatchResult<Option<String>> {
    let entries = parse_entry_list(value)?;
    Ok(entries.into_iter().next().map(|e| e.id))
}
