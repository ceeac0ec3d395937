use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use async_trait::async_trait;
use macct_domain::messaging::{
    ClaimedEntry, ConsumerPending, PendingEntry, PendingSummary, StreamDispatcher, StreamInfo,
};
use macct_errors::{DispatchError, DispatchResult};
use tokio::sync::RwLock;
use tracing::debug;

/// 流内消息ID，与Redis的`<毫秒>-<序号>`形式一致
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct EntryId {
    ms: u64,
    seq: u64,
}

impl EntryId {
    const ZERO: EntryId = EntryId { ms: 0, seq: 0 };
    const MAX: EntryId = EntryId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    fn render(&self) -> String {
        format!("{}-{}", self.ms, self.seq)
    }

    fn parse(s: &str) -> Option<EntryId> {
        match s {
            "-" | "0" => return Some(EntryId::ZERO),
            "+" => return Some(EntryId::MAX),
            _ => {}
        }
        match s.split_once('-') {
            Some((ms, seq)) => Some(EntryId {
                ms: ms.parse().ok()?,
                seq: seq.parse().ok()?,
            }),
            None => Some(EntryId {
                ms: s.parse().ok()?,
                seq: 0,
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    id: EntryId,
    fields: HashMap<String, String>,
}

#[derive(Debug)]
struct PendingState {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

#[derive(Debug, Default)]
struct GroupState {
    /// 下一条待投递消息在entries中的下标；组创建时指向流尾
    cursor: usize,
    pending: BTreeMap<EntryId, PendingState>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: Vec<StoredEntry>,
    groups: HashMap<String, GroupState>,
    last_id: EntryId,
}

/// 内存版流投递
///
/// 单进程内提供与Redis Stream相同的竞争消费语义：同组内一条消息
/// 只投递给一个消费者，未确认的消息留在挂起表中等待ack或认领。
/// `read_group`/`ack`是给进程内worker测试夹具用的固有方法，
/// 不属于 [`StreamDispatcher`] 抽象。
#[derive(Debug, Default)]
pub struct InMemoryStreamDispatcher {
    streams: RwLock<HashMap<String, StreamState>>,
}

impl InMemoryStreamDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以consumer身份读取count条新消息（相当于XREADGROUP >）
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> DispatchResult<Vec<ClaimedEntry>> {
        let mut streams = self.streams.write().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| DispatchError::message_queue(format!("流不存在: {stream}")))?;
        let total = state.entries.len();
        let group_state = state
            .groups
            .get_mut(group)
            .ok_or_else(|| DispatchError::message_queue(format!("消费者组不存在: {group}")))?;

        let mut delivered = Vec::new();
        while group_state.cursor < total && delivered.len() < count {
            let entry = &state.entries[group_state.cursor];
            group_state.cursor += 1;
            group_state.pending.insert(
                entry.id,
                PendingState {
                    consumer: consumer.to_string(),
                    delivered_at: Instant::now(),
                    delivery_count: 1,
                },
            );
            delivered.push(ClaimedEntry {
                id: entry.id.render(),
                fields: entry.fields.clone(),
            });
        }
        Ok(delivered)
    }

    /// 确认一条消息，返回是否真的从挂起表移除
    pub async fn ack(&self, stream: &str, group: &str, id: &str) -> DispatchResult<bool> {
        let entry_id = EntryId::parse(id)
            .ok_or_else(|| DispatchError::message_queue(format!("消息ID非法: {id}")))?;
        let mut streams = self.streams.write().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| DispatchError::message_queue(format!("流不存在: {stream}")))?;
        let group_state = state
            .groups
            .get_mut(group)
            .ok_or_else(|| DispatchError::message_queue(format!("消费者组不存在: {group}")))?;
        Ok(group_state.pending.remove(&entry_id).is_some())
    }
}

#[async_trait]
impl StreamDispatcher for InMemoryStreamDispatcher {
    async fn ensure_group(&self, stream: &str, group: &str) -> DispatchResult<()> {
        let mut streams = self.streams.write().await;
        let state = streams.entry(stream.to_string()).or_default();
        let tail = state.entries.len();
        state.groups.entry(group.to_string()).or_insert_with(|| {
            debug!("Created in-memory consumer group {} at tail", group);
            GroupState {
                cursor: tail,
                pending: BTreeMap::new(),
            }
        });
        Ok(())
    }

    async fn publish(&self, stream: &str, fields: &[(String, String)]) -> DispatchResult<String> {
        if fields.is_empty() {
            return Err(DispatchError::message_queue("不能发布空消息"));
        }
        let mut streams = self.streams.write().await;
        let state = streams.entry(stream.to_string()).or_default();

        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let id = if now_ms <= state.last_id.ms {
            EntryId {
                ms: state.last_id.ms,
                seq: state.last_id.seq + 1,
            }
        } else {
            EntryId { ms: now_ms, seq: 0 }
        };
        state.last_id = id;
        state.entries.push(StoredEntry {
            id,
            fields: fields.iter().cloned().collect(),
        });
        Ok(id.render())
    }

    async fn pending_summary(&self, stream: &str, group: &str) -> DispatchResult<PendingSummary> {
        let streams = self.streams.read().await;
        let group_state = streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .ok_or_else(|| DispatchError::message_queue(format!("消费者组不存在: {group}")))?;

        let mut per_consumer: BTreeMap<&str, i64> = BTreeMap::new();
        for state in group_state.pending.values() {
            *per_consumer.entry(state.consumer.as_str()).or_default() += 1;
        }

        Ok(PendingSummary {
            total: group_state.pending.len() as i64,
            min_id: group_state.pending.keys().next().map(|id| id.render()),
            max_id: group_state.pending.keys().next_back().map(|id| id.render()),
            consumers: per_consumer
                .into_iter()
                .map(|(name, pending)| ConsumerPending {
                    name: name.to_string(),
                    pending,
                })
                .collect(),
        })
    }

    async fn pending_detail(
        &self,
        stream: &str,
        group: &str,
        start: &str,
        end: &str,
        count: usize,
    ) -> DispatchResult<Vec<PendingEntry>> {
        let start_id = EntryId::parse(start)
            .ok_or_else(|| DispatchError::message_queue(format!("起始ID非法: {start}")))?;
        let end_id = EntryId::parse(end)
            .ok_or_else(|| DispatchError::message_queue(format!("结束ID非法: {end}")))?;

        let streams = self.streams.read().await;
        let group_state = streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .ok_or_else(|| DispatchError::message_queue(format!("消费者组不存在: {group}")))?;

        Ok(group_state
            .pending
            .range(start_id..=end_id)
            .take(count)
            .map(|(id, state)| PendingEntry {
                id: id.render(),
                consumer: state.consumer.clone(),
                idle_ms: state.delivered_at.elapsed().as_millis() as u64,
                delivery_count: state.delivery_count,
            })
            .collect())
    }

    async fn claim_stuck(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        batch: usize,
    ) -> DispatchResult<Vec<ClaimedEntry>> {
        let mut streams = self.streams.write().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| DispatchError::message_queue(format!("流不存在: {stream}")))?;

        // BTreeMap的可变遍历与entries查找分开做，避免双重借用
        let entry_fields: HashMap<EntryId, HashMap<String, String>> = state
            .entries
            .iter()
            .map(|e| (e.id, e.fields.clone()))
            .collect();
        let group_state = state
            .groups
            .get_mut(group)
            .ok_or_else(|| DispatchError::message_queue(format!("消费者组不存在: {group}")))?;

        let mut claimed = Vec::new();
        for (id, pending) in group_state.pending.iter_mut() {
            if claimed.len() >= batch {
                break;
            }
            if (pending.delivered_at.elapsed().as_millis() as u64) < min_idle_ms {
                continue;
            }
            pending.consumer = consumer.to_string();
            pending.delivered_at = Instant::now();
            pending.delivery_count += 1;
            claimed.push(ClaimedEntry {
                id: id.render(),
                fields: entry_fields.get(id).cloned().unwrap_or_default(),
            });
        }
        Ok(claimed)
    }

    async fn stream_info(&self, stream: &str) -> DispatchResult<StreamInfo> {
        let streams = self.streams.read().await;
        let state = match streams.get(stream) {
            Some(state) => state,
            None => {
                return Ok(StreamInfo {
                    length: 0,
                    first_id: None,
                    last_id: None,
                })
            }
        };
        Ok(StreamInfo {
            length: state.entries.len() as u64,
            first_id: state.entries.first().map(|e| e.id.render()),
            last_id: state.entries.last().map(|e| e.id.render()),
        })
    }
}
