use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use metrics::{counter, gauge, histogram};

/// 流投递性能指标
///
/// 原子计数器保证多线程下的数据一致性，同时镜像到metrics门面
/// 供Prometheus导出。
#[derive(Debug, Clone)]
pub struct DispatchMetrics {
    pub entries_published: Arc<AtomicU64>,
    pub dlq_appended: Arc<AtomicU64>,
    pub entries_claimed: Arc<AtomicU64>,
    pub connection_errors: Arc<AtomicU64>,
    pub active_connections: Arc<AtomicU32>,
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self {
            entries_published: Arc::new(AtomicU64::new(0)),
            dlq_appended: Arc::new(AtomicU64::new(0)),
            entries_claimed: Arc::new(AtomicU64::new(0)),
            connection_errors: Arc::new(AtomicU64::new(0)),
            active_connections: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl DispatchMetrics {
    /// 记录工作流消息发布
    pub fn record_entry_published(&self) {
        self.entries_published.fetch_add(1, Ordering::Relaxed);
        counter!("macct_stream_entries_published_total").increment(1);
    }

    /// 记录死信消息追加
    pub fn record_dlq_appended(&self) {
        self.dlq_appended.fetch_add(1, Ordering::Relaxed);
        counter!("macct_dlq_entries_total").increment(1);
    }

    /// 记录停滞消息认领
    pub fn record_entries_claimed(&self, count: u64) {
        self.entries_claimed.fetch_add(count, Ordering::Relaxed);
        counter!("macct_stream_entries_claimed_total").increment(count);
    }

    /// 记录连接错误
    pub fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
        counter!("macct_stream_connection_errors_total").increment(1);
    }

    pub fn set_active_connections(&self, count: u32) {
        self.active_connections.store(count, Ordering::Relaxed);
        gauge!("macct_stream_active_connections").set(count as f64);
    }

    pub fn record_operation_duration(&self, operation: &str, duration_ms: f64) {
        histogram!(
            "macct_stream_operation_duration_ms",
            "operation" => operation.to_string()
        )
        .record(duration_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = DispatchMetrics::default();
        metrics.record_entry_published();
        metrics.record_entry_published();
        metrics.record_entries_claimed(3);
        assert_eq!(metrics.entries_published.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.entries_claimed.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_clone_shares_counters() {
        let metrics = DispatchMetrics::default();
        let cloned = metrics.clone();
        cloned.record_dlq_appended();
        assert_eq!(metrics.dlq_appended.load(Ordering::Relaxed), 1);
    }
}
